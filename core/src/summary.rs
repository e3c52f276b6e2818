//! Summary aggregation over normalized metric records

use crate::error::{BenchError, BenchResult};
use crate::metrics::{ErrorCode, MetricRecord};
use crate::stats::{flatten, FieldSummary, Observation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::info;

/// Statistical summary of a load test
///
/// Field statistics cover non-errored records only. Error statistics are
/// always present, even when zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryReport {
    /// Average seconds per generated token
    pub inter_token_latency_s: FieldSummary,
    /// Time to first token in seconds
    pub ttft_s: FieldSummary,
    /// End-to-end latency in seconds
    pub end_to_end_latency_s: FieldSummary,
    /// Per-request output throughput in tokens per second
    pub request_output_throughput_token_per_s: FieldSummary,
    /// Prompt token counts
    pub number_input_tokens: FieldSummary,
    /// Generated token counts
    pub number_output_tokens: FieldSummary,

    /// Every record handed to the aggregator, errored or not
    pub num_requests_started: usize,
    /// Errored records over all records, 0 when there are none
    pub error_rate: f64,
    /// Number of errored records
    pub number_errors: usize,
    /// Count of each error code
    pub error_code_frequency: BTreeMap<ErrorCode, usize>,
    /// Output tokens of non-errored records over the test duration
    pub mean_output_throughput_token_per_s: f64,
    /// Number of non-errored records
    pub num_completed_requests: usize,
    /// Non-errored records per minute of test duration
    pub num_completed_requests_per_min: f64,
}

/// Aggregate normalized records over the `[start, end]` test window
///
/// Pure: the same inputs always give an identical report. A window that is
/// empty or reversed is rejected.
pub fn summarize(records: &[MetricRecord], start: Instant, end: Instant) -> BenchResult<SummaryReport> {
    if end <= start {
        let duration_s = -start.saturating_duration_since(end).as_secs_f64();
        return Err(BenchError::InvalidWindow { duration_s });
    }
    let duration_s = end.duration_since(start).as_secs_f64();

    let (errored, completed): (Vec<&MetricRecord>, Vec<&MetricRecord>) =
        records.iter().partition(|r| r.is_error());

    let field = |extract: fn(&MetricRecord) -> Option<Observation>| {
        FieldSummary::from_values(&flatten(completed.iter().map(|r| extract(r))))
    };

    let mut error_code_frequency = BTreeMap::new();
    for code in errored.iter().filter_map(|r| r.error_code()) {
        *error_code_frequency.entry(code).or_insert(0) += 1;
    }

    let total = records.len();
    let error_rate = if total == 0 {
        0.0
    } else {
        errored.len() as f64 / total as f64
    };

    let output_tokens: usize = completed.iter().map(|r| r.output_tokens()).sum();

    Ok(SummaryReport {
        inter_token_latency_s: field(|r| Some(r.inter_token_latency_s().into())),
        ttft_s: field(|r| r.ttft_s().map(Observation::from)),
        end_to_end_latency_s: field(|r| Some(r.e2e_latency_s().into())),
        request_output_throughput_token_per_s: field(|r| r.output_throughput().map(Observation::from)),
        number_input_tokens: field(|r| Some(r.input_tokens().into())),
        number_output_tokens: field(|r| Some(r.output_tokens().into())),
        num_requests_started: total,
        error_rate,
        number_errors: errored.len(),
        error_code_frequency,
        mean_output_throughput_token_per_s: output_tokens as f64 / duration_s,
        num_completed_requests: completed.len(),
        num_completed_requests_per_min: completed.len() as f64 / duration_s * 60.0,
    })
}

impl SummaryReport {
    /// Emit the headline numbers through `tracing`
    pub fn log(&self) {
        let fields = [
            ("inter_token_latency_s", &self.inter_token_latency_s),
            ("ttft_s", &self.ttft_s),
            ("end_to_end_latency_s", &self.end_to_end_latency_s),
            (
                "request_output_throughput_token_per_s",
                &self.request_output_throughput_token_per_s,
            ),
            ("number_input_tokens", &self.number_input_tokens),
            ("number_output_tokens", &self.number_output_tokens),
        ];
        for (name, summary) in fields {
            match summary.quantiles {
                Some(q) => info!(
                    field = name,
                    p50 = q.p50,
                    p90 = q.p90,
                    p99 = q.p99,
                    mean = summary.mean,
                    stddev = summary.stddev,
                    "field summary"
                ),
                None => info!(field = name, "no successful observations"),
            }
        }

        info!(
            requests_started = self.num_requests_started,
            completed = self.num_completed_requests,
            errors = self.number_errors,
            error_rate = self.error_rate,
            output_throughput = self.mean_output_throughput_token_per_s,
            completed_per_min = self.num_completed_requests_per_min,
            "load test summary"
        );
        for (code, count) in &self.error_code_frequency {
            info!(error_code = %code, count, "error code frequency");
        }
    }
}
