//! Console table and result files

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use tokenbench_core::{BenchmarkReport, FieldSummary, SummaryReport};

const COLUMNS: [&str; 10] = [
    "p25", "p50", "p75", "p90", "p95", "p99", "mean", "min", "max", "stddev",
];

/// Render the summary as a plain-text table
pub fn render_summary(summary: &SummaryReport) -> String {
    let rows: [(&str, &FieldSummary); 6] = [
        ("inter_token_latency_s", &summary.inter_token_latency_s),
        ("ttft_s", &summary.ttft_s),
        ("end_to_end_latency_s", &summary.end_to_end_latency_s),
        (
            "output_throughput_token_per_s",
            &summary.request_output_throughput_token_per_s,
        ),
        ("number_input_tokens", &summary.number_input_tokens),
        ("number_output_tokens", &summary.number_output_tokens),
    ];

    let mut out = String::new();
    let _ = write!(out, "{:<32}", "metric");
    for column in COLUMNS {
        let _ = write!(out, "{column:>10}");
    }
    out.push('\n');

    for (name, field) in rows {
        let _ = write!(out, "{name:<32}");
        let mut values: Vec<Option<f64>> = match field.quantiles {
            Some(q) => q.as_array().into_iter().map(Some).collect(),
            None => vec![None; 6],
        };
        values.extend([field.mean, field.min, field.max, field.stddev]);
        for value in values {
            match value {
                Some(v) => {
                    let _ = write!(out, "{v:>10.4}");
                }
                None => {
                    let _ = write!(out, "{:>10}", "-");
                }
            }
        }
        out.push('\n');
    }

    out.push('\n');
    let _ = writeln!(out, "requests started:          {}", summary.num_requests_started);
    let _ = writeln!(out, "completed requests:        {}", summary.num_completed_requests);
    let _ = writeln!(
        out,
        "errors:                    {} ({:.2}%)",
        summary.number_errors,
        summary.error_rate * 100.0
    );
    for (code, count) in &summary.error_code_frequency {
        let _ = writeln!(out, "  {code}: {count}");
    }
    let _ = writeln!(
        out,
        "overall output throughput: {:.2} tokens/s",
        summary.mean_output_throughput_token_per_s
    );
    let _ = write!(
        out,
        "completed requests/min:    {:.2}",
        summary.num_completed_requests_per_min
    );
    out
}

/// Write `<stem>_summary.json` and `<stem>_individual_responses.json` into `dir`
pub fn write_results(report: &BenchmarkReport, dir: &Path) -> Result<(PathBuf, PathBuf)> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create results directory {}", dir.display()))?;

    let stem = report.file_stem();
    let summary_path = dir.join(format!("{stem}_summary.json"));
    let individual_path = dir.join(format!("{stem}_individual_responses.json"));

    write_json(&summary_path, &report.summary_json()?)?;
    write_json(&individual_path, &report.individual_json()?)?;

    Ok((summary_path, individual_path))
}

fn write_json(path: &Path, value: &serde_json::Value) -> Result<()> {
    let body = serde_json::to_string_pretty(value)?;
    fs::write(path, body).with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map, Value};
    use std::time::{Duration, Instant};
    use tempfile::TempDir;
    use tokenbench_core::{
        summarize, ErrorCode, LoadTestConfig, MetricRecord, Prompt, RawMetrics, TestMetadata,
    };

    fn records() -> Vec<MetricRecord> {
        vec![
            RawMetrics::success(10, 0.1, 0.9, 1.0).normalize(10),
            RawMetrics::success(10, 0.2, 1.8, 2.0).normalize(20),
            RawMetrics::failure(10, 0.3, ErrorCode::Http(429), "slow down").normalize(0),
        ]
    }

    fn report() -> BenchmarkReport {
        let start = Instant::now();
        let records = records();
        let summary = summarize(&records, start, start + Duration::from_secs(10)).unwrap();
        let config = LoadTestConfig::new("org/model:v1");
        let mut user_metadata = Map::new();
        user_metadata.insert("name".into(), json!("nightly"));

        BenchmarkReport::new(
            TestMetadata::new(&config, &Prompt::new("hello", 1)),
            summary,
            user_metadata,
            records,
        )
    }

    #[test]
    fn test_render_summary() {
        let report = report();
        let table = render_summary(&report.results);

        assert!(table.starts_with("metric"));
        assert!(table.contains("ttft_s"));
        assert!(table.contains("number_output_tokens"));
        assert!(table.contains("requests started:          3"));
        assert!(table.contains("completed requests:        2"));
        assert!(table.contains("429: 1"));
        assert!(table.contains("overall output throughput: 3.00 tokens/s"));
    }

    #[test]
    fn test_render_empty_summary() {
        let start = Instant::now();
        let summary = summarize(&[], start, start + Duration::from_secs(1)).unwrap();
        let table = render_summary(&summary);

        let ttft_row = table.lines().find(|l| l.starts_with("ttft_s")).unwrap();
        assert_eq!(ttft_row.matches('-').count(), 10);
    }

    #[test]
    fn test_write_results() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("nested");
        let report = report();

        let (summary_path, individual_path) = write_results(&report, &out).unwrap();

        assert_eq!(
            summary_path.file_name().unwrap(),
            "org-model-v1_1_150_summary.json"
        );
        assert_eq!(
            individual_path.file_name().unwrap(),
            "org-model-v1_1_150_individual_responses.json"
        );

        let summary: Value =
            serde_json::from_str(&fs::read_to_string(&summary_path).unwrap()).unwrap();
        assert_eq!(summary["model"], "org/model:v1");
        assert_eq!(summary["name"], "nightly");
        assert_eq!(summary["results"]["number_errors"], 1);

        let individual: Value =
            serde_json::from_str(&fs::read_to_string(&individual_path).unwrap()).unwrap();
        assert_eq!(individual.as_array().unwrap().len(), 3);
        assert_eq!(individual[2]["error_code"], "429");
    }
}
