//! Scheduler execution logic

use std::fmt;
use std::time::Duration;

use indicatif::ProgressBar;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::time::Instant;

use crate::error::BenchResult;
use crate::metrics::{MetricRecord, Normalizer};
use crate::pool::{ClientPool, PoolStats};
use crate::request::RequestTemplate;
use crate::workload::Workload;

/// Lifecycle of a scheduler run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    /// Built, not started
    Idle,
    /// Submitting requests
    Dispatching,
    /// Harvesting finished requests
    Draining,
    /// Loop exited and final drain done
    Finished,
}

/// Why the loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Enough records accumulated
    MaxCompleted,
    /// Test timeout elapsed
    Timeout,
    /// Every pre-generated request was submitted and has finished
    WorkloadExhausted,
    /// Shutdown signal received
    Interrupted,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            StopReason::MaxCompleted => "max completed requests reached",
            StopReason::Timeout => "timeout",
            StopReason::WorkloadExhausted => "workload exhausted",
            StopReason::Interrupted => "interrupted",
        };
        f.write_str(reason)
    }
}

/// Result of a scheduler run
#[derive(Debug)]
pub struct RunOutcome {
    /// Normalized records in drain order
    pub records: Vec<MetricRecord>,
    /// When dispatching began
    pub start: std::time::Instant,
    /// When the final drain completed
    pub end: std::time::Instant,
    /// Requests submitted to the pool
    pub submitted: u64,
    /// Records collected by the final drain
    pub late_records: usize,
    /// Why the loop stopped
    pub stop_reason: StopReason,
    /// Whether the test timeout ended the run
    pub timed_out: bool,
    /// Client pool statistics
    pub pool_stats: PoolStats,
}

/// Drives requests through the client pool and accumulates their records
pub struct Scheduler {
    pub(crate) pool: ClientPool,
    pub(crate) normalizer: Normalizer,
    pub(crate) workload: Workload,
    pub(crate) template: RequestTemplate,
    pub(crate) max_completed: usize,
    pub(crate) timeout: Duration,
    pub(crate) final_drain_grace: Duration,
    pub(crate) poll_interval: Duration,
    pub(crate) progress: Option<ProgressBar>,
    pub(crate) state: SchedulerState,
    pub(crate) shutdown_tx: broadcast::Sender<()>,
}

impl Scheduler {
    /// Current lifecycle state
    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Sender that stops the run when signalled
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    fn transition(&mut self, next: SchedulerState) {
        if self.state != next {
            tracing::trace!(from = ?self.state, to = ?next, "Scheduler state change");
            self.state = next;
        }
    }

    /// Drain the pool, normalizing each finished request into `records`
    fn drain_into(&mut self, records: &mut Vec<MetricRecord>) -> usize {
        let previous = self.state;
        self.transition(SchedulerState::Draining);

        let finished = self.pool.drain_ready();
        let drained = finished.len();
        for completion in finished {
            records.push(
                self.normalizer
                    .normalize(completion.metrics, &completion.generated_text),
            );
        }

        if drained > 0 {
            tracing::debug!(drained, total = records.len(), "Drained finished requests");
            if let Some(progress) = &self.progress {
                progress.set_position(records.len() as u64);
            }
        }

        self.transition(previous);
        drained
    }

    /// Run the load test
    ///
    /// Request failures are recorded, never returned. Errors come only from
    /// an invalid request template or a broken pool.
    pub async fn run(mut self) -> BenchResult<RunOutcome> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let drain_every = self.pool.capacity().max(1);
        let mut records = Vec::with_capacity(self.max_completed);
        let mut iteration = 0usize;

        tracing::info!(
            model = %self.template.model,
            api = %self.template.api,
            concurrency = drain_every,
            max_completed = self.max_completed,
            timeout_secs = self.timeout.as_secs_f64(),
            "Starting load test"
        );

        self.transition(SchedulerState::Dispatching);
        let start = Instant::now();
        let deadline = start + self.timeout;

        let stop_reason = loop {
            if records.len() >= self.max_completed {
                break StopReason::MaxCompleted;
            }
            if Instant::now() >= deadline {
                break StopReason::Timeout;
            }
            if !matches!(shutdown_rx.try_recv(), Err(TryRecvError::Empty)) {
                break StopReason::Interrupted;
            }

            let Some((prompt, max_tokens)) = self.workload.pop_next() else {
                // nothing left to submit: wait for in-flight requests to land
                self.drain_into(&mut records);
                if self.pool.in_flight() == 0 {
                    if records.len() >= self.max_completed {
                        continue;
                    }
                    break StopReason::WorkloadExhausted;
                }
                let wake = (Instant::now() + self.poll_interval).min(deadline);
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => break StopReason::Interrupted,
                    _ = tokio::time::sleep_until(wake) => {}
                }
                self.drain_into(&mut records);
                continue;
            };

            let spec = self.template.stamp(prompt, max_tokens)?;
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break StopReason::Interrupted,
                submitted = tokio::time::timeout_at(deadline, self.pool.submit(spec)) => match submitted {
                    Ok(handle) => {
                        let handle = handle?;
                        tracing::trace!(request_id = handle.id, slot = handle.slot, max_tokens, "Dispatched");
                    }
                    Err(_) => break StopReason::Timeout,
                },
            }

            iteration += 1;
            if iteration % drain_every == 0 {
                self.drain_into(&mut records);
            }
        };

        let timed_out = stop_reason == StopReason::Timeout;
        if timed_out {
            tracing::warn!(
                completed = records.len(),
                in_flight = self.pool.in_flight(),
                "Test timed out before all requests could be completed."
            );
        }

        // one final drain; requests still running after the grace are abandoned
        let still_running = self.pool.settle(self.final_drain_grace).await;
        let late_records = self.drain_into(&mut records);
        let end = Instant::now();
        self.transition(SchedulerState::Finished);

        if let Some(progress) = &self.progress {
            progress.finish_with_message(stop_reason.to_string());
        }

        let submitted = self.pool.submitted();
        let pool_stats = self.pool.shutdown().await;

        tracing::info!(
            records = records.len(),
            submitted,
            late_records,
            abandoned = still_running,
            stop_reason = %stop_reason,
            elapsed_secs = (end - start).as_secs_f64(),
            "Load test finished"
        );

        Ok(RunOutcome {
            records,
            start: start.into_std(),
            end: end.into_std(),
            submitted,
            late_records,
            stop_reason,
            timed_out,
            pool_stats,
        })
    }

    /// Run with Ctrl+C signal handling
    ///
    /// Ctrl+C stops dispatching; the records gathered so far are kept.
    pub async fn run_with_signal_handling(self) -> BenchResult<RunOutcome> {
        let shutdown_tx = self.shutdown_tx.clone();

        let signal_handle = tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Received Ctrl+C, stopping load test...");
                    let _ = shutdown_tx.send(());
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                }
            }
        });

        let result = self.run().await;
        signal_handle.abort();
        result
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("pool", &self.pool)
            .field("state", &self.state)
            .field("remaining", &self.workload.remaining())
            .field("max_completed", &self.max_completed)
            .field("timeout", &self.timeout)
            .finish()
    }
}
