//! Slot worker: executes one request at a time for the pool

use crate::request::RequestSpec;
use crate::traits::{Completion, CompletionClient};

use super::stats::PoolStats;

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// A request handed to a slot
#[derive(Debug)]
pub(crate) struct Job {
    pub(crate) id: u64,
    pub(crate) spec: RequestSpec,
}

/// A finished request reported back to the pool
#[derive(Debug)]
pub(crate) struct Finished {
    pub(crate) id: u64,
    pub(crate) slot: usize,
    pub(crate) completion: Completion,
}

/// Long-lived task owning one client
pub(crate) struct SlotWorker {
    slot: usize,
    client: Arc<dyn CompletionClient>,
    jobs: mpsc::Receiver<Job>,
    done_tx: mpsc::UnboundedSender<Finished>,
    idle_tx: mpsc::UnboundedSender<usize>,
}

impl SlotWorker {
    pub(crate) fn new(
        slot: usize,
        client: Arc<dyn CompletionClient>,
        jobs: mpsc::Receiver<Job>,
        done_tx: mpsc::UnboundedSender<Finished>,
        idle_tx: mpsc::UnboundedSender<usize>,
    ) -> Self {
        Self {
            slot,
            client,
            jobs,
            done_tx,
            idle_tx,
        }
    }

    /// Serve jobs until the pool closes the job channel
    pub(crate) async fn run(mut self) -> PoolStats {
        let mut stats = PoolStats::new();
        tracing::debug!(slot = self.slot, api = %self.client.api(), "Slot worker started");

        while let Some(job) = self.jobs.recv().await {
            let input_tokens = job.spec.prompt().input_tokens;
            let started = Instant::now();

            let completion = match self.client.execute(&job.spec).await {
                Ok(completion) => {
                    stats.record_success(input_tokens, started.elapsed());
                    completion
                }
                Err(e) => {
                    let elapsed = started.elapsed();
                    stats.record_error(elapsed);
                    tracing::warn!(
                        slot = self.slot,
                        request_id = job.id,
                        error = %e,
                        "Request failed"
                    );
                    Completion::failed(input_tokens, elapsed.as_secs_f64(), &e)
                }
            };

            // completion is queued before the slot is released
            let finished = Finished {
                id: job.id,
                slot: self.slot,
                completion,
            };
            if self.done_tx.send(finished).is_err() || self.idle_tx.send(self.slot).is_err() {
                tracing::debug!(slot = self.slot, "Pool dropped, slot worker stopping");
                break;
            }
        }

        tracing::debug!(
            slot = self.slot,
            completed = stats.completed,
            errors = stats.errors,
            "Slot worker finished"
        );
        stats
    }
}
