//! Client pool execution logic

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::request::RequestSpec;
use crate::traits::{Completion, CompletionClient};

use super::stats::PoolStats;
use super::worker::{Finished, Job, SlotWorker};

/// Client pool errors
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// Pool created without clients
    #[error("client pool needs at least one client")]
    Empty,

    /// Every slot is busy; the request is handed back
    #[error("all client pool slots are busy")]
    Saturated(Box<RequestSpec>),

    /// A slot task is no longer running
    #[error("slot {slot} worker is gone")]
    WorkerGone {
        /// Slot index
        slot: usize,
    },

    /// The pool is shutting down
    #[error("client pool is closed")]
    Closed,
}

impl PoolError {
    /// Recover the request rejected by `try_submit`
    pub fn into_spec(self) -> Option<RequestSpec> {
        match self {
            PoolError::Saturated(spec) => Some(*spec),
            _ => None,
        }
    }
}

/// Receipt for a submitted request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHandle {
    /// Sequence number of the request within this pool
    pub id: u64,
    /// Slot executing the request
    pub slot: usize,
}

/// Fixed-size set of completion clients with one worker task per client
///
/// Capacity equals the number of clients. Submitting never queues beyond
/// capacity: `submit` waits for a free slot and `try_submit` refuses.
pub struct ClientPool {
    job_txs: Vec<mpsc::Sender<Job>>,
    idle_rx: mpsc::UnboundedReceiver<usize>,
    done_rx: mpsc::UnboundedReceiver<Finished>,
    handles: Vec<JoinHandle<PoolStats>>,
    /// Job currently running on each slot
    running: Vec<Option<u64>>,
    ready: VecDeque<Completion>,
    in_flight: usize,
    submitted: u64,
}

impl ClientPool {
    /// Spawn one worker per client
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(clients: Vec<Arc<dyn CompletionClient>>) -> Result<Self, PoolError> {
        if clients.is_empty() {
            return Err(PoolError::Empty);
        }

        let capacity = clients.len();
        let (idle_tx, idle_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let mut job_txs = Vec::with_capacity(capacity);
        let mut handles = Vec::with_capacity(capacity);

        for (slot, client) in clients.into_iter().enumerate() {
            let (job_tx, job_rx) = mpsc::channel(1);
            let worker = SlotWorker::new(slot, client, job_rx, done_tx.clone(), idle_tx.clone());
            handles.push(tokio::spawn(worker.run()));
            job_txs.push(job_tx);
            // every slot starts idle
            let _ = idle_tx.send(slot);
        }

        tracing::debug!(capacity, "Client pool started");

        Ok(Self {
            job_txs,
            idle_rx,
            done_rx,
            handles,
            running: vec![None; capacity],
            ready: VecDeque::new(),
            in_flight: 0,
            submitted: 0,
        })
    }

    /// Submit a request, waiting for a slot to become idle
    ///
    /// Cancel-safe: if the returned future is dropped before a slot frees up,
    /// nothing was submitted.
    pub async fn submit(&mut self, spec: RequestSpec) -> Result<RequestHandle, PoolError> {
        let slot = self.idle_rx.recv().await.ok_or(PoolError::Closed)?;
        self.dispatch(slot, spec)
    }

    /// Submit a request only if a slot is idle right now
    pub fn try_submit(&mut self, spec: RequestSpec) -> Result<RequestHandle, PoolError> {
        match self.idle_rx.try_recv() {
            Ok(slot) => self.dispatch(slot, spec),
            Err(TryRecvError::Empty) => Err(PoolError::Saturated(Box::new(spec))),
            Err(TryRecvError::Disconnected) => Err(PoolError::Closed),
        }
    }

    fn dispatch(&mut self, slot: usize, spec: RequestSpec) -> Result<RequestHandle, PoolError> {
        let id = self.submitted;
        self.job_txs[slot]
            .try_send(Job { id, spec })
            .map_err(|_| PoolError::WorkerGone { slot })?;

        self.submitted += 1;
        self.in_flight += 1;
        self.running[slot] = Some(id);
        tracing::debug!(request_id = id, slot, in_flight = self.in_flight, "Request submitted");
        Ok(RequestHandle { id, slot })
    }

    /// Completions finished since the last drain; never waits
    pub fn drain_ready(&mut self) -> Vec<Completion> {
        self.collect_finished();
        self.ready.drain(..).collect()
    }

    /// Wait up to `grace` for in-flight requests to finish
    ///
    /// Finished requests are buffered for the next [`drain_ready`](Self::drain_ready).
    /// Returns the number of requests still running.
    pub async fn settle(&mut self, grace: Duration) -> usize {
        let deadline = Instant::now() + grace;
        self.collect_finished();

        while self.in_flight > 0 {
            match tokio::time::timeout_at(deadline, self.done_rx.recv()).await {
                Ok(Some(finished)) => self.accept(finished),
                Ok(None) | Err(_) => break,
            }
        }

        if self.in_flight > 0 {
            tracing::debug!(in_flight = self.in_flight, "Grace period ended with requests in flight");
        }
        self.in_flight
    }

    fn collect_finished(&mut self) {
        while let Ok(finished) = self.done_rx.try_recv() {
            self.accept(finished);
        }
    }

    fn accept(&mut self, finished: Finished) {
        self.in_flight = self.in_flight.saturating_sub(1);
        // the slot may already be running a newer job
        if self.running[finished.slot] == Some(finished.id) {
            self.running[finished.slot] = None;
        }
        tracing::debug!(request_id = finished.id, slot = finished.slot, "Request finished");
        self.ready.push_back(finished.completion);
    }

    /// Requests submitted and not yet reported back
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Number of slots
    pub fn capacity(&self) -> usize {
        self.job_txs.len()
    }

    /// Requests submitted so far
    pub fn submitted(&self) -> u64 {
        self.submitted
    }

    /// Stop accepting work and collect slot statistics
    ///
    /// Idle workers are joined. Workers still running a request are left to
    /// finish on their own; their requests are counted as abandoned.
    pub async fn shutdown(mut self) -> PoolStats {
        self.collect_finished();
        self.job_txs.clear();

        let mut stats = PoolStats::new();
        for (slot, handle) in self.handles.into_iter().enumerate() {
            if self.running[slot].is_some() {
                stats.abandoned += 1;
                continue;
            }
            match handle.await {
                Ok(slot_stats) => stats.merge(&slot_stats),
                Err(e) => tracing::error!(slot, error = %e, "Slot worker panicked"),
            }
        }

        if stats.abandoned > 0 {
            tracing::warn!(abandoned = stats.abandoned, "Client pool shut down with requests in flight");
        }
        stats
    }
}

impl std::fmt::Debug for ClientPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientPool")
            .field("capacity", &self.capacity())
            .field("in_flight", &self.in_flight)
            .field("submitted", &self.submitted)
            .field("buffered", &self.ready.len())
            .finish()
    }
}
