//! Builder pattern for Scheduler construction

use std::time::Duration;

use indicatif::ProgressBar;
use tokio::sync::broadcast;

use crate::config::{ConfigError, LoadTestConfig};
use crate::error::{BenchError, BenchResult};
use crate::metrics::Normalizer;
use crate::pool::ClientPool;
use crate::request::RequestTemplate;
use crate::workload::Workload;

use super::executor::{Scheduler, SchedulerState};

/// Builder for creating a Scheduler
///
/// # Example
///
/// ```ignore
/// let scheduler = SchedulerBuilder::new()
///     .pool(pool)
///     .normalizer(normalizer)
///     .workload(workload)
///     .template(template)
///     .max_completed_requests(100)
///     .timeout(Duration::from_secs(60))
///     .build()?;
/// ```
pub struct SchedulerBuilder {
    pool: Option<ClientPool>,
    normalizer: Option<Normalizer>,
    workload: Option<Workload>,
    template: Option<RequestTemplate>,
    max_completed: usize,
    timeout: Duration,
    final_drain_grace: Duration,
    poll_interval: Duration,
    progress: Option<ProgressBar>,
}

impl SchedulerBuilder {
    /// Create a new builder with the default limits
    pub fn new() -> Self {
        let defaults = LoadTestConfig::default();
        Self {
            pool: None,
            normalizer: None,
            workload: None,
            template: None,
            max_completed: defaults.max_completed_requests,
            timeout: defaults.timeout,
            final_drain_grace: defaults.final_drain_grace,
            poll_interval: defaults.poll_interval,
            progress: None,
        }
    }

    /// Set the client pool (its capacity is the concurrency level)
    pub fn pool(mut self, pool: ClientPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Set the metrics normalizer
    pub fn normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = Some(normalizer);
        self
    }

    /// Set the pre-generated workload
    pub fn workload(mut self, workload: Workload) -> Self {
        self.workload = Some(workload);
        self
    }

    /// Set the request template
    pub fn template(mut self, template: RequestTemplate) -> Self {
        self.template = Some(template);
        self
    }

    /// Copy limits and timings from a config
    pub fn limits(mut self, config: &LoadTestConfig) -> Self {
        self.max_completed = config.max_completed_requests;
        self.timeout = config.timeout;
        self.final_drain_grace = config.final_drain_grace;
        self.poll_interval = config.poll_interval;
        self
    }

    /// Set the completed-request limit
    pub fn max_completed_requests(mut self, max: usize) -> Self {
        self.max_completed = max;
        self
    }

    /// Set the test timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the grace period for the final drain
    pub fn final_drain_grace(mut self, grace: Duration) -> Self {
        self.final_drain_grace = grace;
        self
    }

    /// Set the poll interval used once the workload is exhausted
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Report progress (completed records) on a progress bar
    pub fn progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Build the scheduler
    ///
    /// # Errors
    ///
    /// Returns an error if pool, normalizer, workload or template are not
    /// set, or if a limit is zero.
    pub fn build(self) -> BenchResult<Scheduler> {
        let pool = self.pool.ok_or(BenchError::MissingField("pool"))?;
        let normalizer = self.normalizer.ok_or(BenchError::MissingField("normalizer"))?;
        let workload = self.workload.ok_or(BenchError::MissingField("workload"))?;
        let template = self.template.ok_or(BenchError::MissingField("template"))?;

        if self.max_completed == 0 {
            return Err(ConfigError::InvalidStopCondition(
                "max completed requests must be at least 1".into(),
            )
            .into());
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::InvalidStopCondition("timeout must be positive".into()).into());
        }

        if let Some(progress) = &self.progress {
            progress.set_length(self.max_completed as u64);
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Scheduler {
            pool,
            normalizer,
            workload,
            template,
            max_completed: self.max_completed,
            timeout: self.timeout,
            final_drain_grace: self.final_drain_grace,
            poll_interval: self.poll_interval.max(Duration::from_millis(1)),
            progress: self.progress,
            state: SchedulerState::Idle,
            shutdown_tx,
        })
    }
}

impl Default for SchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
