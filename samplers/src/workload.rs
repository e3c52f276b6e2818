//! Seeded workload generation
//!
//! All randomness of a run flows through one injected [`StdRng`], so the same
//! seed always produces the same prompt and output token targets.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use tokenbench_core::{Prompt, TokenCounter, Workload};

use crate::error::SamplerError;
use crate::prompt::PromptSource;

/// Generates prompts and per-request output token targets
#[derive(Debug, Clone)]
pub struct WorkloadGenerator {
    rng: StdRng,
}

impl WorkloadGenerator {
    /// Create a generator drawing from `rng`
    pub fn new(rng: StdRng) -> Self {
        Self { rng }
    }

    /// Create a generator seeded with `seed`
    pub fn from_seed(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }

    /// Sample `n` output token targets from N(mean, stddev)
    ///
    /// Samples are rounded and clamped to at least 1.
    pub fn output_token_targets(
        &mut self,
        n: usize,
        mean: f64,
        stddev: f64,
    ) -> Result<Vec<usize>, SamplerError> {
        let normal =
            Normal::new(mean, stddev).map_err(|_| SamplerError::InvalidDistribution { mean, stddev })?;

        Ok((0..n)
            .map(|_| normal.sample(&mut self.rng).round().max(1.0) as usize)
            .collect())
    }

    /// Build the run's prompt
    pub fn prompt(
        &mut self,
        source: &PromptSource,
        counter: &dyn TokenCounter,
    ) -> Result<Prompt, SamplerError> {
        source.build(&mut self.rng, counter)
    }

    /// Build the full workload: one prompt and `n` output token targets
    pub fn build_workload(
        &mut self,
        counter: &dyn TokenCounter,
        source: &PromptSource,
        n: usize,
        mean_output_tokens: f64,
        stddev_output_tokens: f64,
    ) -> Result<Workload, SamplerError> {
        let prompt = self.prompt(source, counter)?;
        let targets = self.output_token_targets(n, mean_output_tokens, stddev_output_tokens)?;

        tracing::info!(
            requests = n,
            input_tokens = prompt.input_tokens,
            mean_output_tokens,
            stddev_output_tokens,
            "Generated workload"
        );
        Ok(Workload::new(prompt, targets))
    }
}
