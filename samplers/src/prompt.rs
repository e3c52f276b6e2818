//! Prompt construction

use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, Normal};

use tokenbench_core::{Prompt, TokenCounter};

use crate::corpus;
use crate::error::SamplerError;

/// Where the run's prompt comes from
#[derive(Debug, Clone, PartialEq)]
pub enum PromptSource {
    /// Caller-supplied prompt text
    Custom(String),
    /// Instruction plus corpus lines sized to a sampled token target
    Corpus {
        /// Mean prompt length in tokens
        mean_input_tokens: usize,
        /// Standard deviation of the prompt length
        stddev_input_tokens: f64,
    },
}

impl PromptSource {
    /// Build the prompt, counting its tokens with `counter`
    pub fn build(&self, rng: &mut StdRng, counter: &dyn TokenCounter) -> Result<Prompt, SamplerError> {
        match self {
            PromptSource::Custom(text) => {
                if text.trim().is_empty() {
                    return Err(SamplerError::EmptyPrompt);
                }
                Ok(Prompt::new(text.clone(), counter.count(text)))
            }
            PromptSource::Corpus {
                mean_input_tokens,
                stddev_input_tokens,
            } => {
                let mean = *mean_input_tokens as f64;
                let normal = Normal::new(mean, *stddev_input_tokens).map_err(|_| {
                    SamplerError::InvalidDistribution {
                        mean,
                        stddev: *stddev_input_tokens,
                    }
                })?;
                let target = normal.sample(rng).round().max(1.0) as usize;
                Ok(corpus_prompt(rng, counter, target))
            }
        }
    }
}

/// Instruction followed by random corpus lines until `target` tokens are reached
fn corpus_prompt(rng: &mut StdRng, counter: &dyn TokenCounter, target: usize) -> Prompt {
    let lines = corpus::lines();
    let mut text = String::from(corpus::INSTRUCTION);
    let mut tokens = counter.count(&text);

    while tokens < target {
        let line = lines[rng.gen_range(0..lines.len())];
        text.push_str(line);
        text.push('\n');
        tokens += counter.count(line).max(1);
    }

    let input_tokens = counter.count(&text);
    tracing::debug!(target, input_tokens, "Built corpus prompt");
    Prompt::new(text, input_tokens)
}
