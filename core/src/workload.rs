//! Pre-generated workload consumed by the scheduler

use crate::request::Prompt;
use std::collections::VecDeque;

/// Prompt plus per-request output token targets, built before a run starts
///
/// Every request of a run uses the same prompt; each pops its own target.
#[derive(Debug, Clone, PartialEq)]
pub struct Workload {
    prompt: Prompt,
    output_token_targets: VecDeque<usize>,
}

impl Workload {
    /// Create a workload from a prompt and output token targets
    pub fn new(prompt: Prompt, output_token_targets: impl IntoIterator<Item = usize>) -> Self {
        Self {
            prompt,
            output_token_targets: output_token_targets.into_iter().collect(),
        }
    }

    /// Take the next request's prompt and output token target
    pub fn pop_next(&mut self) -> Option<(Prompt, usize)> {
        self.output_token_targets
            .pop_front()
            .map(|target| (self.prompt.clone(), target))
    }

    /// Prompt shared by all requests
    pub fn prompt(&self) -> &Prompt {
        &self.prompt
    }

    /// Targets not yet handed out
    pub fn remaining(&self) -> usize {
        self.output_token_targets.len()
    }

    /// Whether every target has been handed out
    pub fn is_exhausted(&self) -> bool {
        self.output_token_targets.is_empty()
    }
}
