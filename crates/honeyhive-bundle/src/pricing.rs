use serde::Deserialize;

/// USD per 1M tokens for a provider+model pair
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ModelPrice {
    pub prompt: f64,
    pub completion: f64,
}

impl ModelPrice {
    /// Compute the cost of a call. Returns `None` when token counts are
    /// absent; a priced model with zero usage is a valid zero cost.
    pub fn cost(&self, prompt_tokens: u64, completion_tokens: u64) -> f64 {
        (prompt_tokens as f64 * self.prompt + completion_tokens as f64 * self.completion)
            / 1_000_000.0
    }
}
