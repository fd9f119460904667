use std::time::Duration;

/// Outcome of one successful inference call.
///
/// `elapsed_s` is kept at millisecond resolution and `tokens_per_second` is
/// derived from that stored value, so the two always agree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RequestResult {
    pub elapsed_s: f64,
    pub prompt_tokens: u64,
    pub output_tokens: u64,
    pub tokens_per_second: f64,
}

impl RequestResult {
    pub fn new(elapsed: Duration, prompt_tokens: u64, output_tokens: u64) -> Self {
        let elapsed_s = round_to(elapsed.as_secs_f64(), 3);
        let tokens_per_second = if elapsed_s > 0.0 && output_tokens > 0 {
            round_to(output_tokens as f64 / elapsed_s, 1)
        } else {
            0.0
        };

        Self {
            elapsed_s,
            prompt_tokens,
            output_tokens,
            tokens_per_second,
        }
    }
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}
