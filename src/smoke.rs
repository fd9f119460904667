use std::time::Duration;

use crate::client::{ClientConfig, ClientError, InferenceClient, TokenUsage};
use crate::config::Config;
use crate::health;
use crate::result::round_to;

pub const SMOKE_PROMPTS: [&str; 3] = [
    "What is 2 + 2? Answer in one word.",
    "Write a Python function that checks if a number is prime. Keep it short.",
    "Explain the difference between tensor parallelism and pipeline parallelism in one paragraph.",
];

pub const SMOKE_MAX_TOKENS: u32 = 1024;
pub const SMOKE_TEMPERATURE: f64 = 0.7;

/// Responses are printed up to this many characters.
const RESPONSE_PREVIEW_CHARS: usize = 500;

const EMPTY_RESPONSE: &str = "(empty - reasoning tokens may have consumed the budget)";

/// Full smoke flow: health probe, then every prompt.
///
/// Returns `Ok(false)` when the server is unreachable or any prompt fails.
pub async fn run_smoke_test(config: &Config) -> anyhow::Result<bool> {
    let base_url = config.endpoint.base_url();
    println!("Testing vLLM endpoint at {}\n", base_url);

    let report = match health::probe(&base_url, config.endpoint.health_timeout()?).await {
        Ok(report) => report,
        Err(e) => {
            println!("Server not reachable: {}", e);
            println!("\nServer is not ready. Is vLLM still loading the model?");
            return Ok(false);
        }
    };
    println!("Server is up. Models available: {:?}", report.models);

    let client = InferenceClient::new(ClientConfig {
        base_url,
        model: health::resolve_model(config.endpoint.model.as_deref(), &report),
        timeout: config.endpoint.smoke_timeout()?,
        usage_policy: config.endpoint.usage,
    })?;

    if let Err(e) = run(&client).await {
        log::error!("Smoke test failed: {}", e);
        println!("Error: {}", e);
        return Ok(false);
    }

    println!("\nAll tests passed.");
    Ok(true)
}

/// Sends each smoke prompt in order, printing the exchange.
///
/// Stops at the first failure and returns it; the caller exits non-zero.
pub async fn run(client: &InferenceClient) -> Result<(), ClientError> {
    for (i, prompt) in SMOKE_PROMPTS.iter().enumerate() {
        println!("\n--- Test {}/{} ---", i + 1, SMOKE_PROMPTS.len());
        println!("Prompt: {}", prompt);

        let request = client.create_request(prompt, SMOKE_MAX_TOKENS, SMOKE_TEMPERATURE);
        let completion = client.chat_completion(&request).await?;
        let content = completion
            .content
            .ok_or_else(|| ClientError::Parse("response contained no choices".to_string()))?;

        println!("{}", format_exchange(&content, &completion.usage, completion.elapsed));
    }

    Ok(())
}

/// The three lines printed for an answered prompt.
pub fn format_exchange(content: &str, usage: &TokenUsage, elapsed: Duration) -> String {
    format!(
        "Response: {}\nTokens: {}\nTime: {:.2}s",
        preview(content),
        usage,
        round_to(elapsed.as_secs_f64(), 2)
    )
}

/// The text shown for a response: a character-bounded prefix, or a note
/// when the model produced no visible content.
pub fn preview(content: &str) -> String {
    if content.is_empty() {
        return EMPTY_RESPONSE.to_string();
    }
    content.chars().take(RESPONSE_PREVIEW_CHARS).collect()
}
