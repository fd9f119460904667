use async_trait::async_trait;
use log::{debug, info, warn};
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;

use crate::client::{ClientConfig, ClientError, InferenceClient};
use crate::config::{Config, LoadConfig};
use crate::health;
use crate::metrics::{Metrics, Phase, RequestStatus};
use crate::report::ReportBuilder;
use crate::result::RequestResult;
use crate::stats::{mean, print_stats};

/// A fixed request shape sent by one of the benchmark phases.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Probe {
    pub prompt: &'static str,
    pub max_tokens: u32,
    pub temperature: f64,
}

/// Uncontended latency probe used by the sequential phase.
pub const SEQUENTIAL_PROBE: Probe = Probe {
    prompt: "Explain what a neural network is in exactly 3 sentences.",
    max_tokens: 128,
    temperature: 0.0,
};

/// Shorter probe for the concurrent phase, bounding worst-case round time.
pub const CONCURRENT_PROBE: Probe = Probe {
    prompt: "Write a haiku about GPUs.",
    max_tokens: 64,
    temperature: 0.0,
};

/// Something that can answer one probe with a timed result.
#[async_trait]
pub trait Inference: Send + Sync {
    async fn infer(&self, probe: &Probe) -> Result<RequestResult, ClientError>;
}

#[async_trait]
impl Inference for InferenceClient {
    async fn infer(&self, probe: &Probe) -> Result<RequestResult, ClientError> {
        let request = self.create_request(probe.prompt, probe.max_tokens, probe.temperature);
        let completion = self.chat_completion(&request).await?;
        Ok(RequestResult::new(
            completion.elapsed,
            completion.usage.prompt_tokens,
            completion.usage.completion_tokens,
        ))
    }
}

/// Successes and failures of one concurrent round.
#[derive(Debug, Clone, Default)]
pub struct RoundOutcome {
    pub results: Vec<RequestResult>,
    pub failures: usize,
}

impl RoundOutcome {
    /// Mean tokens/s over the round's successes; 0 when there are none.
    pub fn mean_tokens_per_second(&self) -> f64 {
        let tps: Vec<f64> = self.results.iter().map(|r| r.tokens_per_second).collect();
        mean(&tps)
    }
}

/// Runs the sequential latency phase and the concurrent throughput phase
/// against one inference backend.
///
/// Failed calls are printed, logged and counted, then left out of the
/// statistics; they never stop the remaining calls.
pub struct BenchmarkRunner {
    backend: Arc<dyn Inference>,
    load: LoadConfig,
}

impl BenchmarkRunner {
    pub fn new(backend: Arc<dyn Inference>, load: LoadConfig) -> Self {
        Self { backend, load }
    }

    /// Executes both phases, printing per-phase statistics and the final
    /// run report.
    pub async fn run(&self) -> anyhow::Result<()> {
        let report_builder = ReportBuilder::new();
        let start = Instant::now();

        println!("=== Sequential Latency ===");
        let sequential = self.run_sequential(self.load.rounds).await;
        print_stats("Sequential Results", &sequential);

        println!("\n=== Concurrent Throughput (x{}) ===", self.load.concurrent);
        let concurrent = self
            .run_concurrent(self.load.concurrent, self.load.rounds)
            .await;
        print_stats("Concurrent Results", &concurrent);

        info!("Benchmark completed in {:.1}s", start.elapsed().as_secs_f64());

        let report = report_builder.with_duration(start.elapsed()).build()?;
        report.print_console();
        Ok(())
    }

    /// Issues `rounds` calls strictly one after another.
    pub async fn run_sequential(&self, rounds: usize) -> Vec<RequestResult> {
        let mut results = Vec::new();

        for i in 0..rounds {
            print!("  Sequential request {}/{}... ", i + 1, rounds);
            let _ = std::io::stdout().flush();

            match execute(self.backend.as_ref(), Phase::Sequential, &SEQUENTIAL_PROBE, i).await {
                Ok(result) => {
                    println!("{}", format_timing(&result));
                    results.push(result);
                }
                Err(e) => {
                    println!("FAILED: {}", e);
                }
            }
        }

        results
    }

    /// Issues `rounds` rounds of exactly `concurrency` parallel calls.
    ///
    /// A round is a barrier: every call of round N has returned before any
    /// call of round N+1 is spawned, so at most `concurrency` calls are ever
    /// in flight.
    pub async fn run_concurrent(&self, concurrency: usize, rounds: usize) -> Vec<RequestResult> {
        println!(
            "  Sending {} requests ({} concurrent x {} rounds)...",
            concurrency.saturating_mul(rounds),
            concurrency,
            rounds
        );

        let mut results = Vec::new();

        for round in 0..rounds {
            let outcome = self.run_round(round, concurrency).await;
            println!("{}", format_round(round, rounds, &outcome));
            results.extend(outcome.results);
        }

        results
    }

    /// Spawns one round of calls and waits for all of them.
    pub async fn run_round(&self, round: usize, concurrency: usize) -> RoundOutcome {
        debug!("Starting round {} with {} workers", round + 1, concurrency);

        let mut workers = JoinSet::new();
        for slot in 0..concurrency {
            let backend = Arc::clone(&self.backend);
            let index = round.saturating_mul(concurrency).saturating_add(slot);
            workers.spawn(async move {
                execute(backend.as_ref(), Phase::Concurrent, &CONCURRENT_PROBE, index).await
            });
        }

        let mut outcome = RoundOutcome::default();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(result)) => outcome.results.push(result),
                Ok(Err(e)) => {
                    println!("    Request failed: {}", e);
                    outcome.failures += 1;
                }
                Err(e) => {
                    println!("    Request failed: worker task aborted: {}", e);
                    warn!("Worker task in round {} did not complete: {}", round + 1, e);
                    outcome.failures += 1;
                }
            }
        }

        outcome
    }
}

/// Full benchmark flow: health probe, then both phases.
///
/// Returns `Ok(false)` when the server cannot be reached; nothing else is
/// attempted in that case and the caller should exit non-zero.
pub async fn run_benchmark(config: &Config) -> anyhow::Result<bool> {
    let base_url = config.endpoint.base_url();
    println!("Benchmarking vLLM at {}", base_url);
    println!(
        "Rounds: {}, Concurrency: {}\n",
        config.load.rounds, config.load.concurrent
    );

    let report = match health::probe(&base_url, config.endpoint.health_timeout()?).await {
        Ok(report) => report,
        Err(e) => {
            println!("Server not reachable at {}: {}", base_url, e);
            return Ok(false);
        }
    };
    println!("Model: {}\n", report.primary_model());

    let model = health::resolve_model(config.endpoint.model.as_deref(), &report);
    info!("Requesting model {}", model);

    let client = InferenceClient::new(ClientConfig {
        base_url,
        model,
        timeout: config.endpoint.request_timeout()?,
        usage_policy: config.endpoint.usage,
    })?;

    let runner = BenchmarkRunner::new(Arc::new(client), config.load.clone());
    runner.run().await?;
    Ok(true)
}

/// Line printed after a sequential call, e.g. `2.0s (64.0 tok/s)`.
///
/// Whole values keep their trailing `.0`.
pub fn format_timing(result: &RequestResult) -> String {
    format!("{:?}s ({:?} tok/s)", result.elapsed_s, result.tokens_per_second)
}

/// Line printed after each concurrent round.
pub fn format_round(round: usize, rounds: usize, outcome: &RoundOutcome) -> String {
    format!(
        "    Round {}/{}: avg {:.1} tok/s across {} requests",
        round + 1,
        rounds,
        outcome.mean_tokens_per_second(),
        outcome.results.len()
    )
}

/// One call with metrics bookkeeping around it.
async fn execute(
    backend: &dyn Inference,
    phase: Phase,
    probe: &Probe,
    index: usize,
) -> Result<RequestResult, ClientError> {
    debug!("Executing {} request {}", phase.label().to_lowercase(), index);
    Metrics::record_request_sent(phase);

    match backend.infer(probe).await {
        Ok(result) => {
            Metrics::record_latency(phase, result.elapsed_s);
            Metrics::record_tokens(result.prompt_tokens, result.output_tokens);
            Metrics::record_request_complete(RequestStatus::Success);
            debug!(
                "Request {} completed - elapsed_s: {:.3}, output_tokens: {}, tok/s: {:.1}",
                index, result.elapsed_s, result.output_tokens, result.tokens_per_second
            );
            Ok(result)
        }
        Err(e) => {
            warn!("Request {} failed: {}", index, e);
            Metrics::record_request_complete(RequestStatus::Failed(e.error_type()));
            Err(e)
        }
    }
}
