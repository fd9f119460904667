use anyhow::Result;
use chrono::{DateTime, Utc};
use std::time::{Duration, SystemTime};

use crate::metrics::{
    COMPLETION_TOKENS, COMPLETIONS_FAILED, COMPLETIONS_OK, CONCURRENT_SENT, FAILURES_CONNECTION,
    FAILURES_HTTP_4XX, FAILURES_HTTP_5XX, FAILURES_OTHER, FAILURES_PARSE, FAILURES_TIMEOUT,
    PROMPT_TOKENS, Phase, SEQUENTIAL_SENT,
};

/// End-of-run summary built from the process-wide request counters.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub timestamp: DateTime<Utc>,
    pub duration: Duration,
    pub summary: Summary,
    pub errors: ErrorBreakdown,
    pub tokens: TokenTotals,
    pub sequential_latency: LatencyPercentiles,
    pub concurrent_latency: LatencyPercentiles,
}

#[derive(Debug, Clone)]
pub struct Summary {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub success_rate: f64,
}

#[derive(Debug, Clone)]
pub struct ErrorBreakdown {
    pub connection_errors: u64,
    pub http_4xx_errors: u64,
    pub http_5xx_errors: u64,
    pub timeout_errors: u64,
    pub parse_errors: u64,
    pub other_errors: u64,
}

impl ErrorBreakdown {
    pub fn total(&self) -> u64 {
        self.connection_errors
            + self.http_4xx_errors
            + self.http_5xx_errors
            + self.timeout_errors
            + self.parse_errors
            + self.other_errors
    }
}

#[derive(Debug, Clone)]
pub struct TokenTotals {
    pub input: u64,
    pub output: u64,
}

#[derive(Debug, Clone, Default)]
pub struct LatencyPercentiles {
    pub p50_ms: f64,
    pub p90_ms: f64,
    pub p99_ms: f64,
}

pub struct ReportBuilder {
    start_time: SystemTime,
    duration: Option<Duration>,
}

impl Default for ReportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportBuilder {
    pub fn new() -> Self {
        Self {
            start_time: SystemTime::now(),
            duration: None,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn build(&self) -> Result<RunReport> {
        let duration = match self.duration {
            Some(duration) => duration,
            None => SystemTime::now().duration_since(self.start_time)?,
        };

        let sent = SEQUENTIAL_SENT.value() + CONCURRENT_SENT.value();
        let success = COMPLETIONS_OK.value();
        let failed = COMPLETIONS_FAILED.value();
        let completed = success + failed;

        let summary = Summary {
            total_requests: sent,
            successful_requests: success,
            failed_requests: failed,
            success_rate: if completed > 0 {
                success as f64 / completed as f64
            } else {
                0.0
            },
        };

        let errors = ErrorBreakdown {
            connection_errors: FAILURES_CONNECTION.value(),
            http_4xx_errors: FAILURES_HTTP_4XX.value(),
            http_5xx_errors: FAILURES_HTTP_5XX.value(),
            timeout_errors: FAILURES_TIMEOUT.value(),
            parse_errors: FAILURES_PARSE.value(),
            other_errors: FAILURES_OTHER.value(),
        };

        let tokens = TokenTotals {
            input: PROMPT_TOKENS.value(),
            output: COMPLETION_TOKENS.value(),
        };

        Ok(RunReport {
            timestamp: self.start_time.into(),
            duration,
            summary,
            errors,
            tokens,
            sequential_latency: latency_percentiles(Phase::Sequential),
            concurrent_latency: latency_percentiles(Phase::Concurrent),
        })
    }
}

fn latency_percentiles(phase: Phase) -> LatencyPercentiles {
    let mut latency = LatencyPercentiles::default();

    if let Some(histogram) = phase.latency_histogram().load()
        && let Ok(Some(percentiles)) = histogram.percentiles(&[50.0, 90.0, 99.0])
    {
        for (percentile, bucket) in percentiles.iter() {
            let value_ms = bucket.end() as f64;
            match percentile.round() as u32 {
                50 => latency.p50_ms = value_ms,
                90 => latency.p90_ms = value_ms,
                99 => latency.p99_ms = value_ms,
                _ => {}
            }
        }
    }

    latency
}

impl RunReport {
    pub fn print_console(&self) {
        let timestamp = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, false);

        println!();
        println!("{} -----", timestamp);
        println!("{} Benchmark Complete", timestamp);
        println!(
            "{} Started: {}",
            timestamp,
            self.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Millis, false)
        );
        println!("{} Duration: {:.1}s", timestamp, self.duration.as_secs_f64());
        println!(
            "{} Requests: Sent: {} Ok: {} Err: {} Success: {:.2}%",
            timestamp,
            self.summary.total_requests,
            self.summary.successful_requests,
            self.summary.failed_requests,
            self.summary.success_rate * 100.0
        );

        if self.errors.total() > 0 {
            println!(
                "{} Errors: Connection: {} 4xx: {} 5xx: {} Timeout: {} Parse: {} Other: {}",
                timestamp,
                self.errors.connection_errors,
                self.errors.http_4xx_errors,
                self.errors.http_5xx_errors,
                self.errors.timeout_errors,
                self.errors.parse_errors,
                self.errors.other_errors
            );
        }

        println!(
            "{} Tokens: Input: {} Output: {} Total: {}",
            timestamp,
            self.tokens.input,
            self.tokens.output,
            self.tokens.input + self.tokens.output
        );

        for (phase, latency) in [
            (Phase::Sequential, &self.sequential_latency),
            (Phase::Concurrent, &self.concurrent_latency),
        ] {
            println!(
                "{} {} Latency (ms): p50: {:.0} p90: {:.0} p99: {:.0}",
                timestamp,
                phase.label(),
                latency.p50_ms,
                latency.p90_ms,
                latency.p99_ms
            );
        }
    }
}
