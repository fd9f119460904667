use std::fmt::Write;

use crate::result::RequestResult;

/// Min, mean and max of a set of values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spread {
    pub min: f64,
    pub mean: f64,
    pub max: f64,
}

impl Spread {
    fn of(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some(Self {
            min,
            mean: mean(values),
            max,
        })
    }
}

/// Aggregate figures for a non-empty result list.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub requests: usize,
    pub latency: Spread,
    pub latency_median: f64,
    /// Only over results with a positive tokens/s; `None` when there are none
    pub throughput: Option<Spread>,
    pub total_output_tokens: u64,
    pub total_elapsed_s: f64,
}

impl Summary {
    /// Returns `None` for an empty list; nothing is computed in that case.
    pub fn from_results(results: &[RequestResult]) -> Option<Self> {
        let latencies: Vec<f64> = results.iter().map(|r| r.elapsed_s).collect();
        let latency = Spread::of(&latencies)?;

        let tps_values: Vec<f64> = results
            .iter()
            .map(|r| r.tokens_per_second)
            .filter(|tps| *tps > 0.0)
            .collect();

        Some(Self {
            requests: results.len(),
            latency,
            latency_median: median(&latencies),
            throughput: Spread::of(&tps_values),
            total_output_tokens: results.iter().map(|r| r.output_tokens).sum(),
            total_elapsed_s: latencies.iter().sum(),
        })
    }

    /// Output tokens over summed request time. This is not the mean of the
    /// per-request rates.
    pub fn aggregate_tokens_per_second(&self) -> f64 {
        if self.total_elapsed_s > 0.0 {
            self.total_output_tokens as f64 / self.total_elapsed_s
        } else {
            0.0
        }
    }
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Renders the statistics block for `results` under `label`.
pub fn format_stats(label: &str, results: &[RequestResult]) -> String {
    let Some(summary) = Summary::from_results(results) else {
        return format!("\n{}: No results", label);
    };

    let mut out = String::new();
    let _ = writeln!(out, "\n{}:", label);
    let _ = writeln!(out, "  Requests:     {}", summary.requests);
    let _ = writeln!(
        out,
        "  Latency (s):  min={:.2}  avg={:.2}  max={:.2}  p50={:.2}",
        summary.latency.min, summary.latency.mean, summary.latency.max, summary.latency_median
    );
    if let Some(tps) = summary.throughput {
        let _ = writeln!(
            out,
            "  Tok/s:        min={:.1}  avg={:.1}  max={:.1}",
            tps.min, tps.mean, tps.max
        );
    }
    let _ = writeln!(
        out,
        "  Total output: {} tokens in {:.1}s",
        summary.total_output_tokens, summary.total_elapsed_s
    );
    let _ = write!(
        out,
        "  Aggregate:    {:.1} tok/s",
        summary.aggregate_tokens_per_second()
    );
    out
}

pub fn print_stats(label: &str, results: &[RequestResult]) {
    println!("{}", format_stats(label, results));
}
