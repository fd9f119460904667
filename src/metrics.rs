use metriken::{AtomicHistogram, Counter, LazyCounter, metric};

/// Which benchmark phase issued a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Sequential,
    Concurrent,
}

impl Phase {
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Sequential => "Sequential",
            Phase::Concurrent => "Concurrent",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum RequestStatus {
    Success,
    Failed(ErrorType),
}

#[derive(Debug, Clone, Copy)]
pub enum ErrorType {
    Connection,
    Http4xx(u16),
    Http5xx(u16),
    Parse,
    Timeout,
    Other,
}

#[metric(
    name = "chat_completions",
    description = "Chat completions issued by the sequential phase",
    metadata = { phase = "sequential" }
)]
pub static SEQUENTIAL_SENT: LazyCounter = LazyCounter::new(Counter::default);

#[metric(
    name = "chat_completions",
    description = "Chat completions issued by the concurrent phase",
    metadata = { phase = "concurrent" }
)]
pub static CONCURRENT_SENT: LazyCounter = LazyCounter::new(Counter::default);

#[metric(
    name = "chat_completions_ok",
    description = "Chat completions that produced a result"
)]
pub static COMPLETIONS_OK: LazyCounter = LazyCounter::new(Counter::default);

#[metric(
    name = "chat_completions_failed",
    description = "Chat completions dropped from the statistics"
)]
pub static COMPLETIONS_FAILED: LazyCounter = LazyCounter::new(Counter::default);

// Failure causes, one counter per ClientError class
#[metric(
    name = "failures",
    description = "Calls that could not reach the server",
    metadata = { cause = "connection" }
)]
pub static FAILURES_CONNECTION: LazyCounter = LazyCounter::new(Counter::default);

#[metric(
    name = "failures",
    description = "Calls rejected with a 4xx status",
    metadata = { cause = "http_4xx" }
)]
pub static FAILURES_HTTP_4XX: LazyCounter = LazyCounter::new(Counter::default);

#[metric(
    name = "failures",
    description = "Calls answered with a 5xx status",
    metadata = { cause = "http_5xx" }
)]
pub static FAILURES_HTTP_5XX: LazyCounter = LazyCounter::new(Counter::default);

#[metric(
    name = "failures",
    description = "Responses that did not decode",
    metadata = { cause = "parse" }
)]
pub static FAILURES_PARSE: LazyCounter = LazyCounter::new(Counter::default);

#[metric(
    name = "failures",
    description = "Calls that hit the request timeout",
    metadata = { cause = "timeout" }
)]
pub static FAILURES_TIMEOUT: LazyCounter = LazyCounter::new(Counter::default);

#[metric(
    name = "failures",
    description = "Failures of any other kind",
    metadata = { cause = "other" }
)]
pub static FAILURES_OTHER: LazyCounter = LazyCounter::new(Counter::default);

#[metric(
    name = "usage_tokens",
    description = "Prompt tokens reported by the server",
    metadata = { kind = "prompt" }
)]
pub static PROMPT_TOKENS: LazyCounter = LazyCounter::new(Counter::default);

#[metric(
    name = "usage_tokens",
    description = "Completion tokens reported by the server",
    metadata = { kind = "completion" }
)]
pub static COMPLETION_TOKENS: LazyCounter = LazyCounter::new(Counter::default);

// Latencies are recorded in whole milliseconds, the resolution of
// RequestResult::elapsed_s. (grouping_power=7, max_value_power=32) keeps
// bucket error under 1% up to ~49 days.
#[metric(
    name = "completion_latency",
    description = "Sequential phase round-trip time",
    metadata = { phase = "sequential", unit = "milliseconds" }
)]
pub static SEQUENTIAL_LATENCY: AtomicHistogram = AtomicHistogram::new(7, 32);

#[metric(
    name = "completion_latency",
    description = "Concurrent phase round-trip time",
    metadata = { phase = "concurrent", unit = "milliseconds" }
)]
pub static CONCURRENT_LATENCY: AtomicHistogram = AtomicHistogram::new(7, 32);

impl Phase {
    fn sent_counter(&self) -> &'static LazyCounter {
        match self {
            Phase::Sequential => &SEQUENTIAL_SENT,
            Phase::Concurrent => &CONCURRENT_SENT,
        }
    }

    pub fn latency_histogram(&self) -> &'static AtomicHistogram {
        match self {
            Phase::Sequential => &SEQUENTIAL_LATENCY,
            Phase::Concurrent => &CONCURRENT_LATENCY,
        }
    }
}

impl ErrorType {
    fn failure_counter(&self) -> &'static LazyCounter {
        match self {
            ErrorType::Connection => &FAILURES_CONNECTION,
            ErrorType::Http4xx(_) => &FAILURES_HTTP_4XX,
            ErrorType::Http5xx(_) => &FAILURES_HTTP_5XX,
            ErrorType::Parse => &FAILURES_PARSE,
            ErrorType::Timeout => &FAILURES_TIMEOUT,
            ErrorType::Other => &FAILURES_OTHER,
        }
    }
}

/// Recording facade used around every benchmark call.
pub struct Metrics;

impl Metrics {
    pub fn record_request_sent(phase: Phase) {
        phase.sent_counter().increment();
    }

    pub fn record_request_complete(status: RequestStatus) {
        match status {
            RequestStatus::Success => {
                COMPLETIONS_OK.increment();
            }
            RequestStatus::Failed(error_type) => {
                COMPLETIONS_FAILED.increment();
                error_type.failure_counter().increment();
            }
        }
    }

    pub fn record_tokens(prompt: u64, completion: u64) {
        PROMPT_TOKENS.add(prompt);
        COMPLETION_TOKENS.add(completion);
    }

    /// Records a successful call's stored elapsed time.
    pub fn record_latency(phase: Phase, elapsed_s: f64) {
        let millis = (elapsed_s * 1000.0).round().max(0.0) as u64;
        let _ = phase.latency_histogram().increment(millis);
    }
}
