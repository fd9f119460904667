pub mod benchmark;
pub mod cli;
pub mod client;
pub mod config;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod report;
pub mod result;
pub mod smoke;
pub mod stats;

pub use benchmark::{BenchmarkRunner, Inference, Probe};
pub use cli::{BenchCli, SmokeCli};
pub use client::{ClientConfig, ClientError, InferenceClient};
pub use config::{Config, UsagePolicy};
pub use health::HealthReport;
pub use result::RequestResult;
