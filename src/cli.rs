use clap::{Args, Parser};
use std::path::PathBuf;

use crate::config::{Config, LogLevel, UsagePolicy};

/// Flags shared by both tools.
#[derive(Args, Debug, Clone, Default)]
pub struct EndpointArgs {
    /// Server host [default: localhost]
    #[arg(long)]
    pub host: Option<String>,

    /// Server port [default: 8000]
    #[arg(long)]
    pub port: Option<u16>,

    /// Model identifier to request (defaults to the first model the server lists)
    #[arg(long)]
    pub model: Option<String>,

    /// Optional TOML configuration file; flags take precedence over it
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log level for diagnostics written to stderr [default: warn]
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Treat responses without usage metadata as failures
    #[arg(long)]
    pub require_usage: bool,
}

#[derive(Parser, Debug)]
#[command(name = "vllm-bench")]
#[command(author, version, about = "Benchmark latency and throughput of an OpenAI-compatible LLM endpoint", long_about = None)]
pub struct BenchCli {
    #[command(flatten)]
    pub endpoint: EndpointArgs,

    /// Number of rounds per benchmark [default: 3]
    #[arg(long)]
    pub rounds: Option<usize>,

    /// Concurrent requests for the throughput test [default: 2]
    #[arg(long)]
    pub concurrent: Option<usize>,
}

#[derive(Parser, Debug)]
#[command(name = "vllm-smoke")]
#[command(author, version, about = "Smoke test an OpenAI-compatible LLM endpoint", long_about = None)]
pub struct SmokeCli {
    #[command(flatten)]
    pub endpoint: EndpointArgs,
}

impl EndpointArgs {
    fn apply(self, config: &mut Config) {
        if let Some(host) = self.host {
            config.endpoint.host = host;
        }
        if let Some(port) = self.port {
            config.endpoint.port = port;
        }
        if let Some(model) = self.model {
            config.endpoint.model = Some(model);
        }
        if let Some(level) = self.log_level {
            config.log.level = level;
        }
        if self.require_usage {
            config.endpoint.usage = UsagePolicy::Require;
        }
    }
}

impl BenchCli {
    pub fn parse_args() -> Self {
        BenchCli::parse()
    }

    /// Merges the optional config file with the flags and validates the result.
    pub fn into_config(self) -> anyhow::Result<Config> {
        let mut config = Config::load(self.endpoint.config.as_deref())?;
        self.endpoint.apply(&mut config);
        if let Some(rounds) = self.rounds {
            config.load.rounds = rounds;
        }
        if let Some(concurrent) = self.concurrent {
            config.load.concurrent = concurrent;
        }
        config.validate()?;
        Ok(config)
    }
}

impl SmokeCli {
    pub fn parse_args() -> Self {
        SmokeCli::parse()
    }

    pub fn into_config(self) -> anyhow::Result<Config> {
        let mut config = Config::load(self.endpoint.config.as_deref())?;
        self.endpoint.apply(&mut config);
        config.validate()?;
        Ok(config)
    }
}
