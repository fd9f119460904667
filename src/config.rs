use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub endpoint: EndpointConfig,
    #[serde(default)]
    pub load: LoadConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub model: Option<String>, // If not provided, taken from the health probe
    #[serde(default = "default_request_timeout")]
    pub request_timeout: String,
    #[serde(default = "default_smoke_timeout")]
    pub smoke_timeout: String,
    #[serde(default = "default_health_timeout")]
    pub health_timeout: String,
    #[serde(default)]
    pub usage: UsagePolicy,
}

/// What to do when a response carries no usage metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UsagePolicy {
    /// Missing counters read as zero.
    #[default]
    Tolerate,
    /// Missing counters fail the request.
    Require,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoadConfig {
    #[serde(default = "default_rounds")]
    pub rounds: usize,
    #[serde(default = "default_concurrent")]
    pub concurrent: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: LogLevel,
    /// Per-module log level overrides (e.g., ["hyper=info", "h2=warn"])
    #[serde(default)]
    pub filter: Vec<String>,
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            model: None,
            request_timeout: default_request_timeout(),
            smoke_timeout: default_smoke_timeout(),
            health_timeout: default_health_timeout(),
            usage: UsagePolicy::default(),
        }
    }
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            rounds: default_rounds(),
            concurrent: default_concurrent(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_threads: default_worker_threads(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            filter: Vec::new(),
            file: None,
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_request_timeout() -> String {
    "300s".to_string()
}

fn default_smoke_timeout() -> String {
    "120s".to_string()
}

fn default_health_timeout() -> String {
    "10s".to_string()
}

fn default_rounds() -> usize {
    3
}

fn default_concurrent() -> usize {
    2
}

fn default_worker_threads() -> usize {
    num_cpus::get()
}

fn default_log_level() -> LogLevel {
    LogLevel::Warn
}

impl EndpointConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> anyhow::Result<Duration> {
        parse_timeout("endpoint.request_timeout", &self.request_timeout)
    }

    pub fn smoke_timeout(&self) -> anyhow::Result<Duration> {
        parse_timeout("endpoint.smoke_timeout", &self.smoke_timeout)
    }

    pub fn health_timeout(&self) -> anyhow::Result<Duration> {
        parse_timeout("endpoint.health_timeout", &self.health_timeout)
    }
}

fn parse_timeout(name: &str, value: &str) -> anyhow::Result<Duration> {
    let duration = humantime::parse_duration(value)
        .map_err(|e| anyhow::anyhow!("{} is not a valid duration ({:?}): {}", name, value, e))?;
    if duration.is_zero() {
        anyhow::bail!("{} must be greater than 0", name);
    }
    Ok(duration)
}

impl Config {
    /// Loads the configuration file if one is given, otherwise the built-in
    /// defaults. Validation is left to the caller so that command line
    /// overrides can be applied first.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path).map_err(|e| {
                    anyhow::anyhow!("failed to read config {}: {}", path.display(), e)
                })?;
                let config: Config = toml::from_str(&contents)?;
                Ok(config)
            }
            None => Ok(Config::default()),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.load.concurrent == 0 {
            anyhow::bail!("concurrent must be greater than 0");
        }

        if self.load.concurrent.checked_mul(self.load.rounds).is_none() {
            anyhow::bail!(
                "concurrent x rounds overflows ({} x {})",
                self.load.concurrent,
                self.load.rounds
            );
        }

        if self.runtime.worker_threads == 0 {
            anyhow::bail!("worker_threads must be greater than 0");
        }

        self.endpoint.request_timeout()?;
        self.endpoint.smoke_timeout()?;
        self.endpoint.health_timeout()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.endpoint.base_url(), "http://localhost:8000");
        assert_eq!(config.load.rounds, 3);
        assert_eq!(config.load.concurrent, 2);
        assert_eq!(config.endpoint.usage, UsagePolicy::Tolerate);
        assert_eq!(
            config.endpoint.request_timeout().unwrap(),
            Duration::from_secs(300)
        );
        assert_eq!(
            config.endpoint.smoke_timeout().unwrap(),
            Duration::from_secs(120)
        );
        assert_eq!(
            config.endpoint.health_timeout().unwrap(),
            Duration::from_secs(10)
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[endpoint]
host = "10.0.0.1"
request_timeout = "2m"
usage = "require"

[load]
concurrent = 4
"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.endpoint.base_url(), "http://10.0.0.1:8000");
        assert_eq!(
            config.endpoint.request_timeout().unwrap(),
            Duration::from_secs(120)
        );
        assert_eq!(config.endpoint.usage, UsagePolicy::Require);
        assert_eq!(config.load.concurrent, 4);
        assert_eq!(config.load.rounds, 3);
        assert_eq!(config.log.level, LogLevel::Warn);
    }

    #[test]
    fn test_validation_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.load.concurrent = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_workers() {
        let mut config = Config::default();
        config.runtime.worker_threads = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_bad_timeouts() {
        let mut config = Config::default();
        config.endpoint.health_timeout = "soon".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.endpoint.request_timeout = "0s".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_overflowing_load() {
        let mut config = Config::default();
        config.load.rounds = usize::MAX;
        config.load.concurrent = 2;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("overflows"));

        config.load.rounds = 1 << 40;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_rounds_is_valid() {
        let mut config = Config::default();
        config.load.rounds = 0;
        assert!(config.validate().is_ok());
    }
}
