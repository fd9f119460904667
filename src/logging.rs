use anyhow::Result;
use log::{LevelFilter, Metadata, Record};
use ringlog::{File, Output, Stderr};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Mutex;

use crate::config::LogConfig;

/// Maximum log file size before rotation (10MB)
const LOG_FILE_MAX_SIZE: u64 = 1024 * 1024 * 10;

/// Parse log filter strings like "hyper=info" into a map of module prefix to level filter
pub fn parse_log_filters(filters: &[String]) -> HashMap<String, LevelFilter> {
    let mut map = HashMap::new();
    for filter in filters {
        if let Some((module, level)) = filter.split_once('=') {
            let level_filter = match level.to_lowercase().as_str() {
                "error" => LevelFilter::Error,
                "warn" => LevelFilter::Warn,
                "info" => LevelFilter::Info,
                "debug" => LevelFilter::Debug,
                "trace" => LevelFilter::Trace,
                "off" => LevelFilter::Off,
                _ => continue,
            };
            map.insert(module.to_string(), level_filter);
        }
    }
    map
}

/// Longest matching module prefix wins; unmatched targets fall through to
/// the global level.
fn should_log(metadata: &Metadata, filters: &HashMap<String, LevelFilter>) -> bool {
    let target = metadata.target();

    let matched = filters
        .iter()
        .filter(|(prefix, _)| target.starts_with(prefix.as_str()))
        .max_by_key(|(prefix, _)| prefix.len());

    match matched {
        Some((_, level_filter)) => metadata.level() <= *level_filter,
        None => true,
    }
}

/// Logger with per-module filtering that writes to a ringlog output
struct FilteredLogger {
    output: Mutex<Box<dyn Output>>,
    max_level: LevelFilter,
    filters: HashMap<String, LevelFilter>,
}

impl log::Log for FilteredLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level && should_log(metadata, &self.filters)
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            if let Ok(mut output) = self.output.lock() {
                let message = format!(
                    "{} {} [{}] {}\n",
                    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, false),
                    record.level(),
                    record.target(),
                    record.args()
                );
                let _ = output.write_all(message.as_bytes());
            }
        }
    }

    fn flush(&self) {
        if let Ok(mut output) = self.output.lock() {
            let _ = output.flush();
        }
    }
}

/// Installs the global logger: stderr by default, or a rotating file.
pub fn init(config: &LogConfig) -> Result<()> {
    let max_level = config.level.to_level_filter();

    let output: Box<dyn Output> = if let Some(ref log_file) = config.file {
        let backup_file = log_file.with_extension("old");
        Box::new(File::new(log_file.clone(), backup_file, LOG_FILE_MAX_SIZE)?)
    } else {
        Box::new(Stderr::new())
    };

    let logger = FilteredLogger {
        output: Mutex::new(output),
        max_level,
        filters: parse_log_filters(&config.filter),
    };

    log::set_boxed_logger(Box::new(logger))
        .map_err(|e| anyhow::anyhow!("failed to set logger: {}", e))?;
    log::set_max_level(max_level);
    Ok(())
}
