use std::time::Duration;

use crate::client::{ClientError, list_models};

/// Model identifier reported when the server lists no models.
pub const UNKNOWN_MODEL: &str = "unknown";

/// Model requested when neither the flags nor the server name one.
pub const DEFAULT_MODEL: &str = "Kimi-K2.5";

/// What the model-listing endpoint reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    pub models: Vec<String>,
}

impl HealthReport {
    /// First model the server lists, or `unknown`.
    pub fn primary_model(&self) -> &str {
        self.models
            .first()
            .map(String::as_str)
            .unwrap_or(UNKNOWN_MODEL)
    }

    /// First model the server lists, if any.
    pub fn detected_model(&self) -> Option<&str> {
        self.models.first().map(String::as_str)
    }
}

/// Picks the model to request: configured, then detected, then the default.
pub fn resolve_model(configured: Option<&str>, report: &HealthReport) -> String {
    configured
        .or_else(|| report.detected_model())
        .unwrap_or(DEFAULT_MODEL)
        .to_string()
}

/// Checks that the server is up by listing its models.
///
/// Single attempt, no retry. Any failure is returned to the caller, which
/// treats it as fatal.
pub async fn probe(base_url: &str, timeout: Duration) -> Result<HealthReport, ClientError> {
    log::debug!("Health check: GET {}/v1/models", base_url);

    let models = list_models(base_url, timeout).await?;
    let models: Vec<String> = models.into_iter().map(|m| m.id).collect();

    if models.len() > 1 {
        log::debug!("Server lists {} models: {:?}", models.len(), models);
    }

    Ok(HealthReport { models })
}
