//! Orchestrator configuration.
//!
//! Every field has a default, so an empty TOML document is a valid
//! configuration:
//!
//! ```toml
//! parallel_file_limit = 2
//! retry_count = 3
//! accepted_mime_types = "video/mp4,.mp4"
//!
//! [retry]
//! initial_delay_ms = 500
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Settings shared by every upload an orchestrator tracks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Maximum number of files uploading at once. `None` means unrestricted.
    pub parallel_file_limit: Option<usize>,

    /// Transfer retries per file, shared by all recoverable failure kinds.
    pub retry_count: u32,

    /// Fixed part size in bytes. `None` derives it from the file size.
    pub part_size: Option<u64>,

    /// Concurrency hint passed to the transfer backend.
    pub parallel_parts: Option<usize>,

    /// Comma-separated extra allow-list of MIME types and extensions.
    pub accepted_mime_types: Option<String>,

    /// Talk to storage over HTTPS.
    pub secure_transport: bool,

    /// Start uploads as soon as they are added.
    pub auto_start: bool,

    /// Delay between transfer retries.
    pub retry: RetryConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            parallel_file_limit: None,
            retry_count: 3,
            part_size: None,
            parallel_parts: None,
            accepted_mime_types: None,
            secure_transport: true,
            auto_start: false,
            retry: RetryConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Parses a TOML document and validates it.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Rejects values that would stall or spin the scheduler.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.parallel_file_limit == Some(0) {
            return Err(ConfigError::Invalid(
                "parallel_file_limit must be at least 1".into(),
            ));
        }
        if self.part_size == Some(0) {
            return Err(ConfigError::Invalid("part_size must be positive".into()));
        }
        if self.parallel_parts == Some(0) {
            return Err(ConfigError::Invalid(
                "parallel_parts must be at least 1".into(),
            ));
        }
        if !self.retry.backoff_factor.is_finite() || self.retry.backoff_factor < 1.0 {
            return Err(ConfigError::Invalid(
                "retry.backoff_factor must be a finite number >= 1".into(),
            ));
        }
        Ok(())
    }
}

/// Exponential backoff between transfer retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Delay before the first retry. Zero disables waiting.
    pub initial_delay_ms: u64,
    /// Upper bound of the delay.
    pub max_delay_ms: u64,
    /// Multiplier for each subsequent retry.
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 500,
            max_delay_ms: 10_000,
            backoff_factor: 2.0,
        }
    }
}

impl RetryConfig {
    /// No delay between retries.
    pub fn immediate() -> Self {
        Self {
            initial_delay_ms: 0,
            ..Self::default()
        }
    }

    /// Delay before retry `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if self.initial_delay_ms == 0 {
            return Duration::ZERO;
        }
        let exp = attempt.saturating_sub(1).min(63) as i32;
        let ms = self.initial_delay_ms as f64 * self.backoff_factor.powi(exp);
        Duration::from_millis(ms.min(self.max_delay_ms as f64) as u64)
    }
}
