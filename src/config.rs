//! Runtime configuration for SSE framing and aggregation policy.
//!
//! Configuration can be built in code, loaded from YAML, and overridden from the
//! environment:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `AI_RESPONSES_MAX_DIAGNOSTICS` | `aggregation.max_diagnostics` |
//! | `AI_RESPONSES_VERIFY_DONE_TEXT` | `aggregation.verify_done_text` |
//!
//! ```yaml
//! decoder:
//!   delimiter: "\n\n"
//!   done_signal: "[DONE]"
//! aggregation:
//!   verify_done_text: true
//!   max_diagnostics: 256
//! ```

use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    #[serde(default)]
    pub decoder: DecoderConfig,
    #[serde(default)]
    pub aggregation: AggregationConfig,
}

/// SSE framing settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Frame separator, after carriage returns are stripped.
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    /// Payload that terminates the stream.
    #[serde(default = "default_done_signal")]
    pub done_signal: String,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            done_signal: default_done_signal(),
        }
    }
}

fn default_delimiter() -> String {
    "\n\n".to_string()
}

fn default_done_signal() -> String {
    "[DONE]".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Record a diagnostic when a `done` value disagrees with the accumulated deltas.
    /// The `done` value replaces the buffer either way.
    #[serde(default = "default_verify_done_text")]
    pub verify_done_text: bool,
    /// Upper bound on diagnostics retained by an aggregator (oldest dropped first).
    #[serde(default = "default_max_diagnostics")]
    pub max_diagnostics: usize,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            verify_done_text: default_verify_done_text(),
            max_diagnostics: default_max_diagnostics(),
        }
    }
}

fn default_verify_done_text() -> bool {
    true
}

fn default_max_diagnostics() -> usize {
    256
}

impl StreamConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration_with_context(
                format!("failed to read stream config: {}", e),
                ErrorContext::new()
                    .with_field_path(path.display().to_string())
                    .with_source("stream_config"),
            )
        })?;
        Self::from_yaml_str(&content)
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(raw) = env::var("AI_RESPONSES_MAX_DIAGNOSTICS") {
            self.aggregation.max_diagnostics = raw.trim().parse().map_err(|_| {
                invalid_env("AI_RESPONSES_MAX_DIAGNOSTICS", &raw, "a non-negative integer")
            })?;
        }
        if let Ok(raw) = env::var("AI_RESPONSES_VERIFY_DONE_TEXT") {
            self.aggregation.verify_done_text = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(invalid_env(
                        "AI_RESPONSES_VERIFY_DONE_TEXT",
                        &raw,
                        "a boolean",
                    ))
                }
            };
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        // Carriage returns are stripped from the wire before framing.
        if self.decoder.delimiter.replace('\r', "").is_empty() {
            return Err(Error::configuration_with_context(
                "frame delimiter must contain more than carriage returns",
                ErrorContext::new()
                    .with_field_path("decoder.delimiter")
                    .with_source("stream_config"),
            ));
        }
        Ok(())
    }
}

fn invalid_env(var: &str, raw: &str, expected: &str) -> Error {
    Error::configuration_with_context(
        format!("invalid value '{}'", raw),
        ErrorContext::new()
            .with_field_path(var)
            .with_details(format!("expected {}", expected))
            .with_source("environment"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_falls_back_to_defaults() {
        let config = StreamConfig::from_yaml_str("aggregation:\n  max_diagnostics: 8\n").unwrap();
        assert_eq!(config.aggregation.max_diagnostics, 8);
        assert!(config.aggregation.verify_done_text);
        assert_eq!(config.decoder, DecoderConfig::default());
    }

    #[test]
    fn test_empty_delimiter_is_rejected() {
        let config = StreamConfig {
            decoder: DecoderConfig {
                delimiter: String::new(),
                done_signal: "[DONE]".into(),
            },
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("decoder.delimiter"));
    }

    #[test]
    fn test_carriage_return_only_delimiter_is_rejected() {
        let mut config = StreamConfig::default();
        config.decoder.delimiter = "\r\r".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("decoder.delimiter"));

        config.decoder.delimiter = "\r\n\r\n".into();
        assert!(config.validate().is_ok());
    }
}
