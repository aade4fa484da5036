//! `[logging]` section
//!
//! Levels are typed, so a misspelt level is a parse error. Per-component
//! overrides are keyed by module path below `routewise::` and must name one
//! of [`COMPONENTS`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::ConfigError;

/// Module paths that accept a level override
pub const COMPONENTS: &[&str] = &[
    "cache",
    "cache::embedding",
    "cache::store",
    "catalog",
    "config",
    "context",
    "logging",
    "outcomes",
    "outcomes::sqlite",
    "pipeline",
    "pipeline::classify",
    "pipeline::collaborators",
    "routing",
    "routing::classifier",
    "routing::cost",
    "routing::features",
    "routing::learned",
    "routing::rules",
    "routing::strategy",
];

/// Default number of task characters kept in a log preview
pub const DEFAULT_PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("Invalid log level: {}", other)),
        }
    }
}

/// Subscriber output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    /// One JSON object per event, for log shippers
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("Invalid log format: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    /// Overrides keyed by a [`COMPONENTS`] entry, e.g. `"routing::learned"`
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub component_levels: BTreeMap<String, LogLevel>,
    /// Put task text previews into pipeline debug events.
    /// Task text may carry user data.
    pub enable_content_logging: bool,
    pub content_preview_chars: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Pretty,
            component_levels: BTreeMap::new(),
            enable_content_logging: false,
            content_preview_chars: DEFAULT_PREVIEW_CHARS,
        }
    }
}

impl LoggingConfig {
    /// Preview length when content logging is on
    pub fn content_preview_limit(&self) -> Option<usize> {
        self.enable_content_logging.then_some(self.content_preview_chars)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(unknown) = self
            .component_levels
            .keys()
            .find(|key| !COMPONENTS.contains(&key.as_str()))
        {
            return Err(ConfigError::validation(
                "logging.component_levels",
                format!(
                    "unknown component '{}', expected one of: {}",
                    unknown,
                    COMPONENTS.join(", ")
                ),
            ));
        }
        if self.enable_content_logging && self.content_preview_chars == 0 {
            return Err(ConfigError::validation(
                "logging.content_preview_chars",
                "must be non-zero when content logging is enabled",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_keep_content_out_of_logs() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, LogLevel::Info);
        assert_eq!(config.format, LogFormat::Pretty);
        assert!(config.component_levels.is_empty());
        assert_eq!(config.content_preview_limit(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_level_parsing() {
        assert_eq!(LogLevel::from_str(" DEBUG ").unwrap(), LogLevel::Debug);
        assert_eq!(LogLevel::from_str("warning").unwrap(), LogLevel::Warn);
        assert!(LogLevel::from_str("verbose").is_err());
        assert_eq!(LogFormat::from_str("Json").unwrap(), LogFormat::Json);
        assert!(LogFormat::from_str("xml").is_err());
    }

    #[test]
    fn test_component_levels_from_toml() {
        let config: LoggingConfig = toml::from_str(
            r#"
            level = "warn"
            format = "json"

            [component_levels]
            cache = "debug"
            "routing::learned" = "trace"
            "#,
        )
        .unwrap();
        assert_eq!(config.level, LogLevel::Warn);
        assert_eq!(config.component_levels["routing::learned"], LogLevel::Trace);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_misspelt_level_fails_to_parse() {
        let parsed: Result<LoggingConfig, _> =
            toml::from_str("[component_levels]\ncache = \"loud\"");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_unknown_component_is_rejected() {
        let mut config = LoggingConfig::default();
        config
            .component_levels
            .insert("api".to_string(), LogLevel::Debug);
        match config.validate() {
            Err(ConfigError::Validation { field, message }) => {
                assert_eq!(field, "logging.component_levels");
                assert!(message.contains("'api'"));
            }
            other => panic!("Expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_content_preview_limit() {
        let config = LoggingConfig {
            enable_content_logging: true,
            content_preview_chars: 40,
            ..LoggingConfig::default()
        };
        assert_eq!(config.content_preview_limit(), Some(40));

        let zero = LoggingConfig {
            content_preview_chars: 0,
            ..config
        };
        assert!(matches!(
            zero.validate(),
            Err(ConfigError::Validation { field, .. }) if field == "logging.content_preview_chars"
        ));
    }
}
