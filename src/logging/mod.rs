//! Structured logging setup
//!
//! The library only emits `tracing` events. Hosts that want the standard
//! subscriber call [`init_tracing`] once at startup.

use crate::config::{LogFormat, LoggingConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// `EnvFilter` directives: the base level, then one `routewise::<component>`
/// directive per override in module-path order.
///
/// # Examples
///
/// ```
/// use routewise::config::{LogLevel, LoggingConfig};
/// use routewise::logging::build_filter_directives;
///
/// let mut config = LoggingConfig::default();
/// config
///     .component_levels
///     .insert("cache".to_string(), LogLevel::Debug);
///
/// assert_eq!(build_filter_directives(&config), "info,routewise::cache=debug");
/// ```
pub fn build_filter_directives(config: &LoggingConfig) -> String {
    let mut filter_str = config.level.to_string();
    for (component, level) in &config.component_levels {
        filter_str.push_str(&format!(",routewise::{}={}", component, level));
    }
    filter_str
}

/// Initialize tracing based on configuration
///
/// `RUST_LOG` takes precedence over the configured directives. Fails if a
/// global subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filter_str = build_filter_directives(config);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    if config.enable_content_logging {
        eprintln!("WARNING: Content logging is enabled. Task text will be logged.");
        eprintln!("         This may include sensitive data. Use only for debugging.");
    }

    match config.format {
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()?;
        }
    }

    Ok(())
}

/// Truncate task text to at most `max_chars` characters
///
/// Cuts on a char boundary and appends "..." when anything was dropped.
pub fn truncate_prompt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Prompt preview for log events. `limit` comes from
/// [`LoggingConfig::content_preview_limit`]; `None` keeps text out of logs.
pub fn prompt_preview(text: &str, limit: Option<usize>) -> Option<String> {
    limit.map(|max_chars| truncate_prompt(text, max_chars))
}
