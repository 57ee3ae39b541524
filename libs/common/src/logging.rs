//! Logging initialisation for services embedding voltage-dnp3
//!
//! Console output uses the bracketed `timestamp [LEVEL] message` layout, or
//! one JSON object per line when [`LogFormat::Json`] is selected. The filter
//! honours `RUST_LOG` and can be changed at runtime with [`set_log_level`].

use std::sync::{Mutex, OnceLock};

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::Writer, FmtContext, FormatEvent, FormatFields},
    layer::SubscriberExt,
    registry::LookupSpan,
    reload,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Custom format for log level with brackets: `[INFO]`, `[WARN]`, etc.
fn format_level(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "[TRACE]",
        Level::DEBUG => "[DEBUG]",
        Level::INFO => "[INFO]",
        Level::WARN => "[WARN]",
        Level::ERROR => "[ERROR]",
    }
}

/// Custom event formatter that outputs: `timestamp [LEVEL] target: message`
///
/// Example output:
/// `2025-12-02T00:50:44.809123Z [DEBUG] voltage_dnp3::sink: Counter(5, 0x1, 1000)`
struct BracketedLevelFormat;

impl<S, N> FormatEvent<S, N> for BracketedLevelFormat
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let now = chrono::Utc::now();
        write!(writer, "{} ", now.format("%Y-%m-%dT%H:%M:%S%.6fZ"))?;

        let level = *event.metadata().level();
        if writer.has_ansi_escapes() {
            let color = match level {
                Level::TRACE => "\x1b[35m", // magenta
                Level::DEBUG => "\x1b[34m", // blue
                Level::INFO => "\x1b[32m",  // green
                Level::WARN => "\x1b[33m",  // yellow
                Level::ERROR => "\x1b[31m", // red
            };
            write!(writer, "{}{}\x1b[0m ", color, format_level(&level))?;
        } else {
            write!(writer, "{} ", format_level(&level))?;
        }

        write!(writer, "{}: ", event.metadata().target())?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

type EnvFilterReloadHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;
static LOG_FILTER_HANDLE: OnceLock<EnvFilterReloadHandle> = OnceLock::new();
static CURRENT_LOG_LEVEL: OnceLock<Mutex<String>> = OnceLock::new();

/// Console output layout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// `timestamp [LEVEL] target: message`
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// Logger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Component name recorded in the start-up event (e.g. the outstation name)
    pub component: String,
    /// Filter used when `RUST_LOG` is not set (e.g. "info", "info,voltage_dnp3=debug")
    pub level: String,
    /// Console layout
    pub format: LogFormat,
    /// Emit ANSI colours in text mode
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            component: "voltage-dnp3".to_string(),
            level: "info".to_string(),
            format: LogFormat::Text,
            ansi: true,
        }
    }
}

/// Initialize the global subscriber with configuration
///
/// Fails if a global subscriber has already been installed.
pub fn init_with_config(config: &LogConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filter_str = std::env::var("RUST_LOG").unwrap_or_else(|_| config.level.clone());
    let env_filter = EnvFilter::try_new(&filter_str)?;
    let (filter_layer, handle) = reload::Layer::new(env_filter);

    let text_layer = (config.format == LogFormat::Text).then(|| {
        fmt::layer()
            .event_format(BracketedLevelFormat)
            .with_ansi(config.ansi)
    });
    let json_layer = (config.format == LogFormat::Json).then(|| fmt::layer().json());

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(text_layer)
        .with(json_layer)
        .try_init()?;

    // Only the first successful init reaches this point
    let _ = LOG_FILTER_HANDLE.set(handle);
    store_level(&filter_str);

    tracing::info!(
        component = %config.component,
        "Logging initialized with filter '{}'",
        filter_str
    );
    Ok(())
}

/// Initialize with a bare level string and default layout
pub fn init(level: &str) -> Result<(), Box<dyn std::error::Error>> {
    init_with_config(&LogConfig {
        level: level.to_string(),
        ..Default::default()
    })
}

fn store_level(level: &str) {
    let current = CURRENT_LOG_LEVEL.get_or_init(|| Mutex::new(String::new()));
    match current.lock() {
        Ok(mut guard) => *guard = level.to_string(),
        Err(poisoned) => *poisoned.into_inner() = level.to_string(),
    }
}

/// Dynamically set log filter level at runtime
///
/// # Arguments
/// * `level` - Log level string (e.g., "debug", "warn") or full filter string
///   (e.g., "info,voltage_dnp3=debug")
///
/// # Example
/// ```ignore
/// common::logging::set_log_level("info,voltage_dnp3::decode=trace")?;
/// ```
pub fn set_log_level(level: &str) -> Result<(), String> {
    let handle = LOG_FILTER_HANDLE
        .get()
        .ok_or("Logging not initialized with reload support")?;

    let new_filter =
        EnvFilter::try_new(level).map_err(|e| format!("Invalid log level '{}': {}", level, e))?;

    handle
        .reload(new_filter)
        .map_err(|e| format!("Failed to reload log filter: {}", e))?;

    store_level(level);
    tracing::info!("Log level changed to: {}", level);
    Ok(())
}

/// Get current log filter level, or "unknown" before initialisation
pub fn get_log_level() -> String {
    CURRENT_LOG_LEVEL
        .get()
        .and_then(|m| m.lock().ok())
        .map(|guard| guard.clone())
        .unwrap_or_else(|| "unknown".to_string())
}
