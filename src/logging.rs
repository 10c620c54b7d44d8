use std::fmt;
use std::path::Path;

use clap::ValueEnum;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::{fmt as fmt_layer, prelude::*, EnvFilter};

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable console output
    #[default]
    Text,
    /// One JSON object per event, for log aggregation
    Json,
}

/// Severity threshold. Accepts the Python-style names used by older
/// deployments (`WARNING`, `CRITICAL`) as aliases.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    #[value(alias = "warning")]
    Warn,
    #[value(alias = "critical")]
    Error,
}

impl LogLevel {
    /// Case-insensitive parse, used for the `LOG_LEVEL` fallback.
    pub fn parse(value: &str) -> Option<Self> {
        <Self as ValueEnum>::from_str(value.trim(), true).ok()
    }

    /// The `EnvFilter` directive for this level.
    pub fn as_directive(&self) -> &'static str {
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
        f.write_str(self.as_directive())
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Text => f.write_str("text"),
            LogFormat::Json => f.write_str("json"),
        }
    }
}

/// File name of the JSON log written under the log directory.
pub const LOG_FILE_NAME: &str = "tts_service.log";

/// Install the global subscriber. `RUST_LOG` takes precedence over `level`.
///
/// Console output follows `format`. When `log_dir` is given, every event is
/// also appended as JSON to `LOG_FILE_NAME` inside it; the returned guard
/// flushes that file and must be held until exit.
pub fn init_logging(
    level: LogLevel,
    format: LogFormat,
    log_dir: Option<&Path>,
) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_directive()));

    let text = (format == LogFormat::Text).then(|| fmt_layer::layer().with_target(true));
    let json = (format == LogFormat::Json).then(|| {
        fmt_layer::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
    });

    let mut file_error = None;
    let (file, guard) = match log_dir.map(file_appender) {
        Some(Ok(appender)) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt_layer::layer()
                .json()
                .with_ansi(false)
                .with_current_span(true)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        Some(Err(e)) => {
            file_error = Some(e);
            (None, None)
        }
        None => (None, None),
    };

    let result = tracing_subscriber::registry()
        .with(env_filter)
        .with(text)
        .with(json)
        .with(file)
        .try_init();

    if let Err(e) = result {
        eprintln!("logging already initialised: {e}");
    }
    if let (Some(dir), Some(e)) = (log_dir, file_error) {
        tracing::warn!(path = %dir.display(), error = %e, "File logging disabled");
    }

    guard
}

fn file_appender(dir: &Path) -> Result<RollingFileAppender, InitError> {
    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(LOG_FILE_NAME)
        .build(dir)
}
