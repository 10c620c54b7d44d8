//! Process-wide settings merged from CLI flags and `TTS_*` environment variables.
//!
//! Flags win over environment variables, which win over the defaults. Range and
//! enum checks run inside clap's value parsers so an invalid deployment fails
//! before any socket is bound.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, ValueEnum};

use crate::error::ConfigError;
use crate::logging::{LogFormat, LogLevel};
use crate::tts::kokoro::{MAX_SPEED, MIN_SPEED};
use crate::tts::{AudioFormat, BackendKind};

/// FastTalk TTS Service
#[derive(Debug, Parser)]
#[command(name = "fasttalk-tts")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Operating mode
    #[arg(value_enum)]
    pub mode: Mode,

    /// Display configuration (config mode)
    #[arg(long)]
    pub show: bool,

    #[command(flatten)]
    pub settings: SettingsArgs,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Run the WebSocket and monitoring servers
    Websocket,
    /// Inspect the resolved configuration
    Config,
}

#[derive(Debug, Clone, Args)]
pub struct SettingsArgs {
    /// WebSocket bind host
    #[arg(long, env = "TTS_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// WebSocket bind port
    #[arg(long, env = "TTS_PORT", default_value_t = 8000,
          value_parser = clap::value_parser!(u16).range(1024..))]
    pub port: u16,

    /// Monitoring bind host
    #[arg(long, env = "TTS_MONITORING_HOST", default_value = "0.0.0.0")]
    pub monitoring_host: String,

    /// Monitoring bind port
    #[arg(long, env = "TTS_MONITORING_PORT", default_value_t = 9093,
          value_parser = clap::value_parser!(u16).range(1024..))]
    pub monitoring_port: u16,

    /// Maximum concurrent WebSocket connections
    #[arg(long, env = "TTS_MAX_CONNECTIONS", default_value_t = 50,
          value_parser = clap::value_parser!(u32).range(1..))]
    pub max_connections: u32,

    /// Log level (falls back to LOG_LEVEL, then "info")
    #[arg(long, env = "TTS_LOG_LEVEL", value_enum, ignore_case = true)]
    pub log_level: Option<LogLevel>,

    /// Log output format
    #[arg(long, env = "TTS_LOG_FORMAT", value_enum, default_value = "text")]
    pub log_format: LogFormat,

    /// Default voice
    #[arg(long = "voice", env = "TTS_DEFAULT_VOICE", default_value = "af_sarah")]
    pub default_voice: String,

    /// Default language
    #[arg(long = "language", env = "TTS_DEFAULT_LANGUAGE", default_value = "en-us")]
    pub default_language: String,

    /// Default speech speed
    #[arg(long = "speed", env = "TTS_DEFAULT_SPEED", default_value_t = 1.0)]
    pub default_speed: f32,

    /// Default output format
    #[arg(long = "format", env = "TTS_DEFAULT_FORMAT", value_enum, default_value = "wav")]
    pub default_format: AudioFormat,

    /// Forward progress updates to clients
    #[arg(long, env = "TTS_ALLOW_STREAMING", default_value = "true",
          action = ArgAction::Set, value_parser = parse_bool)]
    pub allow_streaming: bool,

    /// Synthesis backend
    #[arg(long, env = "TTS_BACKEND", value_enum, default_value = "kokoro")]
    pub backend: BackendKind,

    /// Device passed to Chatterbox (cuda/cpu)
    #[arg(long, env = "TTS_CHATTERBOX_DEVICE", default_value = "cuda")]
    pub chatterbox_device: String,

    /// Chatterbox synthesis executable
    #[arg(long, env = "TTS_CHATTERBOX_COMMAND", default_value = "chatterbox-tts")]
    pub chatterbox_command: String,

    /// Kokoro ONNX model
    #[arg(long, env = "TTS_MODEL_PATH", default_value = "kokoro-v1.0.onnx")]
    pub model_path: PathBuf,

    /// Kokoro voice archive
    #[arg(long, env = "TTS_VOICES_PATH", default_value = "voices-v1.0.bin")]
    pub voices_path: PathBuf,

    /// Directory receiving generated audio
    #[arg(long = "output-dir", env = "TTS_OUTPUT_DIR", default_value = "output")]
    pub output_directory: PathBuf,

    /// Directory receiving the JSON log file
    #[arg(long = "log-dir", env = "TTS_LOG_DIR", default_value = "logs")]
    pub log_directory: PathBuf,
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(format!("expected a boolean, got '{other}'")),
    }
}

/// Resolved, validated settings. Immutable once the server starts.
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub monitoring_host: String,
    pub monitoring_port: u16,
    pub max_connections: usize,
    pub log_level: LogLevel,
    pub log_format: LogFormat,
    pub default_voice: String,
    pub default_language: String,
    pub default_speed: f32,
    pub default_format: AudioFormat,
    pub allow_streaming: bool,
    pub backend: BackendKind,
    pub chatterbox_device: String,
    pub chatterbox_command: String,
    pub model_path: PathBuf,
    pub voices_path: PathBuf,
    pub output_directory: PathBuf,
    pub log_directory: PathBuf,
}

impl Settings {
    pub fn from_args(args: SettingsArgs) -> Result<Self, ConfigError> {
        let log_level = match (args.log_level, std::env::var("LOG_LEVEL")) {
            (Some(level), _) => level,
            (None, Ok(raw)) => {
                LogLevel::parse(&raw).ok_or(ConfigError::InvalidLogLevel(raw))?
            }
            (None, Err(_)) => LogLevel::default(),
        };

        let settings = Self {
            host: args.host,
            port: args.port,
            monitoring_host: args.monitoring_host,
            monitoring_port: args.monitoring_port,
            max_connections: args.max_connections as usize,
            log_level,
            log_format: args.log_format,
            default_voice: args.default_voice,
            default_language: args.default_language,
            default_speed: args.default_speed,
            default_format: args.default_format,
            allow_streaming: args.allow_streaming,
            backend: args.backend,
            chatterbox_device: args.chatterbox_device,
            chatterbox_command: args.chatterbox_command,
            model_path: args.model_path,
            voices_path: args.voices_path,
            output_directory: args.output_directory,
            log_directory: args.log_directory,
        };

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.default_speed.is_finite() || self.default_speed <= 0.0 {
            return Err(ConfigError::InvalidSpeed(self.default_speed));
        }
        if self.backend == BackendKind::Kokoro
            && !(MIN_SPEED..=MAX_SPEED).contains(&self.default_speed)
        {
            return Err(ConfigError::SpeedOutOfRange {
                value: self.default_speed,
                min: MIN_SPEED,
                max: MAX_SPEED,
            });
        }
        if self.host.trim().is_empty() {
            return Err(ConfigError::Empty { name: "TTS_HOST" });
        }
        if self.default_voice.trim().is_empty() {
            return Err(ConfigError::Empty {
                name: "TTS_DEFAULT_VOICE",
            });
        }
        Ok(())
    }

    /// Create the output and log directories. Failure is logged, not fatal.
    pub fn ensure_directories(&self) {
        for dir in [&self.output_directory, &self.log_directory] {
            if let Err(e) = std::fs::create_dir_all(dir) {
                tracing::warn!(path = %dir.display(), error = %e, "Unable to ensure directory");
            }
        }
    }

    pub fn log_summary(&self) {
        tracing::info!(
            host = %self.host,
            port = self.port,
            monitoring_port = self.monitoring_port,
            max_connections = self.max_connections,
            "TTS configuration"
        );
        tracing::info!(
            voice = %self.default_voice,
            language = %self.default_language,
            speed = self.default_speed,
            format = %self.default_format,
            "TTS defaults"
        );
        tracing::info!(
            model = %self.model_path.display(),
            voices = %self.voices_path.display(),
            output_dir = %self.output_directory.display(),
            log_dir = %self.log_directory.display(),
            "TTS assets"
        );
        tracing::info!(
            backend = %self.backend,
            device = %self.chatterbox_device,
            "TTS backend"
        );
    }

    /// Ordered key/value view used by `config --show`.
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("host", self.host.clone()),
            ("port", self.port.to_string()),
            ("monitoring_host", self.monitoring_host.clone()),
            ("monitoring_port", self.monitoring_port.to_string()),
            ("max_connections", self.max_connections.to_string()),
            ("log_level", self.log_level.to_string()),
            ("log_format", self.log_format.to_string()),
            ("default_voice", self.default_voice.clone()),
            ("default_language", self.default_language.clone()),
            ("default_speed", self.default_speed.to_string()),
            ("default_format", self.default_format.to_string()),
            ("backend", self.backend.to_string()),
            ("chatterbox_device", self.chatterbox_device.clone()),
            ("chatterbox_command", self.chatterbox_command.clone()),
            ("model_path", self.model_path.display().to_string()),
            ("voices_path", self.voices_path.display().to_string()),
            ("output_directory", self.output_directory.display().to_string()),
            ("log_directory", self.log_directory.display().to_string()),
            ("allow_streaming", self.allow_streaming.to_string()),
        ]
    }

    pub fn ws_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn monitoring_addr(&self) -> String {
        format!("{}:{}", self.monitoring_host, self.monitoring_port)
    }
}

/// Render the `config --show` table.
pub fn render_config(settings: &Settings) -> String {
    let banner = "=".repeat(60);
    let mut out = format!("{banner}\nTTS Service Configuration\n{banner}\n");
    for (key, value) in settings.entries() {
        out.push_str(&format!("{key:30}: {value}\n"));
    }
    out.push_str(&banner);
    out
}
