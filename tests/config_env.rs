use std::sync::Mutex;

use clap::Parser;

use fasttalk_tts::config::{Cli, Settings};
use fasttalk_tts::error::ConfigError;
use fasttalk_tts::logging::LogLevel;
use fasttalk_tts::tts::BackendKind;

// The process environment is global; tests touching it run one at a time.
static ENV_LOCK: Mutex<()> = Mutex::new(());

const VARS: &[&str] = &[
    "TTS_PORT",
    "TTS_BACKEND",
    "TTS_DEFAULT_VOICE",
    "TTS_ALLOW_STREAMING",
    "TTS_LOG_LEVEL",
    "LOG_LEVEL",
    "TTS_LOG_DIR",
];

fn with_env<T>(vars: &[(&str, &str)], f: impl FnOnce() -> T) -> T {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    for name in VARS {
        std::env::remove_var(name);
    }
    for (name, value) in vars {
        std::env::set_var(name, value);
    }
    let result = f();
    for name in VARS {
        std::env::remove_var(name);
    }
    result
}

fn resolve(args: &[&str]) -> Result<Settings, ConfigError> {
    let mut argv = vec!["fasttalk-tts", "websocket"];
    argv.extend_from_slice(args);
    let cli = Cli::try_parse_from(argv).unwrap();
    Settings::from_args(cli.settings)
}

#[test]
fn test_env_overrides_defaults() {
    let settings = with_env(
        &[
            ("TTS_PORT", "8100"),
            ("TTS_BACKEND", "chatterbox"),
            ("TTS_DEFAULT_VOICE", "ff_siwis"),
            ("TTS_LOG_DIR", "/tmp/tts-logs"),
        ],
        || resolve(&[]).unwrap(),
    );
    assert_eq!(settings.port, 8100);
    assert_eq!(settings.backend, BackendKind::Chatterbox);
    assert_eq!(settings.default_voice, "ff_siwis");
    assert_eq!(settings.log_directory.to_str(), Some("/tmp/tts-logs"));
}

#[test]
fn test_flag_overrides_env() {
    let settings = with_env(&[("TTS_PORT", "8100")], || {
        resolve(&["--port", "8200"]).unwrap()
    });
    assert_eq!(settings.port, 8200);
}

#[test]
fn test_allow_streaming_from_env() {
    let settings = with_env(&[("TTS_ALLOW_STREAMING", "no")], || resolve(&[]).unwrap());
    assert!(!settings.allow_streaming);
}

#[test]
fn test_invalid_env_value_fails_parse() {
    with_env(&[("TTS_PORT", "80")], || {
        assert!(Cli::try_parse_from(["fasttalk-tts", "websocket"]).is_err());
    });
}

#[test]
fn test_log_level_fallback_chain() {
    let level = with_env(&[], || resolve(&[]).unwrap().log_level);
    assert_eq!(level, LogLevel::Info);

    let level = with_env(&[("LOG_LEVEL", "WARNING")], || resolve(&[]).unwrap().log_level);
    assert_eq!(level, LogLevel::Warn);

    let level = with_env(&[("LOG_LEVEL", "WARNING"), ("TTS_LOG_LEVEL", "CRITICAL")], || {
        resolve(&[]).unwrap().log_level
    });
    assert_eq!(level, LogLevel::Error);

    let level = with_env(&[("TTS_LOG_LEVEL", "error")], || {
        resolve(&["--log-level", "debug"]).unwrap().log_level
    });
    assert_eq!(level, LogLevel::Debug);
}

#[test]
fn test_unknown_log_level_fallback_is_rejected() {
    let result = with_env(&[("LOG_LEVEL", "loud")], || resolve(&[]));
    assert!(matches!(result, Err(ConfigError::InvalidLogLevel(v)) if v == "loud"));
}
