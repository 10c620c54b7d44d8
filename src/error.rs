use std::path::PathBuf;

use crate::tts::AudioFormat;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Invalid JSON payload")]
    InvalidJson,

    #[error("No text provided")]
    MissingText,

    #[error("Text too long (max {0} chars)")]
    TextTooLong(usize),

    #[error("Unsupported format '{0}'")]
    UnsupportedFormat(String),

    #[error("{backend} backend does not support {requested} output")]
    FormatNotSupported {
        backend: &'static str,
        requested: AudioFormat,
    },

    #[error("Voice '{0}' not found")]
    VoiceNotFound(String),

    #[error("Speed should be between 0.5 and 2.0, got {0}")]
    InvalidSpeed(f32),

    #[error("Model file not found: {0}")]
    ModelNotFound(PathBuf),

    #[error("TTS generation failed: {0}")]
    TtsError(String),

    #[error("Audio encoding failed: {0}")]
    AudioError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Coarse grouping of failures reported by the monitoring endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Connection,
    Validation,
    Processing,
    Resource,
    System,
}

impl AppError {
    /// Stable identifier used in logs.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidJson => "INVALID_JSON",
            AppError::MissingText => "MISSING_TEXT",
            AppError::TextTooLong(_) => "TEXT_TOO_LONG",
            AppError::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            AppError::FormatNotSupported { .. } => "FORMAT_NOT_SUPPORTED",
            AppError::VoiceNotFound(_) => "VOICE_NOT_FOUND",
            AppError::InvalidSpeed(_) => "INVALID_SPEED",
            AppError::ModelNotFound(_) => "MODEL_NOT_FOUND",
            AppError::TtsError(_) => "TTS_ERROR",
            AppError::AudioError(_) => "AUDIO_ERROR",
            AppError::IoError(_) => "IO_ERROR",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            AppError::InvalidJson
            | AppError::MissingText
            | AppError::TextTooLong(_)
            | AppError::UnsupportedFormat(_)
            | AppError::FormatNotSupported { .. }
            | AppError::VoiceNotFound(_)
            | AppError::InvalidSpeed(_) => ErrorCategory::Validation,
            AppError::TtsError(_) | AppError::AudioError(_) => ErrorCategory::Processing,
            AppError::ModelNotFound(_) => ErrorCategory::Resource,
            AppError::IoError(_) => ErrorCategory::System,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("TTS_DEFAULT_SPEED must be a positive number. Got {0}.")]
    InvalidSpeed(f32),

    #[error("TTS_DEFAULT_SPEED must be between {min} and {max} for the kokoro backend. Got {value}.")]
    SpeedOutOfRange { value: f32, min: f32, max: f32 },

    #[error("Unknown log level '{0}'")]
    InvalidLogLevel(String),

    #[error("{name} must not be empty")]
    Empty { name: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_messages_match_wire_text() {
        assert_eq!(AppError::InvalidJson.to_string(), "Invalid JSON payload");
        assert_eq!(AppError::MissingText.to_string(), "No text provided");
        assert_eq!(
            AppError::UnsupportedFormat("ogg".into()).to_string(),
            "Unsupported format 'ogg'"
        );
        assert_eq!(
            AppError::TextTooLong(10000).to_string(),
            "Text too long (max 10000 chars)"
        );
    }

    #[test]
    fn test_format_not_supported_message() {
        let err = AppError::FormatNotSupported {
            backend: "chatterbox",
            requested: AudioFormat::Mp3,
        };
        assert_eq!(err.to_string(), "chatterbox backend does not support mp3 output");
        assert_eq!(err.category(), ErrorCategory::Validation);
    }

    #[test]
    fn test_backend_errors_are_processing_errors() {
        let err = AppError::TtsError("boom".into());
        assert_eq!(err.code(), "TTS_ERROR");
        assert_eq!(err.category(), ErrorCategory::Processing);

        let err = AppError::from(std::io::Error::other("disk full"));
        assert_eq!(err.category(), ErrorCategory::System);
    }
}
