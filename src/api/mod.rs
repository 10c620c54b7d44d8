pub mod handlers;
pub mod routes;

use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Settings;
use crate::error::AppError;
use crate::tts::{AudioFormat, SynthesisJob};

/// Longest text accepted in a single request.
pub const MAX_TEXT_CHARS: usize = 10_000;

/// One synthesis request as sent by a client. Every field except `text` falls
/// back to the configured default.
#[derive(Debug, Default, Deserialize)]
pub struct SynthesisRequest {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub lang: Option<String>,
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default)]
    pub speed: Option<Speed>,
    #[serde(default)]
    pub format: Option<String>,
}

/// Clients send speed as a number or a numeric string; anything else is
/// replaced by the default.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Speed {
    Number(f64),
    Text(String),
    Other(serde_json::Value),
}

impl Speed {
    fn value(&self) -> Option<f32> {
        let v = match self {
            Speed::Number(n) => *n as f32,
            Speed::Text(s) => s.trim().parse::<f32>().ok()?,
            Speed::Other(_) => return None,
        };
        v.is_finite().then_some(v)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ServerMessage {
    Progress { progress: f32 },
    Ok { file: String, format: AudioFormat },
    Error { message: String },
}

impl From<&AppError> for ServerMessage {
    fn from(err: &AppError) -> Self {
        ServerMessage::Error {
            message: err.to_string(),
        }
    }
}

impl SynthesisRequest {
    /// Parse a text frame. Anything that is not a JSON object is rejected.
    pub fn parse(frame: &str) -> Result<Self, AppError> {
        let value: serde_json::Value =
            serde_json::from_str(frame).map_err(|_| AppError::InvalidJson)?;
        if !value.is_object() {
            return Err(AppError::InvalidJson);
        }
        serde_json::from_value(value).map_err(|_| AppError::InvalidJson)
    }

    /// Apply defaults and validate, producing a job that writes into
    /// `output_dir` under a fresh identifier.
    pub fn resolve(self, settings: &Settings, output_dir: &Path) -> Result<SynthesisJob, AppError> {
        let text = self
            .text
            .filter(|t| !t.trim().is_empty())
            .ok_or(AppError::MissingText)?;

        if text.chars().count() > MAX_TEXT_CHARS {
            return Err(AppError::TextTooLong(MAX_TEXT_CHARS));
        }

        let lang = non_empty(self.lang).unwrap_or_else(|| settings.default_language.clone());
        let voice = non_empty(self.voice).unwrap_or_else(|| settings.default_voice.clone());
        let speed = self
            .speed
            .and_then(|s| s.value())
            .unwrap_or(settings.default_speed);
        let format = match non_empty(self.format) {
            Some(f) => f.parse::<AudioFormat>()?,
            None => settings.default_format,
        };

        let output_file = output_dir.join(format!("{}.{}", Uuid::new_v4(), format.extension()));

        Ok(SynthesisJob {
            text,
            lang,
            voice,
            speed,
            format,
            output_file,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
