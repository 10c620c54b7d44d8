pub mod audio;
pub mod chatterbox;
pub mod kokoro;
pub mod process;
pub mod vocab;
pub mod voices;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use clap::ValueEnum;
use serde::Serialize;

use crate::config::Settings;
use crate::error::AppError;

pub use chatterbox::ChatterboxBackend;
pub use kokoro::KokoroBackend;

#[derive(ValueEnum, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Wav,
    Mp3,
}

impl AudioFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Mp3 => "mp3",
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for AudioFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "wav" => Ok(AudioFormat::Wav),
            "mp3" => Ok(AudioFormat::Mp3),
            other => Err(AppError::UnsupportedFormat(other.to_string())),
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Kokoro ONNX model, CPU friendly
    Kokoro,
    /// Chatterbox multilingual model, GPU preferred
    Chatterbox,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Kokoro => f.write_str("kokoro"),
            BackendKind::Chatterbox => f.write_str("chatterbox"),
        }
    }
}

/// A fully resolved synthesis request. Defaults have already been applied.
#[derive(Debug, Clone)]
pub struct SynthesisJob {
    pub text: String,
    pub lang: String,
    pub voice: String,
    pub speed: f32,
    pub format: AudioFormat,
    pub output_file: PathBuf,
}

#[derive(Debug, Clone)]
pub struct SynthesisOutput {
    pub file: PathBuf,
    pub format: AudioFormat,
    /// Seconds of audio written, 0.0 when unknown.
    pub duration_secs: f64,
}

/// A speech synthesis backend.
///
/// `synthesize` blocks the calling thread; callers on the async runtime must
/// run it through `spawn_blocking`. Progress is reported as a fraction in
/// `0.0..=1.0`.
pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str;

    fn supports(&self, format: AudioFormat) -> bool;

    fn synthesize(
        &self,
        job: &SynthesisJob,
        progress: &mut dyn FnMut(f32),
    ) -> Result<SynthesisOutput, AppError>;
}

/// Construct the backend selected in `settings`.
pub fn build_backend(settings: &Settings) -> Result<Arc<dyn Backend>, AppError> {
    let backend: Arc<dyn Backend> = match settings.backend {
        BackendKind::Kokoro => Arc::new(KokoroBackend::new(
            &settings.model_path,
            &settings.voices_path,
        )?),
        BackendKind::Chatterbox => Arc::new(ChatterboxBackend::new(
            &settings.chatterbox_command,
            &settings.chatterbox_device,
        )?),
    };

    tracing::info!(backend = backend.name(), "Synthesis backend ready");
    Ok(backend)
}
