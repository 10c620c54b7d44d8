use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::AppError;
use crate::tts::audio;
use crate::tts::process;
use crate::tts::{AudioFormat, Backend, SynthesisJob, SynthesisOutput};

/// Chatterbox multilingual model, run out of process.
///
/// The model is PyTorch-based, so synthesis is delegated to an external
/// executable invoked as
/// `<command> --device <device> --language <lang> --output <file>` with the
/// text on stdin. The executable is expected to write a WAV file and exit 0.
pub struct ChatterboxBackend {
    command: PathBuf,
    device: String,
}

impl ChatterboxBackend {
    pub fn new(command: &str, device: &str) -> Result<Self, AppError> {
        let command = resolve_executable(command)
            .ok_or_else(|| AppError::ModelNotFound(PathBuf::from(command)))?;

        tracing::info!(
            command = %command.display(),
            device = %device,
            "Using Chatterbox executable"
        );

        Ok(Self {
            command,
            device: device.to_string(),
        })
    }
}

impl Backend for ChatterboxBackend {
    fn name(&self) -> &'static str {
        "chatterbox"
    }

    fn supports(&self, format: AudioFormat) -> bool {
        format == AudioFormat::Wav
    }

    fn synthesize(
        &self,
        job: &SynthesisJob,
        _progress: &mut dyn FnMut(f32),
    ) -> Result<SynthesisOutput, AppError> {
        if !self.supports(job.format) {
            return Err(AppError::FormatNotSupported {
                backend: self.name(),
                requested: job.format,
            });
        }

        let output = process::run_with_stdin(
            Command::new(&self.command)
                .arg("--device")
                .arg(&self.device)
                .arg("--language")
                .arg(&job.lang)
                .arg("--output")
                .arg(&job.output_file),
            job.text.as_bytes(),
        )
        .map_err(|e| AppError::TtsError(format!("Failed to run Chatterbox: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::TtsError(format!(
                "Chatterbox failed ({}): {}",
                output.status,
                stderr.trim()
            )));
        }

        if !job.output_file.exists() {
            return Err(AppError::TtsError(format!(
                "Chatterbox did not produce {}",
                job.output_file.display()
            )));
        }

        let duration_secs = match audio::wav_duration(&job.output_file) {
            Ok(d) => d,
            Err(e) => {
                tracing::debug!(error = %e, "Unable to measure Chatterbox output");
                0.0
            }
        };

        Ok(SynthesisOutput {
            file: job.output_file.clone(),
            format: job.format,
            duration_secs,
        })
    }
}

/// Locate `command` either as a path or on `PATH`.
fn resolve_executable(command: &str) -> Option<PathBuf> {
    let direct = Path::new(command);
    if direct.components().count() > 1 || direct.is_absolute() {
        return direct.is_file().then(|| direct.to_path_buf());
    }

    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(command))
        .find(|candidate| candidate.is_file())
}
