use std::path::Path;
use std::process::Command;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::error::AppError;
use crate::tts::AudioFormat;

/// Write mono f32 samples in `[-1.0, 1.0]` as a 16-bit PCM WAV file.
pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<(), AppError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)
        .map_err(|e| AppError::AudioError(format!("Failed to create WAV writer: {}", e)))?;

    for sample in samples {
        let scaled = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
        writer
            .write_sample(scaled)
            .map_err(|e| AppError::AudioError(format!("Failed to write sample: {}", e)))?;
    }

    writer
        .finalize()
        .map_err(|e| AppError::AudioError(format!("Failed to finalize WAV: {}", e)))?;

    Ok(())
}

/// Transcode a WAV file to MP3 with ffmpeg.
pub fn transcode_to_mp3(wav: &Path, mp3: &Path) -> Result<(), AppError> {
    let output = Command::new("ffmpeg")
        .args(["-y", "-loglevel", "error", "-i"])
        .arg(wav)
        .args(["-codec:a", "libmp3lame", "-qscale:a", "2"])
        .arg(mp3)
        .output()
        .map_err(|e| {
            AppError::AudioError(format!("Failed to run ffmpeg (is it installed?): {}", e))
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AppError::AudioError(format!("ffmpeg failed: {}", stderr.trim())));
    }

    Ok(())
}

/// Encode samples into `path` using `format` and return the audio duration.
pub fn write_audio(
    path: &Path,
    samples: &[f32],
    sample_rate: u32,
    format: AudioFormat,
) -> Result<f64, AppError> {
    match format {
        AudioFormat::Wav => write_wav(path, samples, sample_rate)?,
        AudioFormat::Mp3 => {
            let tmp = path.with_extension("mp3.wav");
            write_wav(&tmp, samples, sample_rate)?;
            let result = transcode_to_mp3(&tmp, path);
            if let Err(e) = std::fs::remove_file(&tmp) {
                tracing::debug!(path = %tmp.display(), error = %e, "Failed to remove temporary WAV");
            }
            result?;
        }
    }

    Ok(samples.len() as f64 / sample_rate as f64)
}

/// Duration of a WAV file in seconds.
pub fn wav_duration(path: &Path) -> Result<f64, AppError> {
    let reader = WavReader::open(path)
        .map_err(|e| AppError::AudioError(format!("Failed to read WAV: {}", e)))?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return Ok(0.0);
    }
    Ok(reader.duration() as f64 / spec.sample_rate as f64)
}
