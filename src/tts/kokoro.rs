use std::path::Path;
use std::process::Command;
use std::sync::Mutex;

use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;

use crate::error::AppError;
use crate::tts::audio;
use crate::tts::process;
use crate::tts::vocab;
use crate::tts::voices::{VoiceStore, STYLE_DIM};
use crate::tts::{AudioFormat, Backend, SynthesisJob, SynthesisOutput};

/// Output sample rate of the Kokoro vocoder.
pub const SAMPLE_RATE: u32 = 24000;

/// Soft limit on characters sent to espeak-ng / the model in one pass.
const CHUNK_CHARS: usize = 300;

/// Accepted speed range.
pub const MIN_SPEED: f32 = 0.5;
pub const MAX_SPEED: f32 = 2.0;

/// Kokoro v1.0 ONNX model driven on the CPU.
///
/// A single session is shared by every connection; the mutex serialises
/// inference so concurrent requests queue behind each other.
pub struct KokoroBackend {
    session: Mutex<Session>,
    voices: VoiceStore,
}

impl KokoroBackend {
    pub fn new(model_path: &Path, voices_path: &Path) -> Result<Self, AppError> {
        if !model_path.exists() {
            return Err(AppError::ModelNotFound(model_path.to_path_buf()));
        }

        let session = Session::builder()
            .map_err(|e| AppError::TtsError(format!("Failed to create session builder: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| AppError::TtsError(format!("Failed to set optimization level: {}", e)))?
            .with_intra_threads(4)
            .map_err(|e| AppError::TtsError(format!("Failed to set threads: {}", e)))?
            .commit_from_file(model_path)
            .map_err(|e| AppError::TtsError(format!("Failed to load model: {}", e)))?;

        let voices = VoiceStore::load(voices_path)?;

        tracing::info!(
            model = %model_path.display(),
            voices = voices.list().len(),
            "Loaded Kokoro model"
        );

        Ok(Self {
            session: Mutex::new(session),
            voices,
        })
    }

    fn infer(&self, tokens: &[i64], style: &[f32; STYLE_DIM], speed: f32) -> Result<Vec<f32>, AppError> {
        // [[0, t1..tN, 0]]
        let mut padded = Vec::with_capacity(tokens.len() + 2);
        padded.push(0);
        padded.extend_from_slice(tokens);
        padded.push(0);

        let tokens_value = Value::from_array((vec![1, padded.len()], padded))
            .map_err(|e| AppError::TtsError(format!("Failed to create tokens tensor: {}", e)))?;

        let style_value = Value::from_array((vec![1, STYLE_DIM], style.to_vec()))
            .map_err(|e| AppError::TtsError(format!("Failed to create style tensor: {}", e)))?;

        let speed_value = Value::from_array((vec![1usize], vec![speed]))
            .map_err(|e| AppError::TtsError(format!("Failed to create speed tensor: {}", e)))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| AppError::TtsError("Kokoro session lock poisoned".to_string()))?;
        let outputs = session
            .run(ort::inputs![
                "tokens" => tokens_value,
                "style" => style_value,
                "speed" => speed_value,
            ])
            .map_err(|e| AppError::TtsError(format!("Inference failed: {}", e)))?;

        let output = outputs
            .get("audio")
            .or_else(|| outputs.get("output"))
            .ok_or_else(|| AppError::TtsError("Missing output tensor".to_string()))?;

        let output_view = output
            .try_extract_tensor::<f32>()
            .map_err(|e| AppError::TtsError(format!("Failed to extract output tensor: {}", e)))?;

        Ok(output_view.1.to_vec())
    }
}

impl Backend for KokoroBackend {
    fn name(&self) -> &'static str {
        "kokoro"
    }

    fn supports(&self, _format: AudioFormat) -> bool {
        true
    }

    fn synthesize(
        &self,
        job: &SynthesisJob,
        progress: &mut dyn FnMut(f32),
    ) -> Result<SynthesisOutput, AppError> {
        if !(MIN_SPEED..=MAX_SPEED).contains(&job.speed) {
            return Err(AppError::InvalidSpeed(job.speed));
        }
        if !self.voices.contains(&job.voice) {
            return Err(AppError::VoiceNotFound(job.voice.clone()));
        }

        let chunks = split_sentences(&job.text, CHUNK_CHARS);
        let total = chunks.len().max(1);
        let mut samples = Vec::new();

        for (i, chunk) in chunks.iter().enumerate() {
            let phonemes = phonemize(chunk, &job.lang)?;
            let tokens = vocab::tokenize(&phonemes);

            if tokens.is_empty() {
                tracing::debug!(chunk = %chunk, "No phoneme tokens produced");
            } else {
                // One style row for the whole chunk so batches share prosody
                let style = self.voices.style(&job.voice, tokens.len())?;
                for batch in vocab::batches(&tokens) {
                    samples.extend(self.infer(batch, &style, job.speed)?);
                }
            }

            progress((i + 1) as f32 / total as f32);
        }

        let duration_secs = audio::write_audio(&job.output_file, &samples, SAMPLE_RATE, job.format)?;

        Ok(SynthesisOutput {
            file: job.output_file.clone(),
            format: job.format,
            duration_secs,
        })
    }
}

/// Convert text to IPA phonemes using espeak-ng
pub fn phonemize(text: &str, lang: &str) -> Result<String, AppError> {
    if text.trim().is_empty() {
        return Ok(String::new());
    }

    let output = process::run_with_stdin(
        Command::new("espeak-ng").args(["--ipa", "-q", "--stdin", "-v", lang]),
        text.as_bytes(),
    )
    .map_err(|e| {
        AppError::TtsError(format!(
            "Failed to run espeak-ng (is it installed?): {}",
            e
        ))
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AppError::TtsError(format!("espeak-ng failed: {}", stderr.trim())));
    }

    // espeak-ng emits one line per clause
    let phonemes = String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    Ok(phonemes)
}

/// Split text on sentence boundaries and pack sentences into chunks of at most
/// `max_chars` characters. A single sentence longer than `max_chars` is broken
/// on whitespace.
pub fn split_sentences(text: &str, max_chars: usize) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();

    for ch in text.chars() {
        if ch == '\n' || ch == '\r' {
            push_trimmed(&mut sentences, &mut current);
            continue;
        }
        current.push(ch);
        if matches!(ch, '.' | '!' | '?' | ';' | ':' | '。' | '！' | '？') {
            push_trimmed(&mut sentences, &mut current);
        }
    }
    push_trimmed(&mut sentences, &mut current);

    let mut chunks: Vec<String> = Vec::new();
    let mut chunk = String::new();

    for sentence in sentences {
        for piece in break_long(&sentence, max_chars) {
            let needed = chunk.chars().count() + piece.chars().count() + 1;
            if !chunk.is_empty() && needed > max_chars {
                chunks.push(std::mem::take(&mut chunk));
            }
            if !chunk.is_empty() {
                chunk.push(' ');
            }
            chunk.push_str(&piece);
        }
    }
    if !chunk.is_empty() {
        chunks.push(chunk);
    }

    chunks
}

fn push_trimmed(out: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
    current.clear();
}

fn break_long(sentence: &str, max_chars: usize) -> Vec<String> {
    if sentence.chars().count() <= max_chars {
        return vec![sentence.to_string()];
    }

    let mut pieces = Vec::new();
    let mut piece = String::new();
    for word in sentence.split_whitespace() {
        if !piece.is_empty() && piece.chars().count() + word.chars().count() + 1 > max_chars {
            pieces.push(std::mem::take(&mut piece));
        }
        if !piece.is_empty() {
            piece.push(' ');
        }
        piece.push_str(word);
    }
    if !piece.is_empty() {
        pieces.push(piece);
    }
    pieces
}
