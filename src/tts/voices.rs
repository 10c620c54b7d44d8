use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use crate::error::AppError;

/// Width of a Kokoro style vector.
pub const STYLE_DIM: usize = 256;

/// Style vectors for every voice in a Kokoro `voices-*.bin` archive.
///
/// The archive is an npz (zip of `.npy` arrays), one `[N, 1, 256]` float32
/// array per voice. Row `i` is the style to use for an utterance of `i`
/// phoneme tokens.
pub struct VoiceStore {
    voices: HashMap<String, Vec<[f32; STYLE_DIM]>>,
}

impl VoiceStore {
    pub fn load(path: &Path) -> Result<Self, AppError> {
        if !path.exists() {
            return Err(AppError::ModelNotFound(path.to_path_buf()));
        }
        Self::from_reader(File::open(path)?)
    }

    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self, AppError> {
        let mut archive = zip::ZipArchive::new(reader)
            .map_err(|e| AppError::TtsError(format!("Failed to open voice archive: {}", e)))?;

        let mut voices = HashMap::new();
        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .map_err(|e| AppError::TtsError(format!("Failed to read voice entry {}: {}", i, e)))?;

            let name = entry.name().to_string();
            if name.ends_with('/') {
                continue;
            }
            let voice_id = name.trim_end_matches(".npy").to_string();

            let mut data = Vec::new();
            entry.read_to_end(&mut data)?;
            voices.insert(voice_id, parse_npy(&data, &name)?);
        }

        tracing::info!(count = voices.len(), "Loaded Kokoro voices");
        Ok(Self { voices })
    }

    /// Style vector for `voice` at `token_count`, clamped to the last row.
    pub fn style(&self, voice: &str, token_count: usize) -> Result<[f32; STYLE_DIM], AppError> {
        let rows = self
            .voices
            .get(voice)
            .filter(|rows| !rows.is_empty())
            .ok_or_else(|| AppError::VoiceNotFound(voice.to_string()))?;
        Ok(rows[token_count.min(rows.len() - 1)])
    }

    pub fn contains(&self, voice: &str) -> bool {
        self.voices.contains_key(voice)
    }

    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.voices.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Parse a little-endian float32 `.npy` payload into style rows.
fn parse_npy(data: &[u8], name: &str) -> Result<Vec<[f32; STYLE_DIM]>, AppError> {
    if data.len() < 10 || &data[0..6] != b"\x93NUMPY" {
        return Err(AppError::TtsError(format!("{}: not a numpy array", name)));
    }

    // v1 headers use a u16 length at [8..10], v2+ a u32 at [8..12]
    let (header_len, prefix) = match data[6] {
        1 => (u16::from_le_bytes([data[8], data[9]]) as usize, 10),
        _ if data.len() >= 12 => (
            u32::from_le_bytes([data[8], data[9], data[10], data[11]]) as usize,
            12,
        ),
        _ => return Err(AppError::TtsError(format!("{}: truncated header", name))),
    };

    let header_end = prefix + header_len;
    if data.len() < header_end {
        return Err(AppError::TtsError(format!("{}: truncated header", name)));
    }

    let header = String::from_utf8_lossy(&data[prefix..header_end]);
    if !header.contains("<f4") {
        return Err(AppError::TtsError(format!(
            "{}: expected little-endian float32 data",
            name
        )));
    }

    let body = &data[header_end..];
    if body.len() % (4 * STYLE_DIM) != 0 {
        return Err(AppError::TtsError(format!(
            "{}: {} bytes is not a whole number of style vectors",
            name,
            body.len()
        )));
    }

    let rows = body
        .chunks_exact(4 * STYLE_DIM)
        .map(|row| {
            let mut style = [0f32; STYLE_DIM];
            for (dst, bytes) in style.iter_mut().zip(row.chunks_exact(4)) {
                *dst = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            }
            style
        })
        .collect();

    Ok(rows)
}
