//! Audio clip compilation
//!
//! Sources are decoded with rodio (feature `audio`), folded to one channel
//! and stored as 16-bit PCM.

use crate::error::{CompileError, CompileResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use void_asset::atomic_write_bincode;

/// Decoded PCM samples
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SoundData {
    pub sample_rate: u32,
    pub channels: u16,
    /// Interleaved when `channels > 1`
    pub samples: Vec<i16>,
}

impl SoundData {
    /// Length in seconds
    pub fn duration(&self) -> f32 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / (self.sample_rate as f32 * self.channels as f32)
    }

    /// Average every frame into a single channel
    pub fn convert_to_mono(&mut self) {
        if self.channels <= 1 {
            return;
        }
        let channels = self.channels as usize;
        self.samples = self
            .samples
            .chunks(channels)
            .map(|frame| {
                let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                (sum / frame.len() as i32) as i16
            })
            .collect();
        self.channels = 1;
    }
}

/// Decode an audio file
#[cfg(feature = "audio")]
pub fn decode_sound(path: &Path) -> CompileResult<SoundData> {
    use rodio::{Decoder, Source};
    use std::fs::File;
    use std::io::BufReader;

    let file = File::open(path)?;
    let decoder = Decoder::new(BufReader::new(file))
        .map_err(|e| CompileError::Import(format!("Failed to decode {}: {}", path.display(), e)))?;

    let channels = decoder.channels();
    let sample_rate = decoder.sample_rate();
    let samples: Vec<i16> = decoder.collect();
    Ok(SoundData {
        sample_rate,
        channels,
        samples,
    })
}

/// Decode an audio file (unavailable without the `audio` feature)
#[cfg(not(feature = "audio"))]
pub fn decode_sound(path: &Path) -> CompileResult<SoundData> {
    Err(CompileError::Unsupported(format!(
        "decoding {} needs the `audio` feature",
        path.display()
    )))
}

/// Decode `source`, fold it to mono and write the clip
pub fn compile_audio_clip(source: &Path, output: &Path) -> CompileResult<()> {
    let mut clip = decode_sound(source)?;
    clip.convert_to_mono();
    log::trace!(
        "Decoded {}: {:.2}s at {} Hz",
        source.display(),
        clip.duration(),
        clip.sample_rate
    );
    atomic_write_bincode(output, &clip)?;
    Ok(())
}
