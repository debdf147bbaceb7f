//! Minimal RIFF/WAVE codec.
//!
//! Encoding always produces 16-bit mono PCM behind a 44-byte header.
//! Decoding accepts anything `hound` can read and downmixes to mono `f32`.

use std::io::Cursor;

use crate::error::Result;
use crate::media::AudioClip;

pub const HEADER_LEN: usize = 44;

/// Encode `samples` as 16-bit mono PCM at `sample_rate`.
///
/// Samples whose peak exceeds 1.0 are scaled down by that peak first;
/// in-range input is left untouched.
pub fn encode(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    let peak = samples.iter().fold(0.0f32, |p, &s| p.max(s.abs()));
    let scale = if peak > 1.0 { peak } else { 1.0 };

    let data_size = (samples.len() * 2) as u32;
    let mut out = Vec::with_capacity(HEADER_LEN + samples.len() * 2);

    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_size).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&1u16.to_le_bytes()); // mono
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate.wrapping_mul(2)).to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_size.to_le_bytes());

    for &sample in samples {
        let sample = if sample.is_finite() { sample / scale } else { 0.0 };
        // `as` saturates and truncates toward zero
        let value = (sample * 32767.0) as i16;
        out.extend_from_slice(&value.to_le_bytes());
    }

    out
}

/// Decode WAV bytes into mono samples in [-1, 1].
pub fn decode(bytes: &[u8]) -> Result<AudioClip> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let bits = spec.bits_per_sample.max(1) as u32;
            let max_val = ((1i64 << (bits - 1)) - 1).max(1) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| (v as f32 / max_val).clamp(-1.0, 1.0)))
                .collect::<std::result::Result<_, _>>()?
        }
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()?,
    };

    let samples = if channels > 1 {
        samples
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    } else {
        samples
    };

    Ok(AudioClip::new(samples, spec.sample_rate))
}
