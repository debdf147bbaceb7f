//! Base64 helpers and the audio payload shared by every audio backend.

use base64::Engine;
use serde::Serialize;

use crate::error::Result;
use crate::wav;

pub fn encode_base64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Decode base64, tolerating a `data:<mime>;base64,` prefix and embedded whitespace.
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    let payload = if data.starts_with("data:") {
        data.split_once(',').map(|(_, b64)| b64).unwrap_or(data)
    } else {
        data
    };

    let normalized: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    Ok(base64::engine::general_purpose::STANDARD.decode(normalized.as_bytes())?)
}

/// Mono `f32` audio as produced by a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioClip {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Length in seconds; zero when the sample rate is unknown.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn to_wav(&self) -> Vec<u8> {
        wav::encode(&self.samples, self.sample_rate)
    }

    pub fn to_base64_wav(&self) -> String {
        encode_base64(&self.to_wav())
    }

    pub fn into_payload(self) -> AudioPayload {
        AudioPayload {
            audio: self.to_base64_wav(),
            sample_rate: self.sample_rate,
            duration: self.duration(),
        }
    }
}

/// Wire shape of every audio-producing command.
#[derive(Debug, Clone, Serialize)]
pub struct AudioPayload {
    pub audio: String,
    pub sample_rate: u32,
    pub duration: f64,
}
