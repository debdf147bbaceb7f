//! Reference-based voice cloning with F5-TTS (MLX port).

use std::path::{Path, PathBuf};

use tracing::info;

use super::process::{find_executable, ToolCommand};
use super::VoiceCloneBackend;
use crate::config_loader::Settings;
use crate::error::{BackendError, Result};
use crate::media::AudioClip;
use crate::protocol::VoiceCloneParams;
use crate::wav;

/// F5-TTS output rate, assumed when a WAV header reports zero.
pub const DEFAULT_SAMPLE_RATE: u32 = 24000;

pub struct F5Backend {
    binary: PathBuf,
    timeout_secs: u64,
}

impl F5Backend {
    pub fn new(binary: PathBuf, timeout_secs: u64) -> Self {
        Self {
            binary,
            timeout_secs,
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let binary = find_executable(&settings.f5_binary)
            .ok_or_else(|| BackendError::unavailable("f5-tts-mlx", "pip install f5-tts-mlx"))?;
        Ok(Self::new(binary, settings.backend_timeout_secs))
    }
}

impl VoiceCloneBackend for F5Backend {
    fn clone_voice(&self, params: &VoiceCloneParams) -> Result<AudioClip> {
        if params.reference_audio.is_empty() {
            return Err(BackendError::InvalidInput(
                "reference_audio is required for voice_clone".to_string(),
            ));
        }
        let reference = Path::new(&params.reference_audio);
        if !reference.is_file() {
            return Err(BackendError::InvalidInput(format!(
                "Reference audio not found: {}",
                params.reference_audio
            )));
        }

        let workdir = tempfile::tempdir()?;
        let output = workdir.path().join("clone.wav");

        info!(reference = %reference.display(), speed = params.speed, "cloning voice");
        ToolCommand::new(&self.binary)
            .timeout_secs(self.timeout_secs)
            .opt("--text", &params.text)
            .opt("--ref-audio", reference)
            .opt("--speed", params.speed.to_string())
            .opt("--output", &output)
            .run()?;

        let bytes = std::fs::read(&output).map_err(|e| {
            BackendError::InvalidOutput(format!("f5-tts wrote no audio: {}", e))
        })?;
        let mut clip = wav::decode(&bytes)?;
        if clip.sample_rate == 0 {
            clip.sample_rate = DEFAULT_SAMPLE_RATE;
        }
        Ok(clip)
    }
}
