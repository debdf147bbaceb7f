//! Text-to-music with MusicGen.
//!
//! The MLX generator is preferred; a transformers-based generator is the
//! fallback when only that one is installed.

use std::path::{Path, PathBuf};

use tracing::info;

use super::process::{find_executable, ToolCommand};
use super::MusicBackend;
use crate::config_loader::Settings;
use crate::error::{BackendError, Result};
use crate::media::AudioClip;
use crate::protocol::MusicParams;
use crate::wav;

pub const DEFAULT_SAMPLE_RATE: u32 = 32000;

/// MusicGen emits roughly fifty audio tokens per second.
const TOKENS_PER_SECOND: f64 = 50.0;

pub fn model_id(model_size: &str) -> String {
    format!("facebook/musicgen-{}", model_size)
}

pub fn token_budget(duration: f64) -> u64 {
    if duration.is_finite() && duration > 0.0 {
        (duration * TOKENS_PER_SECOND) as u64
    } else {
        0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MusicTool {
    Mlx { binary: PathBuf },
    Transformers { binary: PathBuf },
}

impl MusicTool {
    /// Pick the first installed generator.
    pub fn resolve(settings: &Settings) -> Result<Self> {
        if let Some(binary) = find_executable(&settings.musicgen_binary) {
            return Ok(Self::Mlx { binary });
        }
        if let Some(binary) = find_executable(&settings.musicgen_fallback_binary) {
            return Ok(Self::Transformers { binary });
        }
        Err(BackendError::no_toolchain(
            "music generator",
            "mlx-audio or transformers",
            "pip install mlx-audio\n  # or: pip install transformers torch",
        ))
    }

    fn binary(&self) -> &Path {
        match self {
            Self::Mlx { binary } | Self::Transformers { binary } => binary,
        }
    }
}

pub struct MusicGenBackend {
    tool: MusicTool,
    timeout_secs: u64,
}

impl MusicGenBackend {
    pub fn new(tool: MusicTool, timeout_secs: u64) -> Self {
        Self { tool, timeout_secs }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let tool = MusicTool::resolve(settings)?;
        info!(tool = ?tool, "music backend ready");
        Ok(Self::new(tool, settings.backend_timeout_secs))
    }
}

impl MusicBackend for MusicGenBackend {
    fn generate(&self, params: &MusicParams) -> Result<AudioClip> {
        if !(params.duration.is_finite() && params.duration > 0.0) {
            return Err(BackendError::InvalidInput(format!(
                "duration must be positive, got {}",
                params.duration
            )));
        }
        let tokens = token_budget(params.duration);
        if tokens == 0 {
            return Err(BackendError::InvalidInput(format!(
                "duration too short: {}s is less than one audio token",
                params.duration
            )));
        }

        let model = model_id(&params.model_size);
        let workdir = tempfile::tempdir()?;
        let output = workdir.path().join("music.wav");

        let cmd = ToolCommand::new(self.tool.binary())
            .timeout_secs(self.timeout_secs)
            .opt("--text", &params.prompt)
            .opt("--model", &model);
        let cmd = match self.tool {
            MusicTool::Mlx { .. } => cmd
                .opt("--duration", params.duration.to_string())
                .opt("--max-tokens", tokens.to_string()),
            MusicTool::Transformers { .. } => cmd.opt("--max-new-tokens", tokens.to_string()),
        };

        info!(model = %model, duration = params.duration, "generating music");
        cmd.opt("--output", &output).run()?;

        let bytes = std::fs::read(&output)
            .map_err(|e| BackendError::InvalidOutput(format!("MusicGen wrote no audio: {}", e)))?;
        let mut clip = wav::decode(&bytes)?;
        if clip.sample_rate == 0 {
            clip.sample_rate = DEFAULT_SAMPLE_RATE;
        }
        Ok(clip)
    }
}
