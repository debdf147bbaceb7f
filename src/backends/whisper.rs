//! Speech-to-text via the `mlx_whisper` command line.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use serde::Deserialize;
use tracing::info;

use super::process::{find_executable, ToolCommand};
use super::{Segment, Transcription, TranscriptionBackend};
use crate::config_loader::Settings;
use crate::error::{BackendError, Result};
use crate::protocol::TranscribeParams;

lazy_static! {
    static ref MODEL_REPOS: HashMap<&'static str, &'static str> = HashMap::from([
        ("tiny", "mlx-community/whisper-tiny-mlx"),
        ("base", "mlx-community/whisper-base-mlx"),
        ("small", "mlx-community/whisper-small-mlx"),
        ("medium", "mlx-community/whisper-medium-mlx"),
        ("large-v3", "mlx-community/whisper-large-v3-mlx"),
    ]);
}

/// Map a short model name to its Hugging Face repository.
pub fn model_repo(model: &str) -> String {
    MODEL_REPOS
        .get(model)
        .map(|repo| repo.to_string())
        .unwrap_or_else(|| format!("mlx-community/whisper-{}-mlx", model))
}

/// `mlx_whisper --output-format json` document; every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WhisperOutput {
    text: String,
    language: Option<String>,
    segments: Vec<WhisperSegment>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WhisperSegment {
    start: f64,
    end: f64,
    text: String,
}

pub fn parse_output(json: &str) -> Result<Transcription> {
    let output: WhisperOutput = serde_json::from_str(json)?;
    Ok(Transcription {
        text: output.text,
        language: output
            .language
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| "unknown".to_string()),
        segments: output
            .segments
            .into_iter()
            .map(|s| Segment {
                start: s.start,
                end: s.end,
                text: s.text,
            })
            .collect(),
    })
}

pub struct WhisperBackend {
    binary: PathBuf,
    timeout_secs: u64,
}

impl WhisperBackend {
    pub fn new(binary: PathBuf, timeout_secs: u64) -> Self {
        Self {
            binary,
            timeout_secs,
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let binary = find_executable(&settings.whisper_binary)
            .ok_or_else(|| BackendError::unavailable("mlx-whisper", "pip install mlx-whisper"))?;
        Ok(Self::new(binary, settings.backend_timeout_secs))
    }

    /// The tool names its output after the input stem; fall back to any JSON it wrote.
    fn output_file(dir: &Path, audio: &Path) -> Result<PathBuf> {
        if let Some(stem) = audio.file_stem() {
            let expected = dir.join(format!("{}.json", stem.to_string_lossy()));
            if expected.is_file() {
                return Ok(expected);
            }
        }
        std::fs::read_dir(dir)?
            .flatten()
            .map(|e| e.path())
            .find(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
            .ok_or_else(|| BackendError::InvalidOutput("mlx_whisper wrote no transcript".to_string()))
    }
}

impl TranscriptionBackend for WhisperBackend {
    fn transcribe(&self, params: &TranscribeParams) -> Result<Transcription> {
        let audio = Path::new(&params.audio_file);
        if params.audio_file.is_empty() || !audio.is_file() {
            return Err(BackendError::InvalidInput(format!(
                "Audio file not found: {}",
                params.audio_file
            )));
        }

        let repo = model_repo(&params.model);
        let workdir = tempfile::tempdir()?;

        let mut cmd = ToolCommand::new(&self.binary)
            .timeout_secs(self.timeout_secs)
            .arg(audio)
            .opt("--model", &repo)
            .opt("--output-format", "json")
            .opt("--output-dir", workdir.path());
        if let Some(language) = params.language.as_deref().filter(|l| !l.is_empty()) {
            cmd = cmd.opt("--language", language);
        }

        info!(model = %repo, file = %audio.display(), "transcribing");
        cmd.run()?;

        let json = std::fs::read_to_string(Self::output_file(workdir.path(), audio)?)?;
        parse_output(&json)
    }
}
