use super::process::{find_executable, ToolCommand};
use super::{SpeechEngine, Voice};
use crate::error::{BackendError, Result};
use crate::media::AudioClip;
use crate::wav;
use serde_json::Value;
use std::path::{Path, PathBuf};

pub struct PiperEngine {
    binary: String,
    models_dir: PathBuf,
    default_voice: String,
    timeout_secs: u64,
}

impl PiperEngine {
    pub fn new(binary: &str, models_dir: PathBuf, default_voice: &str, timeout_secs: u64) -> Self {
        Self {
            binary: binary.to_string(),
            models_dir,
            default_voice: default_voice.to_string(),
            timeout_secs,
        }
    }

    fn find_model(&self, voice_id: &str) -> Option<PathBuf> {
        let onnx = self.models_dir.join(format!("{}.onnx", voice_id));
        onnx.exists().then_some(onnx)
    }

    fn parse_voice_metadata(&self, config_path: &Path, voice_id: &str) -> Voice {
        let mut voice = Voice {
            id: voice_id.to_string(),
            name: voice_id.replace('_', " "),
            language: "unknown".to_string(),
        };

        if let Ok(content) = std::fs::read_to_string(config_path) {
            if let Ok(json) = serde_json::from_str::<Value>(&content) {
                if let Some(quality) = json
                    .get("audio")
                    .and_then(|a| a.get("quality"))
                    .and_then(|q| q.as_str())
                {
                    voice.name = format!("{} ({})", voice_id.replace('_', " "), quality);
                }

                if let Some(language) = json
                    .get("language")
                    .and_then(|l| l.get("code"))
                    .or_else(|| json.get("espeak").and_then(|e| e.get("voice")))
                    .and_then(|v| v.as_str())
                {
                    voice.language = language.to_string();
                }
            }
        }

        voice
    }
}

impl SpeechEngine for PiperEngine {
    fn id(&self) -> &'static str {
        "piper"
    }

    fn display_name(&self) -> &'static str {
        "Piper"
    }

    fn is_available(&self) -> bool {
        find_executable(&self.binary).is_some()
    }

    fn list_voices(&self) -> Result<Vec<Voice>> {
        let mut voices = Vec::new();

        if let Ok(entries) = std::fs::read_dir(&self.models_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|s| s.to_str()) != Some("onnx") {
                    continue;
                }
                if let Some(file_stem) = path.file_stem().and_then(|s| s.to_str()) {
                    let config_path = path.with_extension("onnx.json");
                    voices.push(self.parse_voice_metadata(&config_path, file_stem));
                }
            }
        }

        voices.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(voices)
    }

    fn synthesize(&self, text: &str, voice: Option<&str>, speed: f64) -> Result<AudioClip> {
        let voice_id = voice.unwrap_or(self.default_voice.as_str());

        let onnx_path = self.find_model(voice_id).ok_or_else(|| {
            BackendError::InvalidInput(format!(
                "Piper model not found locally for voice: {}. Please download it first.",
                voice_id
            ))
        })?;

        let length_scale = if speed > 0.0 { 1.0 / speed } else { 1.0 };

        let out = ToolCommand::new(&self.binary)
            .timeout_secs(self.timeout_secs)
            .opt("-m", &onnx_path)
            .opt("--length_scale", length_scale.to_string())
            .opt("--output_file", "-") // WAV to stdout
            .stdin_bytes(format!("{}\n", text))
            .run()?;

        wav::decode(&out)
    }
}
