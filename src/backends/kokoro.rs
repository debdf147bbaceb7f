use std::path::PathBuf;

use lazy_static::lazy_static;

use super::process::{find_executable, ToolCommand};
use super::{SpeechEngine, Voice};
use crate::error::{BackendError, Result};
use crate::media::AudioClip;
use crate::wav;

pub const DEFAULT_VOICE: &str = "af_heart";

lazy_static! {
    /// Voices bundled with Kokoro-82M. The first letter of the id is the
    /// accent, the second the speaker's gender.
    static ref VOICES: Vec<Voice> = [
        ("af_heart", "Heart"),
        ("af_alloy", "Alloy"),
        ("af_bella", "Bella"),
        ("af_nicole", "Nicole"),
        ("af_nova", "Nova"),
        ("af_sarah", "Sarah"),
        ("af_sky", "Sky"),
        ("am_adam", "Adam"),
        ("am_echo", "Echo"),
        ("am_michael", "Michael"),
        ("bf_alice", "Alice"),
        ("bf_emma", "Emma"),
        ("bf_isabella", "Isabella"),
        ("bm_daniel", "Daniel"),
        ("bm_george", "George"),
        ("bm_lewis", "Lewis"),
    ]
    .iter()
    .map(|(id, name)| Voice {
        id: id.to_string(),
        name: name.to_string(),
        language: if id.starts_with('b') { "en-gb" } else { "en-us" }.to_string(),
    })
    .collect();
}

/// Kokoro through the mlx-audio TTS generator.
pub struct KokoroEngine {
    binary: String,
    model: String,
    timeout_secs: u64,
}

impl KokoroEngine {
    pub fn new(binary: &str, model: &str, timeout_secs: u64) -> Self {
        Self {
            binary: binary.to_string(),
            model: model.to_string(),
            timeout_secs,
        }
    }
}

impl SpeechEngine for KokoroEngine {
    fn id(&self) -> &'static str {
        "kokoro"
    }

    fn display_name(&self) -> &'static str {
        "Kokoro (mlx-audio)"
    }

    fn is_available(&self) -> bool {
        find_executable(&self.binary).is_some()
    }

    fn synthesize(&self, text: &str, voice: Option<&str>, speed: f64) -> Result<AudioClip> {
        let workdir = tempfile::tempdir()?;
        let prefix = workdir.path().join("speech");

        ToolCommand::new(&self.binary)
            .timeout_secs(self.timeout_secs)
            .opt("--model", &self.model)
            .opt("--text", text)
            .opt("--voice", voice.unwrap_or(DEFAULT_VOICE))
            .opt("--speed", speed.to_string())
            .opt("--file_prefix", &prefix)
            .opt("--audio_format", "wav")
            .arg("--join_audio")
            .run()?;

        let output = first_wav(workdir.path())?;
        wav::decode(&std::fs::read(output)?)
    }

    fn list_voices(&self) -> Result<Vec<Voice>> {
        Ok(VOICES.clone())
    }
}

/// mlx-audio derives the file name from the prefix; take whatever WAV it wrote.
fn first_wav(dir: &std::path::Path) -> Result<PathBuf> {
    let mut wavs: Vec<PathBuf> = std::fs::read_dir(dir)?
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("wav"))
        .collect();
    wavs.sort();
    wavs.into_iter()
        .next()
        .ok_or_else(|| BackendError::InvalidOutput("kokoro wrote no audio file".to_string()))
}
