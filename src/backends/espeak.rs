use lazy_static::lazy_static;
use regex::Regex;

use super::process::{find_executable, ToolCommand};
use super::{SpeechEngine, Voice};
use crate::error::Result;
use crate::media::AudioClip;
use crate::wav;

/// espeak-ng's default rate in words per minute.
const BASE_WPM: f64 = 175.0;

lazy_static! {
    // " 5  en-gb          --/M      English_(Great_Britain) gmw/en   (en 2)"
    static ref VOICE_LINE: Regex =
        Regex::new(r"^\s*\d+\s+(\S+)\s+\S+\s+(\S+)\s+(\S+)").unwrap();
}

pub struct EspeakEngine {
    binary: String,
    timeout_secs: u64,
}

impl EspeakEngine {
    pub fn new(binary: &str, timeout_secs: u64) -> Self {
        Self {
            binary: binary.to_string(),
            timeout_secs,
        }
    }
}

impl SpeechEngine for EspeakEngine {
    fn id(&self) -> &'static str {
        "espeak"
    }

    fn display_name(&self) -> &'static str {
        "eSpeak NG"
    }

    fn is_available(&self) -> bool {
        find_executable(&self.binary).is_some()
    }

    fn synthesize(&self, text: &str, voice: Option<&str>, speed: f64) -> Result<AudioClip> {
        let mut cmd = ToolCommand::new(&self.binary)
            .timeout_secs(self.timeout_secs)
            .arg("--stdout")
            .opt("-s", words_per_minute(speed).to_string());
        if let Some(voice) = voice {
            cmd = cmd.opt("-v", voice);
        }
        // Text goes through stdin so it is never parsed as an option.
        let out = cmd.stdin_bytes(text).run()?;
        wav::decode(&out)
    }

    fn list_voices(&self) -> Result<Vec<Voice>> {
        let out = ToolCommand::new(&self.binary)
            .timeout_secs(self.timeout_secs)
            .arg("--voices")
            .run()?;
        Ok(parse_voices(&String::from_utf8_lossy(&out)))
    }
}

pub fn words_per_minute(speed: f64) -> u32 {
    let speed = if speed.is_finite() && speed > 0.0 { speed } else { 1.0 };
    (BASE_WPM * speed).round().max(1.0) as u32
}

/// Parse the table printed by `espeak-ng --voices`.
pub fn parse_voices(listing: &str) -> Vec<Voice> {
    listing
        .lines()
        .filter_map(|line| VOICE_LINE.captures(line))
        .map(|caps| Voice {
            id: caps[1].to_string(),
            name: caps[2].replace('_', " "),
            language: caps[1].to_string(),
        })
        .collect()
}
