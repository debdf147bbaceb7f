pub mod espeak;
pub mod f5;
pub mod image;
pub mod kokoro;
pub mod musicgen;
pub mod piper;
pub mod process;
pub mod tts;
pub mod whisper;

use serde::{Deserialize, Serialize};

use crate::config_loader::Settings;
use crate::error::Result;
use crate::media::AudioClip;
use crate::protocol::{
    GenerateImageParams, Img2ImgParams, MusicParams, TranscribeParams, TtsParams,
    VoiceCloneParams,
};

/// Represents a text-to-speech voice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voice {
    pub id: String,
    pub name: String,
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageModel {
    pub name: String,
    pub path: String,
}

/// Base64 PNGs plus the seed actually used.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedImages {
    pub images: Vec<String>,
    pub seed: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineInfo {
    pub id: String,
    pub name: String,
    pub available: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transcription {
    pub text: String,
    pub language: String,
    pub segments: Vec<Segment>,
}

#[cfg_attr(test, mockall::automock)]
pub trait ImageBackend: Send {
    fn generate(&self, params: &GenerateImageParams) -> Result<GeneratedImages>;

    fn img2img(&self, params: &Img2ImgParams) -> Result<GeneratedImages>;

    fn list_models(&self) -> Result<Vec<ImageModel>>;
}

/// Routes `tts`, `list_tts_engines` and `list_voices` to a named engine.
#[cfg_attr(test, mockall::automock)]
pub trait TtsBackend: Send {
    fn generate(&self, params: &TtsParams) -> Result<AudioClip>;

    fn list_engines(&self) -> Vec<EngineInfo>;

    fn list_voices(&self, engine: &str) -> Result<Vec<Voice>>;
}

/// Trait that every speech synthesis engine implements.
/// This lets the TTS router plug in Kokoro, eSpeak, Piper, and so on.
pub trait SpeechEngine: Send {
    /// Unique ID of the engine (e.g. "espeak")
    fn id(&self) -> &'static str;

    fn display_name(&self) -> &'static str;

    /// Whether the engine's executable can be found
    fn is_available(&self) -> bool;

    /// `voice` is `None` for the engine's default voice
    fn synthesize(&self, text: &str, voice: Option<&str>, speed: f64) -> Result<AudioClip>;

    fn list_voices(&self) -> Result<Vec<Voice>>;
}

#[cfg_attr(test, mockall::automock)]
pub trait VoiceCloneBackend: Send {
    fn clone_voice(&self, params: &VoiceCloneParams) -> Result<AudioClip>;
}

#[cfg_attr(test, mockall::automock)]
pub trait TranscriptionBackend: Send {
    fn transcribe(&self, params: &TranscribeParams) -> Result<Transcription>;
}

#[cfg_attr(test, mockall::automock)]
pub trait MusicBackend: Send {
    fn generate(&self, params: &MusicParams) -> Result<AudioClip>;
}

/// Builds backends on first use. A failed build is not cached.
#[cfg_attr(test, mockall::automock)]
pub trait BackendProvider: Send {
    fn image(&self) -> Result<Box<dyn ImageBackend>>;

    fn tts(&self) -> Result<Box<dyn TtsBackend>>;

    fn voice_clone(&self) -> Result<Box<dyn VoiceCloneBackend>>;

    fn transcription(&self) -> Result<Box<dyn TranscriptionBackend>>;

    fn music(&self) -> Result<Box<dyn MusicBackend>>;
}

/// Production provider: every backend drives an external tool.
pub struct ToolProvider {
    settings: Settings,
}

impl ToolProvider {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }
}

impl BackendProvider for ToolProvider {
    fn image(&self) -> Result<Box<dyn ImageBackend>> {
        Ok(Box::new(image::ToolImageBackend::from_settings(&self.settings)))
    }

    fn tts(&self) -> Result<Box<dyn TtsBackend>> {
        Ok(Box::new(tts::TtsRouter::from_settings(&self.settings)))
    }

    fn voice_clone(&self) -> Result<Box<dyn VoiceCloneBackend>> {
        Ok(Box::new(f5::F5Backend::from_settings(&self.settings)?))
    }

    fn transcription(&self) -> Result<Box<dyn TranscriptionBackend>> {
        Ok(Box::new(whisper::WhisperBackend::from_settings(&self.settings)?))
    }

    fn music(&self) -> Result<Box<dyn MusicBackend>> {
        Ok(Box::new(musicgen::MusicGenBackend::from_settings(&self.settings)?))
    }
}
