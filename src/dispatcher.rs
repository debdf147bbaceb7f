//! Command routing and per-backend lazy initialization.

use serde_json::{json, Value};
use tracing::{debug, error, info};

use crate::backends::{
    BackendProvider, ImageBackend, MusicBackend, TranscriptionBackend, TtsBackend,
    VoiceCloneBackend,
};
use crate::error::{BackendError, Result};
use crate::protocol::{
    GenerateImageParams, Img2ImgParams, ListVoicesParams, MusicParams, Request, Response,
    TranscribeParams, TtsParams, VoiceCloneParams,
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Owns the backends. Each slot is filled on first use and kept for the
/// life of the process.
pub struct Dispatcher {
    provider: Box<dyn BackendProvider>,
    image: Option<Box<dyn ImageBackend>>,
    tts: Option<Box<dyn TtsBackend>>,
    voice_clone: Option<Box<dyn VoiceCloneBackend>>,
    transcription: Option<Box<dyn TranscriptionBackend>>,
    music: Option<Box<dyn MusicBackend>>,
}

/// Return the cached backend, building it first if the slot is empty.
/// A failed build leaves the slot empty.
fn lazy<'a, T: ?Sized>(
    slot: &'a mut Option<Box<T>>,
    name: &str,
    init: impl FnOnce() -> Result<Box<T>>,
) -> Result<&'a T> {
    let backend = match slot.take() {
        Some(backend) => backend,
        None => {
            info!(backend = name, "initializing backend");
            init()?
        }
    };
    Ok(&**slot.insert(backend))
}

impl Dispatcher {
    pub fn new(provider: impl BackendProvider + 'static) -> Self {
        Self {
            provider: Box::new(provider),
            image: None,
            tts: None,
            voice_clone: None,
            transcription: None,
            music: None,
        }
    }

    /// Answer one request. Never fails: errors become error responses.
    pub fn handle(&mut self, request: Request) -> Response {
        debug!(command = %request.command, request_id = %request.request_id, "handling request");

        match self.route(&request) {
            Ok(result) => Response::ok(request.request_id, result),
            Err(e) => {
                error!(
                    request_id = %request.request_id,
                    command = %request.command,
                    "request failed: {}",
                    e
                );
                Response::error(Some(request.request_id), e.to_string())
            }
        }
    }

    fn route(&mut self, request: &Request) -> Result<Value> {
        let provider = &self.provider;

        match request.command.as_str() {
            "health" => Ok(json!({ "status": "ok", "version": VERSION })),

            "generate_image" => {
                let params: GenerateImageParams = request.params()?;
                let backend = lazy(&mut self.image, "image", || provider.image())?;
                Ok(serde_json::to_value(backend.generate(&params)?)?)
            }
            "img2img" => {
                let params: Img2ImgParams = request.params()?;
                let backend = lazy(&mut self.image, "image", || provider.image())?;
                Ok(serde_json::to_value(backend.img2img(&params)?)?)
            }
            "list_image_models" => {
                let backend = lazy(&mut self.image, "image", || provider.image())?;
                Ok(json!({ "models": backend.list_models()? }))
            }

            "tts" => {
                let params: TtsParams = request.params()?;
                let backend = lazy(&mut self.tts, "tts", || provider.tts())?;
                Ok(serde_json::to_value(backend.generate(&params)?.into_payload())?)
            }
            "list_tts_engines" => {
                let backend = lazy(&mut self.tts, "tts", || provider.tts())?;
                Ok(json!({ "engines": backend.list_engines() }))
            }
            "list_voices" => {
                let params: ListVoicesParams = request.params()?;
                let backend = lazy(&mut self.tts, "tts", || provider.tts())?;
                Ok(json!({ "voices": backend.list_voices(&params.engine)? }))
            }

            "voice_clone" => {
                let params: VoiceCloneParams = request.params()?;
                let backend = lazy(&mut self.voice_clone, "voice_clone", || provider.voice_clone())?;
                Ok(serde_json::to_value(backend.clone_voice(&params)?.into_payload())?)
            }

            "transcribe" => {
                let params: TranscribeParams = request.params()?;
                let backend =
                    lazy(&mut self.transcription, "transcription", || provider.transcription())?;
                Ok(serde_json::to_value(backend.transcribe(&params)?)?)
            }

            "generate_music" => {
                let params: MusicParams = request.params()?;
                let backend = lazy(&mut self.music, "music", || provider.music())?;
                Ok(serde_json::to_value(backend.generate(&params)?.into_payload())?)
            }

            // Work is synchronous, so there is never anything in flight to stop.
            "cancel" => Ok(json!({ "status": "cancelled" })),

            other => Err(BackendError::InvalidInput(format!(
                "Unknown command: {}",
                other
            ))),
        }
    }
}
