use tracing::info;

use super::espeak::EspeakEngine;
use super::kokoro::KokoroEngine;
use super::piper::PiperEngine;
use super::{EngineInfo, SpeechEngine, TtsBackend, Voice};
use crate::config_loader::Settings;
use crate::error::{BackendError, Result};
use crate::media::AudioClip;
use crate::protocol::TtsParams;

/// Dispatches TTS calls to one of several named engines.
pub struct TtsRouter {
    engines: Vec<Box<dyn SpeechEngine>>,
}

impl TtsRouter {
    pub fn new(engines: Vec<Box<dyn SpeechEngine>>) -> Self {
        Self { engines }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let timeout = settings.backend_timeout_secs;
        Self::new(vec![
            Box::new(KokoroEngine::new(
                &settings.kokoro_binary,
                &settings.kokoro_model,
                timeout,
            )),
            Box::new(EspeakEngine::new(&settings.espeak_binary, timeout)),
            Box::new(PiperEngine::new(
                &settings.piper_binary,
                settings.piper_models_path(),
                &settings.piper_default_voice,
                timeout,
            )),
        ])
    }

    fn engine(&self, id: &str) -> Result<&dyn SpeechEngine> {
        self.engines
            .iter()
            .find(|e| e.id() == id)
            .map(|e| e.as_ref())
            .ok_or_else(|| BackendError::InvalidInput(format!("Unknown TTS engine: {}", id)))
    }
}

impl TtsBackend for TtsRouter {
    fn generate(&self, params: &TtsParams) -> Result<AudioClip> {
        if params.text.trim().is_empty() {
            return Err(BackendError::InvalidInput("text must not be empty".to_string()));
        }

        let engine = self.engine(&params.engine)?;
        if !engine.is_available() {
            return Err(BackendError::unavailable(
                engine.display_name(),
                install_hint(engine.id()),
            ));
        }

        let voice = match params.voice.as_str() {
            "" | "default" => None,
            other => Some(other),
        };
        info!(engine = engine.id(), voice = ?voice, chars = params.text.len(), "synthesizing speech");
        engine.synthesize(&params.text, voice, params.speed)
    }

    fn list_engines(&self) -> Vec<EngineInfo> {
        self.engines
            .iter()
            .map(|e| EngineInfo {
                id: e.id().to_string(),
                name: e.display_name().to_string(),
                available: e.is_available(),
            })
            .collect()
    }

    fn list_voices(&self, engine: &str) -> Result<Vec<Voice>> {
        self.engine(engine)?.list_voices()
    }
}

fn install_hint(engine: &str) -> &'static str {
    match engine {
        "kokoro" => "pip install mlx-audio",
        "espeak" => "apt install espeak-ng  # or: brew install espeak-ng",
        "piper" => "pip install piper-tts",
        _ => "see the engine's documentation",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Records the last synthesis call.
    struct StubEngine {
        id: &'static str,
        available: bool,
        calls: Arc<Mutex<Vec<(String, Option<String>, f64)>>>,
    }

    impl StubEngine {
        fn boxed(id: &'static str, available: bool) -> (Box<dyn SpeechEngine>, Arc<Mutex<Vec<(String, Option<String>, f64)>>>) {
            let calls = Arc::new(Mutex::new(Vec::new()));
            (
                Box::new(Self {
                    id,
                    available,
                    calls: calls.clone(),
                }),
                calls,
            )
        }
    }

    impl SpeechEngine for StubEngine {
        fn id(&self) -> &'static str {
            self.id
        }

        fn display_name(&self) -> &'static str {
            "Stub"
        }

        fn is_available(&self) -> bool {
            self.available
        }

        fn synthesize(&self, text: &str, voice: Option<&str>, speed: f64) -> Result<AudioClip> {
            self.calls
                .lock()
                .unwrap()
                .push((text.to_string(), voice.map(str::to_string), speed));
            Ok(AudioClip::new(vec![0.0; 100], 24000))
        }

        fn list_voices(&self) -> Result<Vec<Voice>> {
            Ok(vec![Voice {
                id: format!("{}-voice", self.id),
                name: "Voice".to_string(),
                language: "en".to_string(),
            }])
        }
    }

    fn params(engine: &str, voice: &str) -> TtsParams {
        TtsParams {
            text: "Hello".to_string(),
            voice: voice.to_string(),
            engine: engine.to_string(),
            ..TtsParams::default()
        }
    }

    #[test]
    fn test_routes_by_engine_and_maps_default_voice() {
        let (kokoro, kokoro_calls) = StubEngine::boxed("kokoro", true);
        let (espeak, espeak_calls) = StubEngine::boxed("espeak", true);
        let router = TtsRouter::new(vec![kokoro, espeak]);

        router.generate(&params("espeak", "default")).unwrap();
        router.generate(&params("kokoro", "am_adam")).unwrap();

        assert_eq!(espeak_calls.lock().unwrap()[0], ("Hello".to_string(), None, 1.0));
        assert_eq!(kokoro_calls.lock().unwrap()[0].1.as_deref(), Some("am_adam"));
    }

    #[test]
    fn test_unknown_engine() {
        let router = TtsRouter::new(vec![StubEngine::boxed("kokoro", true).0]);
        let err = router.generate(&params("bark", "default")).unwrap_err();
        assert_eq!(err.to_string(), "Unknown TTS engine: bark");
        assert!(router.list_voices("bark").is_err());
    }

    #[test]
    fn test_unavailable_engine_reports_hint() {
        let router = TtsRouter::new(vec![StubEngine::boxed("kokoro", false).0]);
        let err = router.generate(&params("kokoro", "default")).unwrap_err();
        assert!(err.to_string().contains("pip install mlx-audio"));
    }

    #[test]
    fn test_empty_text_rejected() {
        let router = TtsRouter::new(vec![StubEngine::boxed("kokoro", true).0]);
        let mut p = params("kokoro", "default");
        p.text = "   ".to_string();
        assert!(matches!(router.generate(&p), Err(BackendError::InvalidInput(_))));
    }

    #[test]
    fn test_list_engines_and_voices() {
        let router = TtsRouter::new(vec![
            StubEngine::boxed("kokoro", true).0,
            StubEngine::boxed("piper", false).0,
        ]);
        let engines = router.list_engines();
        assert_eq!(engines.len(), 2);
        assert!(engines[0].available);
        assert!(!engines[1].available);
        assert_eq!(router.list_voices("piper").unwrap()[0].id, "piper-voice");
    }

    #[test]
    fn test_from_settings_registers_all_engines() {
        let router = TtsRouter::from_settings(&Settings::default());
        let ids: Vec<String> = router.list_engines().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["kokoro", "espeak", "piper"]);
    }
}
