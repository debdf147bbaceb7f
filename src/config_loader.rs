use config::{Config, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    // Subprocess behaviour
    pub backend_timeout_secs: u64, // 0 = wait for the tool to finish
    // Image synthesis
    pub diffusionkit_binary: String,
    pub diffusionkit_model: String,
    pub mflux_binary: String,
    pub mflux_model: String,
    pub image_model_dirs: Vec<String>,
    // Text-to-speech
    pub kokoro_binary: String,
    pub kokoro_model: String,
    pub espeak_binary: String,
    pub piper_binary: String,
    pub piper_models_dir: String,
    pub piper_default_voice: String,
    // Voice cloning
    pub f5_binary: String,
    // Speech-to-text
    pub whisper_binary: String,
    // Music generation
    pub musicgen_binary: String,
    pub musicgen_fallback_binary: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend_timeout_secs: 0,
            diffusionkit_binary: "diffusionkit-cli".to_string(),
            diffusionkit_model: "argmaxinc/mlx-stable-diffusion-3-medium".to_string(),
            mflux_binary: "mflux-generate".to_string(),
            mflux_model: "schnell".to_string(),
            image_model_dirs: vec![
                "~/.cache/huggingface/hub".to_string(),
                "~/models".to_string(),
            ],
            kokoro_binary: "mlx_audio.tts.generate".to_string(),
            kokoro_model: "prince-canuma/Kokoro-82M".to_string(),
            espeak_binary: "espeak-ng".to_string(),
            piper_binary: "piper".to_string(),
            piper_models_dir: "~/.local/share/piper/models".to_string(),
            piper_default_voice: "en_US-lessac-medium".to_string(),
            f5_binary: "f5-tts-mlx".to_string(),
            whisper_binary: "mlx_whisper".to_string(),
            musicgen_binary: "musicgen-mlx".to_string(),
            musicgen_fallback_binary: "musicgen-transformers".to_string(),
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, config::ConfigError> {
        Self::load(None)
    }

    /// Layered load: defaults, `./Studio`, `~/.config/studiod/Studio`,
    /// an optional explicit file, then `STUDIOD_*` environment variables.
    pub fn load(explicit: Option<&Path>) -> Result<Self, config::ConfigError> {
        let defaults = Settings::default();
        let user_config = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("studiod/Studio");

        let mut builder = Config::builder()
            .set_default("backend_timeout_secs", defaults.backend_timeout_secs)?
            .set_default("diffusionkit_binary", defaults.diffusionkit_binary)?
            .set_default("diffusionkit_model", defaults.diffusionkit_model)?
            .set_default("mflux_binary", defaults.mflux_binary)?
            .set_default("mflux_model", defaults.mflux_model)?
            .set_default("image_model_dirs", defaults.image_model_dirs)?
            .set_default("kokoro_binary", defaults.kokoro_binary)?
            .set_default("kokoro_model", defaults.kokoro_model)?
            .set_default("espeak_binary", defaults.espeak_binary)?
            .set_default("piper_binary", defaults.piper_binary)?
            .set_default("piper_models_dir", defaults.piper_models_dir)?
            .set_default("piper_default_voice", defaults.piper_default_voice)?
            .set_default("f5_binary", defaults.f5_binary)?
            .set_default("whisper_binary", defaults.whisper_binary)?
            .set_default("musicgen_binary", defaults.musicgen_binary)?
            .set_default("musicgen_fallback_binary", defaults.musicgen_fallback_binary)?
            .add_source(File::with_name("Studio").required(false))
            .add_source(File::from(user_config).required(false));

        if let Some(path) = explicit {
            builder = builder.add_source(File::from(path.to_path_buf()).required(true));
        }

        // e.g. STUDIOD_WHISPER_BINARY, STUDIOD_IMAGE_MODEL_DIRS=/a,/b
        let builder = builder.add_source(
            config::Environment::with_prefix("STUDIOD")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("image_model_dirs"),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), config::ConfigError> {
        let binaries = [
            ("diffusionkit_binary", &self.diffusionkit_binary),
            ("mflux_binary", &self.mflux_binary),
            ("kokoro_binary", &self.kokoro_binary),
            ("espeak_binary", &self.espeak_binary),
            ("piper_binary", &self.piper_binary),
            ("f5_binary", &self.f5_binary),
            ("whisper_binary", &self.whisper_binary),
            ("musicgen_binary", &self.musicgen_binary),
            ("musicgen_fallback_binary", &self.musicgen_fallback_binary),
        ];
        for (key, value) in binaries {
            if value.trim().is_empty() {
                return Err(config::ConfigError::Message(format!(
                    "{} must not be empty",
                    key
                )));
            }
        }
        Ok(())
    }

    pub fn image_model_paths(&self) -> Vec<PathBuf> {
        self.image_model_dirs.iter().map(|d| expand_home(d)).collect()
    }

    pub fn piper_models_path(&self) -> PathBuf {
        expand_home(&self.piper_models_dir)
    }
}

/// Expand a leading `~/` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(rest),
        None => PathBuf::from(path),
    }
}
