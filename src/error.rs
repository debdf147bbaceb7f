use thiserror::Error;

/// Failure while serving a single request through a backend.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("{backend} not available. Install it:\n  {hint}")]
    Unavailable { backend: String, hint: String },

    /// None of the alternative toolchains for a backend is installed.
    #[error("No MLX {kind} found. Install {choices}:\n  {hint}")]
    NoToolchain {
        kind: String,
        choices: String,
        hint: String,
    },

    #[error("Failed to start {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with {status}: {stderr}")]
    ToolFailed {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("{tool} timed out after {secs}s")]
    TimedOut { tool: String, secs: u64 },

    #[error("{0}")]
    InvalidInput(String),

    #[error("Unexpected backend output: {0}")]
    InvalidOutput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
}

impl BackendError {
    pub fn unavailable(backend: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::Unavailable {
            backend: backend.into(),
            hint: hint.into(),
        }
    }

    pub fn no_toolchain(
        kind: impl Into<String>,
        choices: impl Into<String>,
        hint: impl Into<String>,
    ) -> Self {
        Self::NoToolchain {
            kind: kind.into(),
            choices: choices.into(),
            hint: hint.into(),
        }
    }
}

/// Failure of the daemon itself (startup or the I/O loop).
#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Request task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, BackendError>;
