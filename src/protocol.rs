//! Line-delimited JSON request/response shapes.
//!
//! A request is any JSON object carrying `command` and `request_id`; the
//! remaining keys are command parameters, each with its own default.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::BackendError;

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub command: String,
    pub request_id: Value,
    pub params: Map<String, Value>,
}

impl Request {
    pub fn new(command: impl Into<String>, request_id: impl Into<Value>) -> Self {
        Self {
            command: command.into(),
            request_id: request_id.into(),
            params: Map::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    /// Build a request from a decoded JSON line. Non-objects are rejected.
    pub fn from_value(value: Value) -> Result<Self, Response> {
        let Value::Object(mut params) = value else {
            return Err(Response::error(None, "Request must be a JSON object"));
        };

        let command = match params.remove("command") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s,
            Some(other) => other.to_string(),
        };
        let request_id = params
            .remove("request_id")
            .unwrap_or_else(|| Value::String(String::new()));

        Ok(Self {
            command,
            request_id,
            params,
        })
    }

    /// Deserialize this request's parameters, applying per-field defaults.
    pub fn params<T: DeserializeOwned>(&self) -> Result<T, BackendError> {
        serde_json::from_value(Value::Object(self.params.clone())).map_err(|e| {
            BackendError::InvalidInput(format!(
                "Invalid parameters for {}: {}",
                self.command, e
            ))
        })
    }
}

/// Outcome of reading one input line.
#[derive(Debug)]
pub enum ParsedLine {
    Blank,
    Request(Request),
    Invalid(Response),
}

pub fn parse_line(line: &str) -> ParsedLine {
    let line = line.trim();
    if line.is_empty() {
        return ParsedLine::Blank;
    }

    match serde_json::from_str::<Value>(line) {
        Ok(value) => match Request::from_value(value) {
            Ok(request) => ParsedLine::Request(request),
            Err(response) => ParsedLine::Invalid(response),
        },
        Err(e) => ParsedLine::Invalid(Response::error(None, format!("Invalid JSON: {}", e))),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Value>,
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl Response {
    /// Echo `request_id` alongside the fields of a result object.
    pub fn ok(request_id: Value, result: Value) -> Self {
        let body = match result {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("result".to_string(), other);
                map
            }
        };
        Self {
            request_id: Some(request_id),
            body,
        }
    }

    pub fn error(request_id: Option<Value>, message: impl Into<String>) -> Self {
        let mut body = Map::new();
        body.insert("error".to_string(), Value::String(message.into()));
        Self { request_id, body }
    }

    pub fn error_message(&self) -> Option<&str> {
        self.body.get("error").and_then(Value::as_str)
    }

    pub fn is_error(&self) -> bool {
        self.error_message().is_some()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.body.get(key)
    }

    /// Serialize as a single protocol line, newline included.
    pub fn to_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

// -----------------------------------------------------------------------------
// Command parameters
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GenerateImageParams {
    pub prompt: String,
    pub negative_prompt: String,
    pub steps: u32,
    pub cfg_scale: f64,
    pub width: u32,
    pub height: u32,
    /// -1 asks for a random seed.
    pub seed: i64,
}

impl Default for GenerateImageParams {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            negative_prompt: String::new(),
            steps: 20,
            cfg_scale: 7.0,
            width: 512,
            height: 512,
            seed: -1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Img2ImgParams {
    pub prompt: String,
    /// Base64 image, optionally as a data URL.
    pub init_image: String,
    pub denoising_strength: f64,
    pub steps: u32,
    pub cfg_scale: f64,
    pub seed: i64,
}

impl Default for Img2ImgParams {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            init_image: String::new(),
            denoising_strength: 0.75,
            steps: 20,
            cfg_scale: 7.0,
            seed: -1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TtsParams {
    pub text: String,
    pub voice: String,
    pub speed: f64,
    pub engine: String,
}

impl Default for TtsParams {
    fn default() -> Self {
        Self {
            text: String::new(),
            voice: "default".to_string(),
            speed: 1.0,
            engine: "kokoro".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ListVoicesParams {
    pub engine: String,
}

impl Default for ListVoicesParams {
    fn default() -> Self {
        Self {
            engine: "kokoro".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct VoiceCloneParams {
    pub text: String,
    /// Path to the reference recording.
    pub reference_audio: String,
    pub speed: f64,
}

impl Default for VoiceCloneParams {
    fn default() -> Self {
        Self {
            text: String::new(),
            reference_audio: String::new(),
            speed: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TranscribeParams {
    pub audio_file: String,
    pub model: String,
    pub language: Option<String>,
}

impl Default for TranscribeParams {
    fn default() -> Self {
        Self {
            audio_file: String::new(),
            model: "base".to_string(),
            language: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MusicParams {
    pub prompt: String,
    /// Requested length in seconds.
    pub duration: f64,
    pub model_size: String,
}

impl Default for MusicParams {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            duration: 10.0,
            model_size: "small".to_string(),
        }
    }
}
