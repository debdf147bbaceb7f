use std::fmt::Write as _;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use studiod::backends::{
    BackendProvider, ImageBackend, MusicBackend, TranscriptionBackend, TtsBackend,
    VoiceCloneBackend,
};
use studiod::error::{BackendError, Result};
use studiod::media::AudioClip;
use studiod::protocol::MusicParams;
use studiod::{server, Dispatcher};

/// Hand-rolled provider that only knows how to make music.
struct CountingProvider {
    builds: Arc<AtomicUsize>,
}

struct SineMusic;

impl MusicBackend for SineMusic {
    fn generate(&self, params: &MusicParams) -> Result<AudioClip> {
        let rate = 8000;
        let samples = (0..(params.duration * rate as f64) as usize)
            .map(|i| (i as f32 * 440.0 * std::f32::consts::TAU / rate as f32).sin())
            .collect();
        Ok(AudioClip::new(samples, rate))
    }
}

fn nope<T>() -> Result<T> {
    Err(BackendError::unavailable("test", "not provided"))
}

impl BackendProvider for CountingProvider {
    fn image(&self) -> Result<Box<dyn ImageBackend>> {
        nope()
    }

    fn tts(&self) -> Result<Box<dyn TtsBackend>> {
        nope()
    }

    fn voice_clone(&self) -> Result<Box<dyn VoiceCloneBackend>> {
        nope()
    }

    fn transcription(&self) -> Result<Box<dyn TranscriptionBackend>> {
        nope()
    }

    fn music(&self) -> Result<Box<dyn MusicBackend>> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SineMusic))
    }
}

#[tokio::test]
async fn test_request_flood_builds_backend_once() {
    let builds = Arc::new(AtomicUsize::new(0));
    let provider = CountingProvider {
        builds: builds.clone(),
    };

    let mut input = String::new();
    for i in 0..500 {
        match i % 3 {
            0 => writeln!(input, r#"{{"command": "generate_music", "request_id": {}, "duration": 0.25}}"#, i),
            1 => writeln!(input, r#"{{"command": "health", "request_id": {}}}"#, i),
            _ => writeln!(input, r#"{{"command": "tts", "request_id": {}, "text": "x"}}"#, i),
        }
        .unwrap();
    }

    let start = std::time::Instant::now();
    let mut output = Vec::new();
    let stats = server::serve(input.as_bytes(), &mut output, Dispatcher::new(provider))
        .await
        .unwrap();
    let elapsed = start.elapsed();

    let text = String::from_utf8(output).unwrap();
    let lines: Vec<serde_json::Value> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();

    assert_eq!(lines.len(), 500);
    for (i, line) in lines.iter().enumerate() {
        assert_eq!(line["request_id"], serde_json::json!(i));
    }
    assert_eq!(lines[0]["sample_rate"], serde_json::json!(8000));
    assert_eq!(lines[0]["duration"], serde_json::json!(0.25));

    assert_eq!(builds.load(Ordering::SeqCst), 1);
    // Every tts request retries the failing build.
    assert_eq!(stats.requests, 500);
    assert_eq!(stats.errors, 166);

    assert!(
        elapsed.as_secs() < 30,
        "500 requests took {:?}",
        elapsed
    );
}
