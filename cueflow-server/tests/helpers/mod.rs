//! Shared integration-test helpers: in-process app construction, a
//! deterministic stub extractor, WAV fixtures, and request plumbing.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::util::ServiceExt;

use cueflow_common::models::{Confidence, EnergyPoint, Features};
use cueflow_common::mood::{MoodClassifier, MoodInputs};
use cueflow_common::theory::MusicalKey;
use cueflow_server::config::{Args, Config};
use cueflow_server::extractor::{ExtractError, ExtractOptions, Extraction, FeatureExtractor};
use cueflow_server::store::Store;
use cueflow_server::{build_router, AppState};

/// Pinned per-file analysis outcome
#[derive(Debug, Clone, Copy)]
pub struct PinnedTrack {
    pub bpm: f64,
    pub key: &'static str,
    pub energy: f64,
    pub duration: f64,
}

/// Deterministic extractor: features come from a filename table, not audio.
pub struct StubExtractor {
    pins: HashMap<String, PinnedTrack>,
    delay: Duration,
    calls: AtomicUsize,
}

impl StubExtractor {
    pub fn new(pins: &[(&str, PinnedTrack)]) -> Self {
        Self {
            pins: pins
                .iter()
                .map(|(name, pin)| (name.to_string(), *pin))
                .collect(),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn features_for(pin: &PinnedTrack) -> (Features, f64) {
        let key: MusicalKey = pin.key.parse().expect("pinned key parses");
        let stride = pin.duration / 15.0;
        let classification = MoodClassifier::new().classify(MoodInputs {
            energy: pin.energy,
            valence: 0.5,
            bpm: pin.bpm,
            acousticness: 0.2,
            minor: key.is_minor(),
        });
        let features = Features {
            bpm: pin.bpm,
            key,
            camelot: key.camelot(),
            energy: pin.energy,
            valence: 0.5,
            danceability: 0.6,
            acousticness: 0.2,
            instrumentalness: 0.8,
            mood: classification.mood,
            mood_scores: classification.scores,
            energy_timeseries: (0..16)
                .map(|i| EnergyPoint {
                    t: i as f64 * stride,
                    v: pin.energy,
                })
                .collect(),
            stride_seconds: stride,
            confidence: Confidence {
                bpm: 0.95,
                key: 0.9,
                energy: 0.95,
                mood: classification.confidence,
            },
        };
        (features, pin.duration)
    }
}

impl FeatureExtractor for StubExtractor {
    fn extract(&self, path: &Path, _options: &ExtractOptions) -> Result<Extraction, ExtractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let pin = self.pins.get(&name).copied().unwrap_or(PinnedTrack {
            bpm: 120.0,
            key: "Am",
            energy: 0.5,
            duration: 10.0,
        });
        let (features, duration) = Self::features_for(&pin);
        Ok(Extraction {
            features,
            duration_seconds: duration,
            sample_rate: Some(44_100),
        })
    }
}

/// The in-process application plus everything the tests poke at directly
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub data_dir: tempfile::TempDir,
    pub library_dir: tempfile::TempDir,
}

/// Build the app around the given extractor, with small worker/timeout
/// settings suited to tests.
pub async fn create_test_app(extractor: Arc<dyn FeatureExtractor>) -> TestApp {
    let data_dir = tempfile::tempdir().expect("temp data root");
    let library_dir = tempfile::tempdir().expect("temp library");

    let mut config = Config::resolve(Args::default()).expect("default config resolves");
    config.data_root = data_dir.path().to_path_buf();
    config.max_workers = 2;
    config.analysis_timeout = Duration::from_secs(10);
    config.generation_timeout = Duration::from_secs(10);

    let store = Arc::new(
        Store::init(&config.data_root, config.cache_ttl_days)
            .await
            .expect("store opens"),
    );
    let state = AppState::new(Arc::new(config), store, extractor);
    let router = build_router(state.clone());

    TestApp {
        router,
        state,
        data_dir,
        library_dir,
    }
}

/// Write a half-second 440 Hz mono WAV; real enough for the scanner's magic
/// check and the signal extractor alike.
pub fn write_wav(path: &Path) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 44_100,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).expect("wav writer");
    for i in 0..22_050 {
        let t = i as f32 / 44_100.0;
        let sample = (t * 440.0 * std::f32::consts::TAU).sin();
        writer
            .write_sample((sample * f32::from(i16::MAX)) as i16)
            .expect("write sample");
    }
    writer.finalize().expect("finalize wav");
}

/// GET a JSON endpoint
pub async fn get_json(router: &Router, uri: &str) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri(uri)
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("request succeeds");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body collects")
        .to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

/// POST a JSON body
pub async fn post_json(router: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .expect("request builds"),
        )
        .await
        .expect("request succeeds");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body collects")
        .to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

/// Poll a task status URL until the task is terminal
pub async fn wait_for_task(router: &Router, status_url: &str, deadline: Duration) -> Value {
    let start = std::time::Instant::now();
    loop {
        let (status, body) = get_json(router, status_url).await;
        assert_eq!(status, StatusCode::OK, "status poll failed: {body}");
        let state = body["state"].as_str().unwrap_or_default().to_string();
        if matches!(state.as_str(), "completed" | "failed" | "cancelled") {
            return body;
        }
        if start.elapsed() > deadline {
            panic!("task did not finish within {deadline:?}: {body}");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Percent-encode a path for use as a single URL segment
pub fn url_encode(raw: &str) -> String {
    raw.bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                (b as char).to_string()
            }
            _ => format!("%{b:02X}"),
        })
        .collect()
}

/// Seed `library_dir` with WAV files and return their paths
pub fn seed_library(library_dir: &Path, names: &[&str]) -> Vec<PathBuf> {
    names
        .iter()
        .map(|name| {
            let path = library_dir.join(name);
            write_wav(&path);
            path
        })
        .collect()
}
