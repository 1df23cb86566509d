//! End-to-end analysis workflow: happy path, cache behaviour, invalidation,
//! and cancellation, driven through the REST surface with a stub extractor.

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use serde_json::json;

use helpers::{
    create_test_app, get_json, post_json, seed_library, url_encode, wait_for_task, PinnedTrack,
    StubExtractor, TestApp,
};

fn tiny_library_pins() -> Vec<(&'static str, PinnedTrack)> {
    vec![
        (
            "a.wav",
            PinnedTrack {
                bpm: 120.0,
                key: "Am",
                energy: 0.4,
                duration: 10.0,
            },
        ),
        (
            "b.wav",
            PinnedTrack {
                bpm: 124.0,
                key: "Am",
                energy: 0.6,
                duration: 20.0,
            },
        ),
        (
            "c.wav",
            PinnedTrack {
                bpm: 128.0,
                key: "Em",
                energy: 0.8,
                duration: 30.0,
            },
        ),
    ]
}

async fn start_analysis(app: &TestApp, body: serde_json::Value) -> (String, serde_json::Value) {
    let (status, response) = post_json(&app.router, "/api/analysis/start", body).await;
    assert_eq!(status, StatusCode::OK, "{response}");
    let status_url = response["status_url"].as_str().unwrap().to_string();
    (status_url, response)
}

#[tokio::test]
async fn test_happy_path_tiny_library() {
    let pins = tiny_library_pins();
    let extractor = Arc::new(StubExtractor::new(&pins));
    let app = create_test_app(extractor.clone()).await;
    seed_library(app.library_dir.path(), &["a.wav", "b.wav", "c.wav"]);

    let (status_url, response) = start_analysis(
        &app,
        json!({"directories": [app.library_dir.path()], "recursive": true}),
    )
    .await;
    assert_eq!(response["total_files"], 3);

    let task = wait_for_task(&app.router, &status_url, Duration::from_secs(10)).await;
    assert_eq!(task["state"], "completed", "{task}");
    assert_eq!(task["progress"], 100.0);
    assert_eq!(task["total_files"], 3);
    assert_eq!(task["processed_files"], 3);
    assert_eq!(task["result"]["succeeded"], 3);
    assert_eq!(task["result"]["failed"], 0);
    assert_eq!(extractor.calls(), 3);

    // All three land in the store with their pinned features.
    let (status, listing) = get_json(&app.router, "/api/tracks?sort_by=bpm").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing["total"], 3);
    let bpms: Vec<f64> = listing["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["features"]["bpm"].as_f64().unwrap())
        .collect();
    assert_eq!(bpms, vec![120.0, 124.0, 128.0]);

    // Full track view includes the time series.
    let b_path = app.library_dir.path().join("b.wav");
    let encoded = url_encode(&b_path.canonicalize().unwrap().display().to_string());
    let (status, track) = get_json(&app.router, &format!("/api/tracks/{encoded}")).await;
    assert_eq!(status, StatusCode::OK, "{track}");
    assert_eq!(track["features"]["camelot"], "8A");
    assert_eq!(track["features"]["key"], "Am");
    assert!(track["features"]["energy_timeseries"].as_array().unwrap().len() >= 8);
}

#[tokio::test]
async fn test_second_run_is_all_cache_hits() {
    let pins = tiny_library_pins();
    let extractor = Arc::new(StubExtractor::new(&pins));
    let app = create_test_app(extractor.clone()).await;
    seed_library(app.library_dir.path(), &["a.wav", "b.wav", "c.wav"]);

    let body = json!({"directories": [app.library_dir.path()]});
    let (status_url, _) = start_analysis(&app, body.clone()).await;
    wait_for_task(&app.router, &status_url, Duration::from_secs(10)).await;
    assert_eq!(extractor.calls(), 3);

    let (status_url, _) = start_analysis(&app, body).await;
    let task = wait_for_task(&app.router, &status_url, Duration::from_secs(10)).await;
    assert_eq!(task["state"], "completed");
    assert_eq!(task["result"]["cache_hits"], 3);
    // No extractor calls on the second pass.
    assert_eq!(extractor.calls(), 3);

    let (_, stats) = get_json(&app.router, "/api/analysis/cache/stats").await;
    assert_eq!(stats["cache_hit_rate"], 1.0, "{stats}");
}

#[tokio::test]
async fn test_content_change_with_preserved_mtime_and_overwrite() {
    let pins = tiny_library_pins();
    let extractor = Arc::new(StubExtractor::new(&pins));
    let app = create_test_app(extractor.clone()).await;
    seed_library(app.library_dir.path(), &["a.wav", "b.wav", "c.wav"]);

    let body = json!({"directories": [app.library_dir.path()]});
    let (status_url, _) = start_analysis(&app, body.clone()).await;
    wait_for_task(&app.router, &status_url, Duration::from_secs(10)).await;

    let b_path = app.library_dir.path().join("b.wav");
    let canonical = b_path.canonicalize().unwrap();
    let encoded = url_encode(&canonical.display().to_string());
    let (_, before) = get_json(&app.router, &format!("/api/tracks/{encoded}")).await;
    let old_cid = before["content_id"].as_str().unwrap().to_string();

    // Rewrite the bytes at identical length, then wind the mtime back so the
    // (size, mtime) fast path still matches.
    let original = std::fs::read(&b_path).unwrap();
    let mtime = std::fs::metadata(&b_path).unwrap().modified().unwrap();
    let mut mutated = original.clone();
    let last = mutated.len() - 1;
    mutated[last] ^= 0xFF;
    std::fs::write(&b_path, &mutated).unwrap();
    let file = std::fs::File::options().write(true).open(&b_path).unwrap();
    file.set_times(std::fs::FileTimes::new().set_modified(mtime))
        .unwrap();

    // Without overwrite the stale fingerprint is trusted: all hits.
    let (status_url, _) = start_analysis(&app, body.clone()).await;
    let task = wait_for_task(&app.router, &status_url, Duration::from_secs(10)).await;
    assert_eq!(task["result"]["cache_hits"], 3, "{task}");
    assert_eq!(extractor.calls(), 3);

    // overwrite_cache forces re-extraction and a fresh content id.
    let (status_url, _) = start_analysis(
        &app,
        json!({"directories": [app.library_dir.path()], "overwrite_cache": true}),
    )
    .await;
    let task = wait_for_task(&app.router, &status_url, Duration::from_secs(10)).await;
    assert_eq!(task["state"], "completed");
    assert_eq!(task["result"]["cache_hits"], 0);
    assert_eq!(extractor.calls(), 6);

    let (_, after) = get_json(&app.router, &format!("/api/tracks/{encoded}")).await;
    let new_cid = after["content_id"].as_str().unwrap().to_string();
    assert_ne!(new_cid, old_cid);
}

#[tokio::test]
async fn test_cancellation_mid_run() {
    let names: Vec<String> = (0..30).map(|i| format!("t{i:02}.wav")).collect();
    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();

    let extractor =
        Arc::new(StubExtractor::new(&[]).with_delay(Duration::from_millis(200)));
    let app = create_test_app(extractor).await;
    seed_library(app.library_dir.path(), &name_refs);

    let (status_url, response) = start_analysis(
        &app,
        json!({"directories": [app.library_dir.path()]}),
    )
    .await;
    assert_eq!(response["total_files"], 30);
    let task_id = response["task_id"].as_str().unwrap().to_string();

    tokio::time::sleep(Duration::from_millis(250)).await;
    let (status, cancelled) = post_json(
        &app.router,
        &format!("/api/analysis/{task_id}/cancel"),
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{cancelled}");

    let task = wait_for_task(&app.router, &status_url, Duration::from_secs(5)).await;
    assert_eq!(task["state"], "cancelled", "{task}");
    let processed = task["processed_files"].as_u64().unwrap();
    assert!(processed < 30, "cancel left {processed} files processed");

    // No further increments once terminal.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let (_, again) = get_json(&app.router, &status_url).await;
    assert_eq!(again["processed_files"].as_u64().unwrap(), processed);

    // Cancelling again is idempotent.
    let (status, _) = post_json(
        &app.router,
        &format!("/api/analysis/{task_id}/cancel"),
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_corrupt_file_is_reported_not_fatal() {
    let pins = tiny_library_pins();
    let extractor = Arc::new(StubExtractor::new(&pins));
    let app = create_test_app(extractor).await;
    seed_library(app.library_dir.path(), &["a.wav", "b.wav"]);
    // Valid WAV magic but the stub never sees it: the scanner accepts it and
    // analysis pins features anyway. To exercise the error path, drop in a
    // file whose magic check fails; the scanner skips it silently.
    std::fs::write(app.library_dir.path().join("junk.wav"), b"not really audio").unwrap();

    let (status_url, response) = start_analysis(
        &app,
        json!({"directories": [app.library_dir.path()]}),
    )
    .await;
    assert_eq!(response["total_files"], 2);

    let task = wait_for_task(&app.router, &status_url, Duration::from_secs(10)).await;
    assert_eq!(task["state"], "completed");
    assert_eq!(task["result"]["succeeded"], 2);
}
