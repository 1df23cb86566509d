//! End-to-end playlist generation: harmonic strictness walks, infeasible
//! constraint sets, result polling, and export of a generated playlist.

mod helpers;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use serde_json::json;

use helpers::{
    create_test_app, get_json, post_json, seed_library, wait_for_task, PinnedTrack, StubExtractor,
    TestApp,
};

/// Six tracks whose camelots/BPMs force a predictable wheel walk
fn harmonic_pins() -> Vec<(&'static str, PinnedTrack)> {
    vec![
        ("t1.wav", PinnedTrack { bpm: 124.0, key: "Am", energy: 0.40, duration: 300.0 }), // 8A
        ("t2.wav", PinnedTrack { bpm: 126.0, key: "Em", energy: 0.50, duration: 300.0 }), // 9A
        ("t3.wav", PinnedTrack { bpm: 128.0, key: "Bm", energy: 0.60, duration: 300.0 }), // 10A
        ("t4.wav", PinnedTrack { bpm: 130.0, key: "D#m", energy: 0.70, duration: 300.0 }), // 2A
        ("t5.wav", PinnedTrack { bpm: 126.0, key: "C#", energy: 0.50, duration: 300.0 }), // 3B
        ("t6.wav", PinnedTrack { bpm: 122.0, key: "Dm", energy: 0.45, duration: 300.0 }), // 7A
    ]
}

async fn analysed_app() -> (TestApp, HashMap<String, (String, f64)>) {
    let pins = harmonic_pins();
    let app = create_test_app(Arc::new(StubExtractor::new(&pins))).await;
    let names: Vec<&str> = pins.iter().map(|(name, _)| *name).collect();
    seed_library(app.library_dir.path(), &names);

    let (status, response) = post_json(
        &app.router,
        "/api/analysis/start",
        json!({"directories": [app.library_dir.path()]}),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{response}");
    let status_url = response["status_url"].as_str().unwrap().to_string();
    let task = wait_for_task(&app.router, &status_url, Duration::from_secs(10)).await;
    assert_eq!(task["state"], "completed", "{task}");

    // Canonical path → (camelot, bpm), for sequence assertions.
    let (_, listing) = get_json(&app.router, "/api/tracks?per_page=100").await;
    let mut by_path = HashMap::new();
    for item in listing["items"].as_array().unwrap() {
        by_path.insert(
            item["path"].as_str().unwrap().to_string(),
            (
                item["features"]["camelot"].as_str().unwrap().to_string(),
                item["features"]["bpm"].as_f64().unwrap(),
            ),
        );
    }
    (app, by_path)
}

fn strict_rules() -> serde_json::Value {
    json!({
        "bpm_range": {"min": 120.0, "max": 132.0},
        "energy_range": {"min": 0.0, "max": 1.0},
        "energy_curve": "buildup",
        "harmony_strictness": 1.0,
        "max_bpm_jump": 3.0,
        "min_track_duration": 0.0,
        "max_track_duration": 1000.0,
    })
}

async fn generate_and_fetch(app: &TestApp, body: serde_json::Value) -> serde_json::Value {
    let (status, response) = post_json(&app.router, "/api/playlists/generate", body).await;
    assert_eq!(status, StatusCode::OK, "{response}");
    let task_id = response["task_id"].as_str().unwrap().to_string();
    let status_url = response["status_url"].as_str().unwrap().to_string();

    let task = wait_for_task(&app.router, &status_url, Duration::from_secs(15)).await;
    assert_eq!(task["state"], "completed", "{task}");

    let (status, playlist) = get_json(
        &app.router,
        &format!("/api/playlists/generate/{task_id}/result"),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{playlist}");
    playlist
}

#[tokio::test]
async fn test_strict_harmony_generation_walks_the_wheel() {
    let (app, by_path) = analysed_app().await;
    let seed = app
        .library_dir
        .path()
        .join("t1.wav")
        .canonicalize()
        .unwrap();

    let playlist = generate_and_fetch(
        &app,
        json!({
            "preset_name": "peak_time",
            "custom_rules": strict_rules(),
            "target_duration_minutes": 20.0,
            "seed": seed,
        }),
    )
    .await;

    let tracks = playlist["tracks"].as_array().unwrap();
    assert!(!tracks.is_empty());

    let sequence: Vec<(String, f64)> = tracks
        .iter()
        .map(|t| by_path[t["path"].as_str().unwrap()].clone())
        .collect();
    assert_eq!(sequence[0].0, "8A", "seed must open the set");
    assert_eq!(tracks[0]["transition_score"], 0.0);

    for pair in sequence.windows(2) {
        let u: cueflow_common::theory::Camelot = pair[0].0.parse().unwrap();
        let v: cueflow_common::theory::Camelot = pair[1].0.parse().unwrap();
        assert!(
            u.compatibility(&v) > 0.0,
            "{} -> {} breaks harmonic strictness",
            pair[0].0,
            pair[1].0
        );
        assert!(
            (pair[0].1 - pair[1].1).abs() <= 3.0,
            "{} -> {} BPM exceeds the jump limit",
            pair[0].1,
            pair[1].1
        );
    }

    // 20 minutes cannot be assembled from the 15-minute feasible chain.
    assert_eq!(playlist["metadata"]["truncated"], true);
    assert_eq!(playlist["metadata"]["empty"], false);
}

#[tokio::test]
async fn test_target_duration_reached() {
    let (app, _) = analysed_app().await;
    let seed = app
        .library_dir
        .path()
        .join("t1.wav")
        .canonicalize()
        .unwrap();

    let playlist = generate_and_fetch(
        &app,
        json!({
            "preset_name": "peak_time",
            "custom_rules": strict_rules(),
            "target_duration_minutes": 10.0,
            "seed": seed,
        }),
    )
    .await;

    assert_eq!(playlist["metadata"]["truncated"], false);
    assert_eq!(playlist["tracks"].as_array().unwrap().len(), 2);
    assert!(playlist["metadata"]["total_duration_seconds"].as_f64().unwrap() >= 600.0);
}

#[tokio::test]
async fn test_no_feasible_playlist_completes_empty() {
    let (app, _) = analysed_app().await;

    let mut rules = strict_rules();
    rules["bpm_range"] = json!({"min": 200.0, "max": 210.0});
    let playlist = generate_and_fetch(
        &app,
        json!({
            "preset_name": "peak_time",
            "custom_rules": rules,
            "target_duration_minutes": 20.0,
        }),
    )
    .await;

    assert_eq!(playlist["tracks"].as_array().unwrap().len(), 0);
    assert_eq!(playlist["metadata"]["empty"], true);
}

#[tokio::test]
async fn test_result_for_unknown_task_is_not_found() {
    let (app, _) = analysed_app().await;

    let missing = uuid::Uuid::now_v7();
    let (status, body) = get_json(
        &app.router,
        &format!("/api/playlists/generate/{missing}/result"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_generated_playlist_exports_as_m3u() {
    let (app, _) = analysed_app().await;
    let seed = app
        .library_dir
        .path()
        .join("t1.wav")
        .canonicalize()
        .unwrap();

    let playlist = generate_and_fetch(
        &app,
        json!({
            "preset_name": "peak_time",
            "custom_rules": strict_rules(),
            "target_duration_minutes": 10.0,
            "seed": seed,
        }),
    )
    .await;
    let track_count = playlist["tracks"].as_array().unwrap().len();

    let (status, exported) = post_json(
        &app.router,
        "/api/playlists/export",
        json!({
            "playlist_data": playlist,
            "format_type": "m3u",
            "filename": "wheel-walk",
            "include_metadata": true,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{exported}");

    let written = std::fs::read_to_string(exported["path"].as_str().unwrap()).unwrap();
    let path_lines = written
        .lines()
        .filter(|l| !l.starts_with('#') && !l.is_empty())
        .count();
    assert_eq!(path_lines, track_count);
}

#[tokio::test]
async fn test_pool_restriction_to_listed_tracks() {
    let (app, by_path) = analysed_app().await;

    // Only the two 126 BPM tracks are eligible.
    let eligible: Vec<String> = by_path
        .iter()
        .filter(|(_, (_, bpm))| *bpm == 126.0)
        .map(|(path, _)| path.clone())
        .collect();
    assert_eq!(eligible.len(), 2);

    let playlist = generate_and_fetch(
        &app,
        json!({
            "preset_name": "journey",
            "track_file_paths": eligible,
            "target_duration_minutes": 5.0,
        }),
    )
    .await;

    for track in playlist["tracks"].as_array().unwrap() {
        let (_, bpm) = &by_path[track["path"].as_str().unwrap()];
        assert_eq!(*bpm, 126.0);
    }
}
