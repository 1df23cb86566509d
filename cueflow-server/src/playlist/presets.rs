//! Preset catalogue
//!
//! Five presets ship compiled in; JSON files under `<data_root>/presets/`
//! extend or override them by name. Disk presets are validated on load and
//! skipped (with a warning) when malformed.

use std::collections::BTreeMap;
use std::path::Path;

use cueflow_common::models::{BoundedRange, CurveShape, Preset, ScoringWeights};
use cueflow_common::{Error, Result};

/// The compiled-in presets
pub fn builtin_presets() -> Vec<Preset> {
    let base = Preset {
        name: String::new(),
        description: String::new(),
        bpm_range: BoundedRange::new(40.0, 240.0),
        energy_range: BoundedRange::new(0.0, 1.0),
        target_energy_curve: None,
        energy_curve: Some(CurveShape::Flat),
        harmony_strictness: 0.7,
        mood_consistency: 0.5,
        max_bpm_jump: 8.0,
        avoid_same_artist_window: 3,
        min_track_duration: 60.0,
        max_track_duration: 900.0,
        weights: ScoringWeights::default(),
    };

    vec![
        Preset {
            name: "warmup".to_string(),
            description: "Low-energy opener that builds gently".to_string(),
            bpm_range: BoundedRange::new(90.0, 124.0),
            energy_range: BoundedRange::new(0.0, 0.7),
            energy_curve: Some(CurveShape::Buildup),
            harmony_strictness: 0.6,
            max_bpm_jump: 6.0,
            ..base.clone()
        },
        Preset {
            name: "peak_time".to_string(),
            description: "High-energy main-floor set".to_string(),
            bpm_range: BoundedRange::new(122.0, 140.0),
            energy_range: BoundedRange::new(0.5, 1.0),
            energy_curve: Some(CurveShape::PeakValley),
            harmony_strictness: 0.8,
            mood_consistency: 0.7,
            max_bpm_jump: 4.0,
            ..base.clone()
        },
        Preset {
            name: "cooldown".to_string(),
            description: "Wind the floor down after the peak".to_string(),
            bpm_range: BoundedRange::new(80.0, 126.0),
            energy_range: BoundedRange::new(0.0, 0.8),
            energy_curve: Some(CurveShape::Cooldown),
            harmony_strictness: 0.5,
            mood_consistency: 0.6,
            ..base.clone()
        },
        Preset {
            name: "wave".to_string(),
            description: "Alternating tension and release".to_string(),
            bpm_range: BoundedRange::new(100.0, 135.0),
            energy_range: BoundedRange::new(0.2, 1.0),
            energy_curve: Some(CurveShape::Wave),
            ..base.clone()
        },
        Preset {
            name: "journey".to_string(),
            description: "Long-arc set with loose harmonic reins".to_string(),
            bpm_range: BoundedRange::new(60.0, 180.0),
            energy_range: BoundedRange::new(0.0, 1.0),
            energy_curve: Some(CurveShape::Buildup),
            harmony_strictness: 0.4,
            mood_consistency: 0.3,
            max_bpm_jump: 12.0,
            ..base
        },
    ]
}

/// All presets by name: built-ins overlaid with whatever parses from
/// `presets_dir`.
pub fn load_presets(presets_dir: &Path) -> BTreeMap<String, Preset> {
    let mut presets: BTreeMap<String, Preset> = builtin_presets()
        .into_iter()
        .map(|preset| (preset.name.clone(), preset))
        .collect();

    let entries = match std::fs::read_dir(presets_dir) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::debug!(dir = %presets_dir.display(), error = %err, "no preset directory");
            return presets;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        match std::fs::read(&path)
            .map_err(Error::from)
            .and_then(|bytes| {
                serde_json::from_slice::<Preset>(&bytes)
                    .map_err(|err| Error::InvalidArgument(format!("preset parse failed: {err}")))
            })
            .and_then(|preset| preset.validate().map(|()| preset))
        {
            Ok(preset) => {
                tracing::debug!(name = %preset.name, path = %path.display(), "preset loaded");
                presets.insert(preset.name.clone(), preset);
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "skipping bad preset");
            }
        }
    }
    presets
}

/// Fetch one preset by name
pub fn find_preset(presets_dir: &Path, name: &str) -> Result<Preset> {
    load_presets(presets_dir)
        .remove(name)
        .ok_or_else(|| Error::NotFound(format!("preset not found: {name}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_validate() {
        let presets = builtin_presets();
        assert_eq!(presets.len(), 5);
        for preset in presets {
            preset.validate().unwrap();
        }
    }

    #[test]
    fn test_disk_preset_overrides_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let mut custom = builtin_presets().remove(0);
        assert_eq!(custom.name, "warmup");
        custom.max_bpm_jump = 2.5;
        std::fs::write(
            dir.path().join("warmup.json"),
            serde_json::to_vec(&custom).unwrap(),
        )
        .unwrap();

        let presets = load_presets(dir.path());
        assert_eq!(presets["warmup"].max_bpm_jump, 2.5);
        assert_eq!(presets.len(), 5);
    }

    #[test]
    fn test_malformed_disk_preset_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.json"), b"{oops").unwrap();
        let presets = load_presets(dir.path());
        assert_eq!(presets.len(), 5);
    }

    #[test]
    fn test_unknown_preset_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = find_preset(dir.path(), "nope").unwrap_err();
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn test_find_builtin_without_disk_dir() {
        let err_dir = Path::new("/nonexistent/presets");
        let preset = find_preset(err_dir, "peak_time").unwrap();
        assert_eq!(preset.name, "peak_time");
    }
}
