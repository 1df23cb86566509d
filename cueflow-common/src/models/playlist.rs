//! Playlist and preset data model

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Number of samples in a target energy curve
pub const ENERGY_CURVE_LEN: usize = 16;

/// Inclusive numeric range used for BPM and energy bounds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundedRange {
    pub min: f64,
    pub max: f64,
}

impl BoundedRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Named target-curve descriptors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurveShape {
    Flat,
    Buildup,
    PeakValley,
    Wave,
    Cooldown,
}

impl CurveShape {
    /// Render the descriptor as its 16-sample curve, values in `[0, 1]`
    pub fn samples(&self) -> [f64; ENERGY_CURVE_LEN] {
        let mut curve = [0.0; ENERGY_CURVE_LEN];
        for (i, slot) in curve.iter_mut().enumerate() {
            let x = i as f64 / (ENERGY_CURVE_LEN - 1) as f64;
            *slot = match self {
                CurveShape::Flat => 0.6,
                CurveShape::Buildup => 0.3 + 0.65 * x,
                CurveShape::Cooldown => 0.95 - 0.65 * x,
                CurveShape::Wave => 0.6 + 0.25 * (x * std::f64::consts::TAU).sin(),
                CurveShape::PeakValley => {
                    // Rise to a peak a third in, dip mid-set, rise again
                    if x < 0.35 {
                        0.4 + (x / 0.35) * 0.5
                    } else if x < 0.65 {
                        0.9 - ((x - 0.35) / 0.3) * 0.4
                    } else {
                        0.5 + ((x - 0.65) / 0.35) * 0.35
                    }
                }
            };
        }
        curve
    }
}

/// Scoring weights for playlist transitions.
///
/// Defaults are the engine's published weighting; presets may override, and
/// overrides are re-normalised so the components always sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub harmony: f64,
    pub bpm: f64,
    pub energy: f64,
    pub mood: f64,
    pub freshness: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            harmony: 0.30,
            bpm: 0.20,
            energy: 0.30,
            mood: 0.15,
            freshness: 0.05,
        }
    }
}

impl ScoringWeights {
    /// Scale so the components sum to 1.0; a degenerate vector falls back to
    /// the defaults.
    pub fn normalised(self) -> Self {
        let sum = self.harmony + self.bpm + self.energy + self.mood + self.freshness;
        if sum <= f64::EPSILON || !sum.is_finite() {
            return Self::default();
        }
        Self {
            harmony: self.harmony / sum,
            bpm: self.bpm / sum,
            energy: self.energy / sum,
            mood: self.mood / sum,
            freshness: self.freshness / sum,
        }
    }
}

/// Declarative playlist generation rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub bpm_range: BoundedRange,
    pub energy_range: BoundedRange,
    /// Explicit 16-sample curve; takes precedence over `energy_curve`
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub target_energy_curve: Option<Vec<f64>>,
    /// Named curve descriptor, used when no explicit curve is given
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub energy_curve: Option<CurveShape>,
    pub harmony_strictness: f64,
    pub mood_consistency: f64,
    pub max_bpm_jump: f64,
    pub avoid_same_artist_window: usize,
    pub min_track_duration: f64,
    pub max_track_duration: f64,
    #[serde(default)]
    pub weights: ScoringWeights,
}

impl Preset {
    /// Check ranges and curve shape before the engine consumes the preset.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidArgument("preset name is empty".to_string()));
        }
        if self.bpm_range.min > self.bpm_range.max {
            return Err(Error::InvalidArgument(format!(
                "preset {}: bpm_range min > max",
                self.name
            )));
        }
        if self.energy_range.min > self.energy_range.max {
            return Err(Error::InvalidArgument(format!(
                "preset {}: energy_range min > max",
                self.name
            )));
        }
        for (name, value) in [
            ("harmony_strictness", self.harmony_strictness),
            ("mood_consistency", self.mood_consistency),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::InvalidArgument(format!(
                    "preset {}: {name} out of range: {value}",
                    self.name
                )));
            }
        }
        if self.max_bpm_jump <= 0.0 {
            return Err(Error::InvalidArgument(format!(
                "preset {}: max_bpm_jump must be positive",
                self.name
            )));
        }
        if let Some(curve) = &self.target_energy_curve {
            if curve.len() != ENERGY_CURVE_LEN {
                return Err(Error::InvalidArgument(format!(
                    "preset {}: target_energy_curve must have {ENERGY_CURVE_LEN} samples, got {}",
                    self.name,
                    curve.len()
                )));
            }
            if curve.iter().any(|v| !(0.0..=1.0).contains(v)) {
                return Err(Error::InvalidArgument(format!(
                    "preset {}: target_energy_curve sample out of [0, 1]",
                    self.name
                )));
            }
        }
        Ok(())
    }

    /// The 16-sample curve the engine scores against: explicit curve first,
    /// then the named descriptor, then flat.
    pub fn resolved_curve(&self) -> [f64; ENERGY_CURVE_LEN] {
        if let Some(curve) = &self.target_energy_curve {
            if curve.len() == ENERGY_CURVE_LEN {
                let mut out = [0.0; ENERGY_CURVE_LEN];
                out.copy_from_slice(curve);
                return out;
            }
        }
        self.energy_curve.unwrap_or(CurveShape::Flat).samples()
    }
}

/// One position in a generated playlist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistEntry {
    pub path: PathBuf,
    /// Transition quality from the previous track; 0 for the first position
    pub transition_score: f64,
}

/// Playlist-level aggregates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistMetadata {
    pub total_duration_seconds: f64,
    pub avg_bpm: f64,
    /// Realised energy curve, resampled to 16 points
    pub energy_curve: Vec<f64>,
    /// Preset the playlist was generated with
    pub preset: String,
    /// Effective generation parameters, for reproducibility
    pub parameters: serde_json::Value,
    /// True when the beam exhausted before reaching the target duration
    #[serde(default)]
    pub truncated: bool,
    /// True when no feasible first track existed
    #[serde(default)]
    pub empty: bool,
}

/// An ordered, immutable sequence of track references
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub tracks: Vec<PlaylistEntry>,
    pub metadata: PlaylistMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preset() -> Preset {
        Preset {
            name: "test".to_string(),
            description: String::new(),
            bpm_range: BoundedRange::new(120.0, 132.0),
            energy_range: BoundedRange::new(0.0, 1.0),
            target_energy_curve: None,
            energy_curve: Some(CurveShape::Buildup),
            harmony_strictness: 1.0,
            mood_consistency: 0.5,
            max_bpm_jump: 3.0,
            avoid_same_artist_window: 2,
            min_track_duration: 0.0,
            max_track_duration: f64::MAX,
            weights: ScoringWeights::default(),
        }
    }

    #[test]
    fn test_curve_shapes_stay_in_range() {
        for shape in [
            CurveShape::Flat,
            CurveShape::Buildup,
            CurveShape::PeakValley,
            CurveShape::Wave,
            CurveShape::Cooldown,
        ] {
            for v in shape.samples() {
                assert!((0.0..=1.0).contains(&v), "{shape:?} sample {v} out of range");
            }
        }
    }

    #[test]
    fn test_buildup_rises_and_cooldown_falls() {
        let buildup = CurveShape::Buildup.samples();
        assert!(buildup[ENERGY_CURVE_LEN - 1] > buildup[0]);
        let cooldown = CurveShape::Cooldown.samples();
        assert!(cooldown[ENERGY_CURVE_LEN - 1] < cooldown[0]);
    }

    #[test]
    fn test_default_weights_sum_to_one() {
        let w = ScoringWeights::default();
        let sum = w.harmony + w.bpm + w.energy + w.mood + w.freshness;
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_weight_normalisation() {
        let w = ScoringWeights {
            harmony: 2.0,
            bpm: 2.0,
            energy: 2.0,
            mood: 2.0,
            freshness: 2.0,
        }
        .normalised();
        assert!((w.harmony - 0.2).abs() < 1e-9);
        let degenerate = ScoringWeights {
            harmony: 0.0,
            bpm: 0.0,
            energy: 0.0,
            mood: 0.0,
            freshness: 0.0,
        }
        .normalised();
        assert_eq!(degenerate, ScoringWeights::default());
    }

    #[test]
    fn test_preset_validation() {
        preset().validate().unwrap();

        let mut bad = preset();
        bad.bpm_range = BoundedRange::new(140.0, 120.0);
        assert!(bad.validate().is_err());

        let mut bad = preset();
        bad.harmony_strictness = 1.5;
        assert!(bad.validate().is_err());

        let mut bad = preset();
        bad.target_energy_curve = Some(vec![0.5; 7]);
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_explicit_curve_wins_over_named() {
        let mut p = preset();
        p.target_energy_curve = Some(vec![0.42; ENERGY_CURVE_LEN]);
        assert_eq!(p.resolved_curve()[0], 0.42);
    }
}
