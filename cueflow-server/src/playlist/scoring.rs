//! Transition scoring
//!
//! Scores a candidate transition `u → v` as the weighted sum of harmonic
//! compatibility, BPM proximity, fit against the target energy curve, mood
//! continuity, and freshness. Weights come from the preset, re-normalised so
//! they always sum to 1.

use std::path::PathBuf;

use cueflow_common::models::{Preset, ScoringWeights, Track, ENERGY_CURVE_LEN};
use cueflow_common::mood::{mood_distance, Mood};
use cueflow_common::theory::Camelot;

/// The slice of a track the scorer needs, precomputed once per generation
#[derive(Debug, Clone)]
pub struct Candidate {
    pub path: PathBuf,
    pub artist: Option<String>,
    pub bpm: f64,
    pub energy: f64,
    pub camelot: Camelot,
    pub mood: Mood,
    pub duration_seconds: f64,
}

impl Candidate {
    /// Project a stored track down to scoring inputs. Tracks without
    /// features never reach the engine.
    pub fn from_track(track: &Track) -> Option<Self> {
        let features = track.features.as_ref()?;
        Some(Self {
            path: track.path.clone(),
            artist: track.tags.artist.clone(),
            bpm: features.bpm,
            energy: features.energy,
            camelot: features.camelot,
            mood: features.mood,
            duration_seconds: track.duration_seconds,
        })
    }
}

/// Scoring context shared across one generation run
#[derive(Debug, Clone)]
pub struct Scorer {
    weights: ScoringWeights,
    harmony_strictness: f64,
    mood_consistency: f64,
    max_bpm_jump: f64,
    curve: [f64; ENERGY_CURVE_LEN],
    /// Estimated final playlist length, for curve positioning
    expected_len: usize,
}

impl Scorer {
    pub fn new(preset: &Preset, expected_len: usize) -> Self {
        Self {
            weights: preset.weights.normalised(),
            harmony_strictness: preset.harmony_strictness.clamp(0.0, 1.0),
            mood_consistency: preset.mood_consistency.clamp(0.0, 1.0),
            max_bpm_jump: preset.max_bpm_jump,
            curve: preset.resolved_curve(),
            expected_len: expected_len.max(1),
        }
    }

    pub fn max_bpm_jump(&self) -> f64 {
        self.max_bpm_jump
    }

    /// Harmony component: wheel compatibility relaxed by strictness. At
    /// strictness 0 every key pairing passes at full score; at 1 the raw
    /// compatibility grade stands.
    pub fn harmony(&self, u: &Candidate, v: &Candidate) -> f64 {
        let compatibility = u.camelot.compatibility(&v.camelot);
        1.0 - self.harmony_strictness * (1.0 - compatibility)
    }

    /// BPM proximity, zero at and beyond the configured jump
    pub fn bpm(&self, u: &Candidate, v: &Candidate) -> f64 {
        (1.0 - (u.bpm - v.bpm).abs() / self.max_bpm_jump).max(0.0)
    }

    /// Fit of `v` against the target energy curve at `position`
    pub fn energy(&self, v: &Candidate, position: usize) -> f64 {
        let idx = ((position as f64 / self.expected_len as f64) * ENERGY_CURVE_LEN as f64)
            .floor() as usize;
        let target = self.curve[idx.min(ENERGY_CURVE_LEN - 1)];
        1.0 - (v.energy - target).abs()
    }

    /// Mood continuity: same primary mood is perfect, otherwise the fixed
    /// distance table scaled by the preset's consistency knob
    pub fn mood(&self, u: &Candidate, v: &Candidate) -> f64 {
        if u.mood == v.mood {
            1.0
        } else {
            1.0 - self.mood_consistency * mood_distance(u.mood, v.mood)
        }
    }

    /// Whether `u → v` may be taken at all. Repeats and same-artist runs are
    /// excluded; so are transitions past the BPM jump, and — once strictness
    /// saturates the harmony component to zero — harmonically dead pairs.
    pub fn feasible(
        &self,
        u: &Candidate,
        v: &Candidate,
        chosen_paths: &[&PathBuf],
        recent_artists: &[&str],
    ) -> bool {
        if chosen_paths.contains(&&v.path) {
            return false;
        }
        if let Some(artist) = v.artist.as_deref() {
            if recent_artists.contains(&artist) {
                return false;
            }
        }
        if (u.bpm - v.bpm).abs() > self.max_bpm_jump {
            return false;
        }
        self.harmony(u, v) > 1e-9
    }

    /// Freshness component of the score. Filtered candidates never get here,
    /// so a scored transition is fresh by construction.
    pub fn freshness(
        &self,
        v: &Candidate,
        chosen_paths: &[&PathBuf],
        recent_artists: &[&str],
    ) -> f64 {
        let stale = chosen_paths.contains(&&v.path)
            || v.artist
                .as_deref()
                .map(|artist| recent_artists.contains(&artist))
                .unwrap_or(false);
        if stale {
            0.0
        } else {
            1.0
        }
    }

    /// Full transition score for a feasible `u → v` at `position`
    pub fn transition(&self, u: &Candidate, v: &Candidate, position: usize) -> f64 {
        self.weights.harmony * self.harmony(u, v)
            + self.weights.bpm * self.bpm(u, v)
            + self.weights.energy * self.energy(v, position)
            + self.weights.mood * self.mood(u, v)
            + self.weights.freshness
    }

    /// Score for the opening position: energy fit only, the rest has no
    /// predecessor to relate to
    pub fn opening(&self, v: &Candidate) -> f64 {
        self.weights.energy * self.energy(v, 0)
            + self.weights.freshness
            + (self.weights.harmony + self.weights.bpm + self.weights.mood) * 0.5
    }
}
