//! Track and feature data model
//!
//! A `Track` is the library unit: filesystem identity plus embedded tags plus
//! (once analysed) the extracted `Features`. Features are immutable after the
//! cache entry is written.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::mood::{Mood, MoodScores};
use crate::theory::{Camelot, MusicalKey};

/// Engine analysis version. Bumping it invalidates every cache entry written
/// under a lower version.
pub const ANALYSIS_VERSION: u32 = 1;

/// Embedded tags, when readable. Missing tags are absent, never empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackTags {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub artist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub album: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub year: Option<u32>,
}

/// One sample of the energy time series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnergyPoint {
    /// Seconds from track start
    pub t: f64,
    /// Energy in `[0, 1]`
    pub v: f64,
}

/// Per-field extraction confidence, each in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Confidence {
    pub bpm: f64,
    pub key: f64,
    pub energy: f64,
    pub mood: f64,
}

impl Default for Confidence {
    fn default() -> Self {
        Self {
            bpm: 0.0,
            key: 0.0,
            energy: 0.0,
            mood: 0.0,
        }
    }
}

/// Extracted audio features, immutable once written to the cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Features {
    /// Tempo, `[40, 240]`; values outside that range fail analysis
    pub bpm: f64,
    /// Musical key, e.g. `Am`, `C#`
    pub key: MusicalKey,
    /// Camelot slot; always agrees with `key`
    pub camelot: Camelot,
    pub energy: f64,
    pub valence: f64,
    pub danceability: f64,
    pub acousticness: f64,
    pub instrumentalness: f64,
    /// Dominant mood tag
    pub mood: Mood,
    /// Per-tag mood scores, summing to 1.0
    pub mood_scores: MoodScores,
    /// Ordered `(t, v)` samples covering `[0, duration]`, at least 8 of them
    pub energy_timeseries: Vec<EnergyPoint>,
    /// Sampling stride used for the time series, seconds
    pub stride_seconds: f64,
    pub confidence: Confidence,
}

impl Features {
    /// Validate the invariants the store enforces at write time.
    pub fn validate(&self, duration_seconds: f64) -> Result<()> {
        if !(40.0..=240.0).contains(&self.bpm) {
            return Err(Error::Internal(format!(
                "bpm out of range: {:.2}",
                self.bpm
            )));
        }
        for (name, value) in [
            ("energy", self.energy),
            ("valence", self.valence),
            ("danceability", self.danceability),
            ("acousticness", self.acousticness),
            ("instrumentalness", self.instrumentalness),
            ("confidence.bpm", self.confidence.bpm),
            ("confidence.key", self.confidence.key),
            ("confidence.energy", self.confidence.energy),
            ("confidence.mood", self.confidence.mood),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Internal(format!("{name} out of range: {value}")));
            }
        }
        if self.key.camelot() != self.camelot {
            return Err(Error::Internal(format!(
                "key {} does not agree with camelot {}",
                self.key, self.camelot
            )));
        }
        if self.energy_timeseries.len() < 8 {
            return Err(Error::Internal(format!(
                "energy time series too short: {} points",
                self.energy_timeseries.len()
            )));
        }
        let mut last_t = f64::NEG_INFINITY;
        for point in &self.energy_timeseries {
            if point.t < last_t {
                return Err(Error::Internal(
                    "energy time series timestamps not monotonic".to_string(),
                ));
            }
            if !(0.0..=1.0).contains(&point.v) {
                return Err(Error::Internal(format!(
                    "energy sample out of range: {}",
                    point.v
                )));
            }
            last_t = point.t;
        }
        let first = self.energy_timeseries.first().map(|p| p.t).unwrap_or(0.0);
        let last = self.energy_timeseries.last().map(|p| p.t).unwrap_or(0.0);
        if first > 1e-6 || last + self.stride_seconds < duration_seconds {
            return Err(Error::Internal(format!(
                "energy time series does not cover [0, {duration_seconds:.2}]: [{first:.2}, {last:.2}]"
            )));
        }
        Ok(())
    }
}

/// On-disk cache entry: the features plus the identity they were computed for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Leading 64 bits of SHA-256 over the file bytes, lowercase hex
    pub content_id: String,
    /// The path the entry was written for; the path index is authoritative
    pub path_at_write: PathBuf,
    pub file_size: u64,
    /// Modification time, Unix seconds, as observed at write
    pub mtime: i64,
    pub analysis_version: u32,
    pub analysed_at: DateTime<Utc>,
    pub features: Features,
    /// Duration at analysis time, seconds
    pub duration_seconds: f64,
    /// Container format, lowercase extension
    pub format: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub bitrate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sample_rate: Option<u32>,
    #[serde(default)]
    pub tags: TrackTags,
}

impl CacheEntry {
    /// Assemble the query-facing track view for `path` from this entry.
    pub fn to_track(&self, path: &std::path::Path) -> Track {
        Track {
            path: path.to_path_buf(),
            content_id: Some(self.content_id.clone()),
            file_size: self.file_size,
            mtime: self.mtime,
            format: self.format.clone(),
            bitrate: self.bitrate,
            sample_rate: self.sample_rate,
            duration_seconds: self.duration_seconds,
            tags: self.tags.clone(),
            features: Some(self.features.clone()),
            analysed_at: Some(self.analysed_at),
        }
    }
}

/// The unit of the library as surfaced by queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub path: PathBuf,
    /// Hex content digest, present once computed
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub content_id: Option<String>,
    pub file_size: u64,
    /// Modification time, Unix seconds
    pub mtime: i64,
    /// Container format, lowercase extension (e.g. `flac`)
    pub format: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub bitrate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sample_rate: Option<u32>,
    pub duration_seconds: f64,
    #[serde(default)]
    pub tags: TrackTags,
    /// Absent until analysed
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub features: Option<Features>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub analysed_at: Option<DateTime<Utc>>,
}

impl Track {
    /// Display name: embedded title, else file stem
    pub fn display_name(&self) -> String {
        if let Some(title) = &self.tags.title {
            return title.clone();
        }
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}
