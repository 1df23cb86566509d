//! Constraint-directed playlist sequencing
//!
//! Bounded beam search over the candidate pool: every step extends each
//! partial playlist by every feasible candidate, keeps the top-W by
//! cumulative score, and stops when the running duration reaches the target
//! or nothing feasible remains. Ties break on smaller BPM delta, then larger
//! harmony, then lexicographic path, so generation is deterministic for a
//! fixed seed.

use std::path::PathBuf;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use cueflow_common::ids::{new_sortable_id, seed_for_step};
use cueflow_common::models::{
    Playlist, PlaylistEntry, PlaylistMetadata, Preset, Track, ENERGY_CURVE_LEN,
};
use cueflow_common::{Error, Result};

use super::scoring::{Candidate, Scorer};

/// Default beam width
pub const DEFAULT_BEAM_WIDTH: usize = 8;

/// One generation request, fully resolved
#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub preset: Preset,
    pub target_duration_seconds: f64,
    pub seed_track: Option<PathBuf>,
    /// Mixes a uniform perturbation into candidate ranking, `[0, 1]`
    pub surprise: f64,
    pub beam_width: usize,
    /// Seeds the surprise RNG so a rerun reproduces the same sequence
    pub run_id: Uuid,
}

/// A partial playlist on the beam
#[derive(Debug, Clone)]
struct Partial {
    indices: Vec<usize>,
    /// Unperturbed transition score per position (0 for the first)
    scores: Vec<f64>,
    cumulative: f64,
    duration: f64,
    /// Reached the target duration or ran out of extensions
    exhausted: bool,
}

impl Partial {
    fn last(&self) -> usize {
        *self.indices.last().expect("partials are never empty")
    }
}

/// Generate a playlist from the pool. Returns `None` when cancellation
/// aborted the search (observed once per beam step).
pub fn generate(
    tracks: &[Track],
    params: &GenerationParams,
    cancel: &CancellationToken,
) -> Result<Option<Playlist>> {
    let preset = &params.preset;
    preset.validate()?;

    let mut candidates: Vec<Candidate> = tracks
        .iter()
        .filter_map(Candidate::from_track)
        .filter(|c| {
            preset.bpm_range.contains(c.bpm)
                && preset.energy_range.contains(c.energy)
                && c.duration_seconds >= preset.min_track_duration
                && c.duration_seconds <= preset.max_track_duration
        })
        .collect();
    candidates.sort_by(|a, b| a.path.cmp(&b.path));

    // The seed track is pinned to the first position even when it falls
    // outside the preset's ranges; the caller asked for it explicitly.
    let seed_index = match &params.seed_track {
        Some(seed_path) => {
            let position = candidates.iter().position(|c| &c.path == seed_path);
            match position {
                Some(idx) => Some(idx),
                None => {
                    let track = tracks
                        .iter()
                        .find(|t| &t.path == seed_path)
                        .ok_or_else(|| {
                            Error::NotFound(format!(
                                "seed track not in library: {}",
                                seed_path.display()
                            ))
                        })?;
                    let candidate = Candidate::from_track(track).ok_or_else(|| {
                        Error::NotFound(format!(
                            "seed track not analysed: {}",
                            seed_path.display()
                        ))
                    })?;
                    candidates.push(candidate);
                    Some(candidates.len() - 1)
                }
            }
        }
        None => None,
    };

    let target = if params.target_duration_seconds > 0.0 {
        params.target_duration_seconds
    } else {
        3600.0
    };

    if candidates.is_empty() {
        return Ok(Some(empty_playlist(params)));
    }

    let mean_duration = candidates
        .iter()
        .map(|c| c.duration_seconds)
        .sum::<f64>()
        / candidates.len() as f64;
    let expected_len = (target / mean_duration.max(1.0)).round().max(1.0) as usize;
    let scorer = Scorer::new(preset, expected_len);
    let beam_width = params.beam_width.max(1);
    let surprise = params.surprise.clamp(0.0, 1.0);

    // Opening position.
    let mut beam: Vec<Partial> = match seed_index {
        Some(idx) => vec![Partial {
            indices: vec![idx],
            scores: vec![0.0],
            cumulative: scorer.opening(&candidates[idx]),
            duration: candidates[idx].duration_seconds,
            exhausted: false,
        }],
        None => {
            let mut rng = StdRng::seed_from_u64(seed_for_step(&params.run_id, 0));
            let mut openers: Vec<(usize, f64)> = candidates
                .iter()
                .enumerate()
                .map(|(idx, c)| {
                    let base = scorer.opening(c);
                    (idx, perturb(base, surprise, &mut rng))
                })
                .collect();
            openers.sort_by(|a, b| {
                b.1.partial_cmp(&a.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| candidates[a.0].path.cmp(&candidates[b.0].path))
            });
            openers
                .into_iter()
                .take(beam_width)
                .map(|(idx, score)| Partial {
                    indices: vec![idx],
                    scores: vec![0.0],
                    cumulative: score,
                    duration: candidates[idx].duration_seconds,
                    exhausted: false,
                })
                .collect()
        }
    };

    // Beam extension. Bounded by the pool size: a playlist can never be
    // longer than the number of distinct candidates.
    for step in 1..=candidates.len() {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        for partial in beam.iter_mut() {
            if partial.duration >= target {
                partial.exhausted = true;
            }
        }
        if beam.iter().all(|p| p.exhausted) {
            break;
        }

        let mut rng = StdRng::seed_from_u64(seed_for_step(&params.run_id, step as u64));
        // (beam idx, candidate idx, base score, perturbed cumulative)
        let mut extensions: Vec<(usize, usize, f64, f64)> = Vec::new();
        let mut dead_ends: Vec<usize> = Vec::new();
        for (beam_idx, partial) in beam.iter().enumerate() {
            if partial.exhausted {
                continue;
            }
            let last = &candidates[partial.last()];
            let chosen_paths: Vec<&PathBuf> = partial
                .indices
                .iter()
                .map(|&i| &candidates[i].path)
                .collect();
            let window = preset.avoid_same_artist_window.min(partial.indices.len());
            let recent_artists: Vec<&str> = partial.indices[partial.indices.len() - window..]
                .iter()
                .filter_map(|&i| candidates[i].artist.as_deref())
                .collect();

            let mut found = false;
            for (cand_idx, candidate) in candidates.iter().enumerate() {
                if !scorer.feasible(last, candidate, &chosen_paths, &recent_artists) {
                    continue;
                }
                found = true;
                let base = scorer.transition(last, candidate, partial.indices.len());
                let perturbed = perturb(base, surprise, &mut rng);
                extensions.push((beam_idx, cand_idx, base, partial.cumulative + perturbed));
            }
            if !found {
                // Nothing feasible from here; the partial is final as-is.
                dead_ends.push(beam_idx);
            }
        }
        for beam_idx in dead_ends {
            beam[beam_idx].exhausted = true;
        }

        if extensions.is_empty() {
            for partial in beam.iter_mut() {
                partial.exhausted = true;
            }
            break;
        }

        // Rank: cumulative first, then the published tie-breakers.
        extensions.sort_by(|a, b| {
            let (a_beam, a_cand, _, a_cum) = *a;
            let (b_beam, b_cand, _, b_cum) = *b;
            b_cum
                .partial_cmp(&a_cum)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    let a_jump =
                        (candidates[beam[a_beam].last()].bpm - candidates[a_cand].bpm).abs();
                    let b_jump =
                        (candidates[beam[b_beam].last()].bpm - candidates[b_cand].bpm).abs();
                    a_jump
                        .partial_cmp(&b_jump)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| {
                    let a_last = &candidates[beam[a_beam].last()];
                    let b_last = &candidates[beam[b_beam].last()];
                    let a_harmony = scorer.harmony(a_last, &candidates[a_cand]);
                    let b_harmony = scorer.harmony(b_last, &candidates[b_cand]);
                    b_harmony
                        .partial_cmp(&a_harmony)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| candidates[a_cand].path.cmp(&candidates[b_cand].path))
        });

        let stalled: Vec<Partial> = beam
            .iter()
            .filter(|p| p.exhausted)
            .cloned()
            .collect();
        let mut next_beam: Vec<Partial> = Vec::with_capacity(beam_width);
        for (beam_idx, cand_idx, base, cumulative) in extensions {
            if next_beam.len() >= beam_width {
                break;
            }
            let parent = &beam[beam_idx];
            let mut indices = parent.indices.clone();
            indices.push(cand_idx);
            let mut scores = parent.scores.clone();
            scores.push(base);
            let duration = parent.duration + candidates[cand_idx].duration_seconds;
            next_beam.push(Partial {
                indices,
                scores,
                cumulative,
                duration,
                exhausted: duration >= target,
            });
        }
        // Dead-ended partials stay in contention against the extended ones.
        next_beam.extend(stalled);
        next_beam.sort_by(|a, b| {
            b.cumulative
                .partial_cmp(&a.cumulative)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        next_beam.truncate(beam_width);
        beam = next_beam;
    }

    // Prefer a partial that actually reached the target; otherwise take the
    // best effort and flag truncation.
    let reached: Vec<&Partial> = beam.iter().filter(|p| p.duration >= target).collect();
    let (best, truncated) = if let Some(best) = reached.first() {
        (*best, false)
    } else {
        let best = beam
            .iter()
            .max_by(|a, b| {
                a.cumulative
                    .partial_cmp(&b.cumulative)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .expect("beam is non-empty");
        (best, true)
    };

    let entries: Vec<PlaylistEntry> = best
        .indices
        .iter()
        .zip(best.scores.iter())
        .map(|(&idx, &score)| PlaylistEntry {
            path: candidates[idx].path.clone(),
            transition_score: score,
        })
        .collect();
    let chosen: Vec<&Candidate> = best.indices.iter().map(|&i| &candidates[i]).collect();

    Ok(Some(Playlist {
        id: new_sortable_id(),
        created_at: Utc::now(),
        tracks: entries,
        metadata: PlaylistMetadata {
            total_duration_seconds: best.duration,
            avg_bpm: chosen.iter().map(|c| c.bpm).sum::<f64>() / chosen.len().max(1) as f64,
            energy_curve: resample_energy(&chosen),
            preset: preset.name.clone(),
            parameters: parameters_json(params),
            truncated,
            empty: false,
        },
    }))
}

fn perturb(base: f64, surprise: f64, rng: &mut StdRng) -> f64 {
    if surprise <= 0.0 {
        return base;
    }
    (1.0 - surprise) * base + surprise * rng.gen::<f64>()
}

fn empty_playlist(params: &GenerationParams) -> Playlist {
    Playlist {
        id: new_sortable_id(),
        created_at: Utc::now(),
        tracks: Vec::new(),
        metadata: PlaylistMetadata {
            total_duration_seconds: 0.0,
            avg_bpm: 0.0,
            energy_curve: Vec::new(),
            preset: params.preset.name.clone(),
            parameters: parameters_json(params),
            truncated: false,
            empty: true,
        },
    }
}

fn parameters_json(params: &GenerationParams) -> serde_json::Value {
    serde_json::json!({
        "target_duration_seconds": params.target_duration_seconds,
        "seed_track": params.seed_track.as_ref().map(|p| p.display().to_string()),
        "surprise": params.surprise,
        "beam_width": params.beam_width,
        "weights": params.preset.weights.normalised(),
    })
}

/// Resample the chosen tracks' energies to the 16-point metadata curve
fn resample_energy(chosen: &[&Candidate]) -> Vec<f64> {
    match chosen.len() {
        0 => Vec::new(),
        1 => vec![chosen[0].energy; ENERGY_CURVE_LEN],
        n => (0..ENERGY_CURVE_LEN)
            .map(|k| {
                let pos = k as f64 / (ENERGY_CURVE_LEN - 1) as f64 * (n - 1) as f64;
                let lo = pos.floor() as usize;
                let hi = pos.ceil() as usize;
                let frac = pos - lo as f64;
                chosen[lo].energy * (1.0 - frac) + chosen[hi.min(n - 1)].energy * frac
            })
            .collect(),
    }
}
