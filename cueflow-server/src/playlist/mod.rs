//! Playlist generation: presets, transition scoring, beam search

mod engine;
mod presets;
mod scoring;

pub use engine::{generate, GenerationParams, DEFAULT_BEAM_WIDTH};
pub use presets::{builtin_presets, find_preset, load_presets};
pub use scoring::{Candidate, Scorer};
