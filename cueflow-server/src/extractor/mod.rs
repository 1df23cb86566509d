//! Feature extraction boundary
//!
//! The core consumes extraction through the [`FeatureExtractor`] trait: a
//! synchronous, CPU-bound call that is safe from any worker. The built-in
//! implementation is [`SignalExtractor`] (symphonia decode + signal
//! analysis); tests inject stubs through the same trait object.
//!
//! Stability contract: two calls over the same byte content must agree within
//! ±0.1 BPM and ±0.01 energy. The cache relies on this to treat last-commit-
//! wins races as harmless.

mod decode;
mod signal;

pub use decode::DecodedAudio;
pub use signal::SignalExtractor;

use std::path::Path;
use std::time::Duration;

use thiserror::Error;

use cueflow_common::models::Features;

/// Extraction failure classes
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Container or codec the extractor cannot read
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The file decodes to garbage or not at all
    #[error("Corrupt file: {0}")]
    CorruptFile(String),

    /// The per-file analysis budget was exceeded
    #[error("Extraction timed out: {0}")]
    Timeout(String),

    /// Anything else; callers treat this as a bug, not bad input
    #[error("Extractor internal error: {0}")]
    Internal(String),
}

impl ExtractError {
    /// Whether a retry can plausibly succeed. A timeout already consumed the
    /// whole per-file budget; repeating it would not.
    pub fn is_transient(&self) -> bool {
        matches!(self, ExtractError::Internal(_))
    }
}

impl From<ExtractError> for cueflow_common::Error {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::UnsupportedFormat(msg) => cueflow_common::Error::UnsupportedFormat(msg),
            ExtractError::CorruptFile(msg) => cueflow_common::Error::CorruptFile(msg),
            ExtractError::Timeout(msg) => cueflow_common::Error::Timeout(msg),
            ExtractError::Internal(msg) => cueflow_common::Error::Internal(msg),
        }
    }
}

/// Per-call extraction options
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Hard budget for one file; exceeding it yields [`ExtractError::Timeout`]
    pub analysis_timeout: Duration,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            analysis_timeout: Duration::from_secs(300),
        }
    }
}

/// What an extraction call produces
#[derive(Debug, Clone)]
pub struct Extraction {
    pub features: Features,
    pub duration_seconds: f64,
    pub sample_rate: Option<u32>,
}

/// The extraction boundary the worker pool drives
pub trait FeatureExtractor: Send + Sync {
    /// Analyse one file. Synchronous and CPU-bound; callers run it on the
    /// blocking pool and must tolerate it running to completion after cancel.
    fn extract(&self, path: &Path, options: &ExtractOptions) -> Result<Extraction, ExtractError>;
}
