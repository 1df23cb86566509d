//! # cueflow Common Library
//!
//! Shared code for the cueflow service:
//! - Error taxonomy with stable wire codes
//! - Domain models (tracks, features, tasks, playlists, presets)
//! - Camelot wheel / musical key helpers
//! - Rule-based mood classification
//! - Task lifecycle event bus

pub mod error;
pub mod events;
pub mod ids;
pub mod models;
pub mod mood;
pub mod theory;

pub use error::{Error, Result};
pub use events::{EventBus, TaskEvent};
