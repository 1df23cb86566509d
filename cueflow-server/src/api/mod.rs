//! REST surface: handlers and DTOs

pub mod analysis;
pub mod health;
pub mod playlists;
pub mod sse;
pub mod tracks;
pub mod types;

pub use analysis::analysis_routes;
pub use health::health_routes;
pub use playlists::playlist_routes;
pub use sse::sse_routes;
pub use tracks::track_routes;
