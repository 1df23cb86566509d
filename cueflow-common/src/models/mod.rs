//! Domain data model shared by every cueflow component

mod playlist;
mod task;
mod track;

pub use playlist::{
    BoundedRange, CurveShape, Playlist, PlaylistEntry, PlaylistMetadata, Preset, ScoringWeights,
    ENERGY_CURVE_LEN,
};
pub use task::{
    AnalysisSummary, Task, TaskError, TaskKind, TaskResult, TaskState, MAX_TASK_ERRORS,
};
pub use track::{
    CacheEntry, Confidence, EnergyPoint, Features, Track, TrackTags, ANALYSIS_VERSION,
};
