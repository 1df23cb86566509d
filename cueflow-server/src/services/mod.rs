//! Long-running work: scanning, extraction workers, task lifecycle

pub mod analysis;
pub mod generation;
pub mod scanner;
pub mod task_manager;
pub mod worker_pool;

pub use scanner::{ScanOutcome, ScanRequest, ScanWarning, Scanner};
pub use task_manager::{TaskContext, TaskManager, DEFAULT_TASK_CEILING};
pub use worker_pool::{WorkerPool, WorkerPoolConfig};
