//! Configuration resolution
//!
//! Three tiers, highest first: command line / environment (via clap's `env`
//! bindings), an optional TOML bootstrap file, then compiled defaults. Every
//! knob is optional; a bare `cueflow-server` starts with a `./data` root on
//! 127.0.0.1:5740.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

use cueflow_common::{Error, Result};

/// Command line / environment arguments
#[derive(Debug, Parser, Default)]
#[command(name = "cueflow-server", about = "Music library analysis and playlist generation service")]
pub struct Args {
    /// Bind address
    #[arg(long, env = "HOST")]
    pub host: Option<String>,

    /// Bind port
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Root for cache, presets, and exports
    #[arg(long, env = "DATA_ROOT")]
    pub data_root: Option<PathBuf>,

    /// Default library location, informational for clients
    #[arg(long, env = "MUSIC_LIBRARY_PATH")]
    pub music_library_path: Option<PathBuf>,

    /// Analysis worker cap; effective workers are min(cpu count, this)
    #[arg(long, env = "MAX_WORKERS")]
    pub max_workers: Option<usize>,

    /// Largest file the scanner will accept, MiB
    #[arg(long, env = "MAX_FILE_SIZE_MB")]
    pub max_file_size_mb: Option<u64>,

    /// Cache entry time-to-live, days
    #[arg(long, env = "CACHE_TTL_DAYS")]
    pub cache_ttl_days: Option<i64>,

    /// Per-file extraction budget, seconds
    #[arg(long, env = "ANALYSIS_TIMEOUT_SEC")]
    pub analysis_timeout_sec: Option<u64>,

    /// Per-task playlist generation budget, seconds
    #[arg(long, env = "GENERATION_TIMEOUT_SEC")]
    pub generation_timeout_sec: Option<u64>,

    /// Verbose logging
    #[arg(long, env = "DEBUG")]
    pub debug: Option<bool>,

    /// Optional TOML bootstrap file supplying the same keys
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// TOML bootstrap file contents; every key optional
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub data_root: Option<PathBuf>,
    pub music_library_path: Option<PathBuf>,
    pub max_workers: Option<usize>,
    pub max_file_size_mb: Option<u64>,
    pub cache_ttl_days: Option<i64>,
    pub analysis_timeout_sec: Option<u64>,
    pub generation_timeout_sec: Option<u64>,
    pub debug: Option<bool>,
}

/// Fully resolved runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub data_root: PathBuf,
    pub music_library_path: Option<PathBuf>,
    /// Effective worker count, already clamped to the CPU count
    pub max_workers: usize,
    pub min_file_size_kb: u64,
    pub max_file_size_mb: u64,
    pub cache_ttl_days: i64,
    pub analysis_timeout: Duration,
    pub generation_timeout: Duration,
    pub task_ceiling: usize,
    pub debug: bool,
}

impl Config {
    /// Resolve arguments against the optional TOML file and the defaults.
    pub fn resolve(args: Args) -> Result<Self> {
        let toml_config = match &args.config {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|err| {
                    Error::InvalidArgument(format!(
                        "config file unreadable: {}: {err}",
                        path.display()
                    ))
                })?;
                toml::from_str::<TomlConfig>(&content).map_err(|err| {
                    Error::InvalidArgument(format!(
                        "config file invalid: {}: {err}",
                        path.display()
                    ))
                })?
            }
            None => TomlConfig::default(),
        };

        let worker_cap = args
            .max_workers
            .or(toml_config.max_workers)
            .unwrap_or(8)
            .max(1);
        let max_workers = worker_cap.min(num_cpus::get().max(1));

        let config = Self {
            host: args
                .host
                .or(toml_config.host)
                .unwrap_or_else(|| "127.0.0.1".to_string()),
            port: args.port.or(toml_config.port).unwrap_or(5740),
            data_root: args
                .data_root
                .or(toml_config.data_root)
                .unwrap_or_else(|| PathBuf::from("./data")),
            music_library_path: args.music_library_path.or(toml_config.music_library_path),
            max_workers,
            min_file_size_kb: 4,
            max_file_size_mb: args
                .max_file_size_mb
                .or(toml_config.max_file_size_mb)
                .unwrap_or(200)
                .max(1),
            cache_ttl_days: args
                .cache_ttl_days
                .or(toml_config.cache_ttl_days)
                .unwrap_or(30)
                .max(1),
            analysis_timeout: Duration::from_secs(
                args.analysis_timeout_sec
                    .or(toml_config.analysis_timeout_sec)
                    .unwrap_or(300)
                    .max(1),
            ),
            generation_timeout: Duration::from_secs(
                args.generation_timeout_sec
                    .or(toml_config.generation_timeout_sec)
                    .unwrap_or(60)
                    .max(1),
            ),
            task_ceiling: crate::services::DEFAULT_TASK_CEILING,
            debug: args.debug.or(toml_config.debug).unwrap_or(false),
        };
        Ok(config)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
