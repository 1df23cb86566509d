//! Audio file scanner
//!
//! Turns a scan request (directories + explicit files + pattern filters)
//! into a finite, de-duplicated, lexicographically ordered candidate list.
//! Roots are canonicalised once (resolving symlinks at the top), deeper
//! symlinks are not followed, and candidates are verified by magic bytes so
//! a renamed text file never reaches the extractor.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use cueflow_common::{Error, Result};

/// Extensions the pipeline accepts
pub const SUPPORTED_EXTENSIONS: [&str; 10] = [
    "mp3", "flac", "ogg", "oga", "m4a", "aac", "mp4", "wav", "opus", "wma",
];

/// Recursion bound for directory walks
pub const MAX_SCAN_DEPTH: usize = 32;

/// What to scan and how to filter it
#[derive(Debug, Clone, Default)]
pub struct ScanRequest {
    pub directories: Vec<PathBuf>,
    pub file_paths: Vec<PathBuf>,
    pub recursive: bool,
    /// File-name globs; empty means match everything
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
}

/// Non-fatal problem met while scanning
#[derive(Debug, Clone)]
pub struct ScanWarning {
    pub path: PathBuf,
    pub message: String,
}

/// The candidate stream plus everything that was skipped
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    /// Canonical paths, de-duplicated, lexicographic order
    pub files: Vec<PathBuf>,
    pub warnings: Vec<ScanWarning>,
    /// Canonicalised roots the walk covered, for later pruning
    pub roots: Vec<PathBuf>,
}

/// Audio file scanner
#[derive(Debug, Clone)]
pub struct Scanner {
    min_size_bytes: u64,
    max_size_bytes: u64,
}

impl Scanner {
    pub fn new(min_size_kb: u64, max_size_mb: u64) -> Self {
        Self {
            min_size_bytes: min_size_kb * 1024,
            max_size_bytes: max_size_mb * 1024 * 1024,
        }
    }

    /// Run the scan. A missing root fails the whole request; unreadable
    /// subdirectories and odd files become warnings.
    pub fn scan(&self, request: &ScanRequest) -> Result<ScanOutcome> {
        let mut outcome = ScanOutcome::default();
        let mut seen = BTreeSet::new();

        for dir in &request.directories {
            let root = dir.canonicalize().map_err(|err| {
                if err.kind() == std::io::ErrorKind::NotFound {
                    Error::NotFound(format!("scan root not found: {}", dir.display()))
                } else {
                    Error::Io(err)
                }
            })?;
            if !root.is_dir() {
                return Err(Error::InvalidArgument(format!(
                    "scan root is not a directory: {}",
                    dir.display()
                )));
            }
            self.walk_directory(&root, request, &mut seen, &mut outcome)?;
            outcome.roots.push(root);
        }

        for file in &request.file_paths {
            let canonical = file.canonicalize().map_err(|err| {
                if err.kind() == std::io::ErrorKind::NotFound {
                    Error::NotFound(format!("file not found: {}", file.display()))
                } else {
                    Error::Io(err)
                }
            })?;
            match self.qualify(&canonical, request) {
                Ok(true) => {
                    seen.insert(canonical);
                }
                Ok(false) => outcome.warnings.push(ScanWarning {
                    path: canonical,
                    message: "file does not qualify for analysis".to_string(),
                }),
                Err(err) => outcome.warnings.push(ScanWarning {
                    path: canonical,
                    message: err.to_string(),
                }),
            }
        }

        // BTreeSet gives the deterministic lexicographic order for free.
        outcome.files = seen.into_iter().collect();
        Ok(outcome)
    }

    fn walk_directory(
        &self,
        root: &Path,
        request: &ScanRequest,
        seen: &mut BTreeSet<PathBuf>,
        outcome: &mut ScanOutcome,
    ) -> Result<()> {
        // Non-recursive scans stop at the root's children; recursive walks go
        // one level past the limit so exceedance is detectable.
        let (depth_limit, walk_depth) = if request.recursive {
            (MAX_SCAN_DEPTH, MAX_SCAN_DEPTH + 1)
        } else {
            (1, 1)
        };

        let walker = WalkDir::new(root)
            .follow_links(false)
            .max_depth(walk_depth)
            .sort_by_file_name();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| root.to_path_buf());
                    tracing::warn!(path = %path.display(), error = %err, "scan entry skipped");
                    outcome.warnings.push(ScanWarning {
                        path,
                        message: err.to_string(),
                    });
                    continue;
                }
            };

            if entry.depth() > depth_limit {
                if entry.file_type().is_dir() {
                    return Err(Error::InvalidArgument(format!(
                        "directory tree too deep (limit {depth_limit}): {}",
                        entry.path().display()
                    )));
                }
                continue;
            }
            if !entry.file_type().is_file() {
                continue;
            }

            match self.qualify(entry.path(), request) {
                Ok(true) => {
                    seen.insert(entry.path().to_path_buf());
                }
                Ok(false) => {}
                Err(err) => outcome.warnings.push(ScanWarning {
                    path: entry.path().to_path_buf(),
                    message: err.to_string(),
                }),
            }
        }
        Ok(())
    }

    /// Candidate test: extension, size window, include/exclude patterns,
    /// then magic bytes.
    fn qualify(&self, path: &Path, request: &ScanRequest) -> Result<bool> {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return Ok(false);
        };
        if !SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()) {
            return Ok(false);
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !request.include_patterns.is_empty()
            && !request
                .include_patterns
                .iter()
                .any(|p| glob_match(p, &name))
        {
            return Ok(false);
        }
        if request.exclude_patterns.iter().any(|p| glob_match(p, &name)) {
            return Ok(false);
        }

        let size = std::fs::metadata(path)?.len();
        if size < self.min_size_bytes || size > self.max_size_bytes {
            return Ok(false);
        }

        verify_magic_bytes(path)
    }
}

/// Minimal glob: `*` matches any run, `?` matches one character.
fn glob_match(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();

    // Iterative wildcard matching with a single backtrack point.
    let (mut p, mut n) = (0usize, 0usize);
    let (mut star, mut star_n) = (None::<usize>, 0usize);
    while n < name.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == name[n]) {
            p += 1;
            n += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some(p);
            star_n = n;
            p += 1;
        } else if let Some(sp) = star {
            p = sp + 1;
            star_n += 1;
            n = star_n;
        } else {
            return false;
        }
    }
    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}

/// Verify the leading bytes look like a known audio container.
fn verify_magic_bytes(path: &Path) -> Result<bool> {
    let mut file = File::open(path)?;
    let mut buffer = [0u8; 12];
    let bytes_read = file.read(&mut buffer)?;
    if bytes_read < 4 {
        return Ok(false);
    }

    let is_audio = match &buffer[..bytes_read.min(12)] {
        // MP3 frame sync or ID3 tag
        [0xFF, 0xFB, ..] | [0xFF, 0xF3, ..] | [0xFF, 0xF2, ..] => true,
        [b'I', b'D', b'3', ..] => true,

        // FLAC
        [b'f', b'L', b'a', b'C', ..] => true,

        // OGG (Vorbis/Opus)
        [b'O', b'g', b'g', b'S', ..] => true,

        // M4A/AAC/MP4 container
        [_, _, _, _, b'f', b't', b'y', b'p', ..] => true,

        // WAV
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'A', b'V', b'E'] => true,

        // WMA (ASF header GUID prefix)
        [0x30, 0x26, 0xB2, 0x75, ..] => true,

        _ => false,
    };
    Ok(is_audio)
}
