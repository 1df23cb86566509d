//! Shared request/response helpers for the API surface

use std::fmt::Display;
use std::str::FromStr;

use serde::Serialize;
use uuid::Uuid;

use cueflow_common::{Error, Result};

/// Page size cap; larger requests are clamped, not rejected
pub const MAX_PER_PAGE: usize = 500;

pub fn default_page() -> usize {
    1
}

pub fn default_per_page() -> usize {
    50
}

pub fn default_true() -> bool {
    true
}

/// Parse a comma-separated filter value (`"8A,9A"`) into typed items.
pub fn parse_list<T>(raw: Option<&str>, what: &str) -> Result<Option<Vec<T>>>
where
    T: FromStr,
    T::Err: Display,
{
    let Some(raw) = raw else {
        return Ok(None);
    };
    let mut items = Vec::new();
    for part in raw.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        items.push(part.parse::<T>().map_err(|err| {
            Error::InvalidArgument(format!("bad {what} value {part:?}: {err}"))
        })?);
    }
    if items.is_empty() {
        return Ok(None);
    }
    Ok(Some(items))
}

/// Standard paginated envelope
#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
}

/// Where a client polls a submitted task
pub fn analysis_status_url(task_id: Uuid) -> String {
    format!("/api/analysis/{task_id}/status")
}

pub fn generation_status_url(task_id: Uuid) -> String {
    format!("/api/playlists/generate/{task_id}/status")
}

/// Rebuild a domain error from a stored task-error code, for result
/// endpoints that surface a failed task's cause.
pub fn error_from_code(code: &str, message: String) -> Error {
    match code {
        "invalid_argument" => Error::InvalidArgument(message),
        "not_found" => Error::NotFound(message),
        "conflict" => Error::Conflict(message),
        "busy" => Error::Busy(message),
        "unsupported_format" => Error::UnsupportedFormat(message),
        "corrupt_file" => Error::CorruptFile(message),
        "timeout" => Error::Timeout(message),
        _ => Error::Internal(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cueflow_common::theory::Camelot;

    #[test]
    fn test_parse_list() {
        let parsed: Option<Vec<Camelot>> = parse_list(Some("8A, 9A"), "camelot").unwrap();
        let slots: Vec<String> = parsed.unwrap().iter().map(|c| c.to_string()).collect();
        assert_eq!(slots, vec!["8A", "9A"]);

        assert!(parse_list::<Camelot>(Some("8A,13B"), "camelot").is_err());
        assert!(parse_list::<Camelot>(None, "camelot").unwrap().is_none());
        assert!(parse_list::<Camelot>(Some(" , "), "camelot")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_error_from_code_round_trips() {
        for code in [
            "invalid_argument",
            "not_found",
            "conflict",
            "busy",
            "unsupported_format",
            "corrupt_file",
            "timeout",
            "io_error",
            "internal",
        ] {
            let err = error_from_code(code, "msg".to_string());
            if code == "io_error" {
                // io_error has no message-only constructor; it degrades to
                // internal on the way back out.
                assert_eq!(err.code(), "internal");
            } else {
                assert_eq!(err.code(), code);
            }
        }
    }
}
