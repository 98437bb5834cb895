//! Error types for the calltree library
//!
//! Unresolved symbols are not errors: the renderer prunes or placeholders
//! them. Everything here is a genuine I/O, parse or configuration failure.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while configuring, replaying or reporting a profile
#[derive(Error, Debug)]
pub enum ProfilerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize report: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to parse config: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidSetting { key: String, value: String },

    #[error("Invalid event log line {line}: {reason}")]
    EventParse { line: usize, reason: String },

    #[error("Invalid symbol map line {line}: {reason}")]
    SymbolMapParse { line: usize, reason: String },

    #[error("Failed to load symbols from {}: {reason}", path.display())]
    SymbolLoad { path: PathBuf, reason: String },
}

/// Result type for calltree operations
pub type Result<T> = std::result::Result<T, ProfilerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_parse_message_includes_line() {
        let err = ProfilerError::EventParse {
            line: 7,
            reason: "unknown event kind 'jump'".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid event log line 7: unknown event kind 'jump'"
        );
    }

    #[test]
    fn test_symbol_load_message_includes_path() {
        let err = ProfilerError::SymbolLoad {
            path: PathBuf::from("/tmp/missing"),
            reason: "binary does not exist".to_string(),
        };
        assert!(err.to_string().contains("/tmp/missing"));
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: ProfilerError = io.into();
        assert!(matches!(err, ProfilerError::Io(_)));
    }
}
