//! Error types for minion-core.

use thiserror::Error;

/// Result type for minion-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in minion-core.
#[derive(Debug, Error)]
pub enum Error {
    /// The build command could not be started.
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// A caller-supplied regular expression failed to compile.
    #[error("malformed pattern `{pattern}`: {source}")]
    MalformedPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// The request cannot be executed as given (e.g. an empty command).
    #[error("invalid build request: {0}")]
    InvalidRequest(String),

    /// The orchestrator worker has been shut down.
    #[error("build worker is not running")]
    WorkerUnavailable,

    /// Invalid configuration value.
    #[error("configuration error: {0}")]
    Config(String),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Render the error together with a short recovery hint.
    pub fn with_hint(&self) -> String {
        let hint = match self {
            Error::Spawn { source, .. } if source.kind() == std::io::ErrorKind::NotFound => {
                Some("check that the executable is on PATH and the working directory exists")
            }
            Error::Spawn { .. } => None,
            Error::MalformedPattern { .. } => {
                Some("patterns use Rust `regex` syntax; escape literal brackets and dots")
            }
            Error::InvalidRequest(_) => Some("a build needs at least a program name"),
            Error::WorkerUnavailable => Some("the session was shut down; create a new one"),
            Error::Config(_) | Error::Json(_) => Some("see the build config documentation"),
            Error::Io(_) => None,
        };

        match hint {
            Some(hint) => format!("{self}\n  hint: {hint}"),
            None => self.to_string(),
        }
    }
}

/// Navigation outcomes that are reported as status messages rather than errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NavigationError {
    /// The diagnostic list has no entries.
    #[error("No more errors")]
    EmptyList,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_error_hint() {
        let err = Error::Spawn {
            command: "nope".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        let rendered = err.with_hint();
        assert!(rendered.starts_with("failed to start `nope`"));
        assert!(rendered.contains("hint: check that the executable is on PATH"));
    }

    #[test]
    fn test_io_error_has_no_hint() {
        let err = Error::from(std::io::Error::other("boom"));
        assert_eq!(err.with_hint(), "IO error: boom");
    }

    #[test]
    fn test_empty_list_message() {
        assert_eq!(NavigationError::EmptyList.to_string(), "No more errors");
    }
}
