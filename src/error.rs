//! Error types for the Quicksilver HMR coordinator

use std::fmt;
use thiserror::Error;

/// Collaborator operations that can fail while a payload is being handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Applying a single module patch (`queueUpdate`)
    QueueUpdate,
    /// Removing pruned paths from the module cache
    PrunePaths,
    /// Running listeners registered for an event
    NotifyListeners,
    /// Re-importing an entrypoint after a full reload
    Import,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::QueueUpdate => write!(f, "queueUpdate"),
            Operation::PrunePaths => write!(f, "prunePaths"),
            Operation::NotifyListeners => write!(f, "notifyListeners"),
            Operation::Import => write!(f, "import"),
        }
    }
}

/// Main error type for the HMR coordinator
#[derive(Error, Debug)]
pub enum Error {
    /// Payload did not decode into any known variant
    #[error("ProtocolError: {0}")]
    Protocol(String),

    /// An external collaborator rejected an operation
    #[error("CollaboratorError: {operation} failed: {message}")]
    Collaborator {
        operation: Operation,
        message: String,
    },

    /// The queue is bounded and already holds `limit` pending tasks
    #[error("QueueFull: {limit} payloads already pending")]
    QueueFull { limit: usize },

    /// The queue worker is no longer running
    #[error("QueueClosed: update queue worker has stopped")]
    QueueClosed,

    /// A queued task panicked
    #[error("TaskPanicked: {0}")]
    TaskPanicked(String),

    /// Invalid configuration
    #[error("ConfigError: {0}")]
    Config(String),

    /// JSON encoding/decoding error
    #[error("JsonError: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    /// IO error
    #[error("IOError: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl Error {
    /// Create a collaborator failure
    pub fn collaborator(operation: Operation, message: impl Into<String>) -> Self {
        Error::Collaborator {
            operation,
            message: message.into(),
        }
    }

    /// Create a protocol error for an undecodable payload
    pub fn protocol(message: impl Into<String>) -> Self {
        Error::Protocol(message.into())
    }

    /// Whether this error came from a collaborator rather than the coordinator
    pub fn is_collaborator(&self) -> bool {
        matches!(self, Error::Collaborator { .. })
    }
}

/// Result type alias for the HMR coordinator
pub type Result<T> = std::result::Result<T, Error>;

/// Log message templates shared by the dispatcher
pub mod messages {
    pub const CONNECTED: &str = "connected.";
    pub const PROGRAM_RELOAD: &str = "program reload";
    pub const CSS_UPDATE_UNSUPPORTED: &str =
        "css hmr is not supported in runner mode.";
    pub const INTERNAL_SERVER_ERROR: &str = "Internal Server Error";

    /// Format the error log for a server-reported error payload
    pub fn server_error(message: &str, stack: &str) -> String {
        format!("{}\n{}\n{}", INTERNAL_SERVER_ERROR, message, stack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collaborator_display() {
        let err = Error::collaborator(Operation::Import, "boom");
        assert_eq!(err.to_string(), "CollaboratorError: import failed: boom");
        assert!(err.is_collaborator());
    }

    #[test]
    fn test_queue_full_display() {
        let err = Error::QueueFull { limit: 4 };
        assert_eq!(err.to_string(), "QueueFull: 4 payloads already pending");
        assert!(!err.is_collaborator());
    }

    #[test]
    fn test_server_error_message() {
        assert_eq!(
            messages::server_error("oops", "at foo.js:1:1"),
            "Internal Server Error\noops\nat foo.js:1:1"
        );
    }
}
