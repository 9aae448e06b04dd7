//! Application error types with rich context

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Application error types organized by layer/domain
#[derive(Debug, Error)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Common/Infrastructure Errors
    // ─────────────────────────────────────────────────────────────
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ─────────────────────────────────────────────────────────────
    // Process Configuration Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Invalid process name: {name:?}")]
    InvalidName { name: String },

    #[error("No command given for process {name}")]
    EmptyCommand { name: String },

    #[error("Working directory must be an absolute path, not {path}")]
    InvalidWorkingDir { path: PathBuf },

    #[error("Invalid identity: {message}")]
    InvalidIdentity { message: String },

    #[error("Invalid size {value:?}: expected a byte count with optional k, m or g suffix")]
    InvalidSize { value: String },

    #[error("Invalid {stream} capture selector {value:?}")]
    InvalidCapture { stream: &'static str, value: String },

    #[error("Unknown rlimit \"{name}\"")]
    UnknownRlimit { name: String },

    #[error("The rlimit value for \"{name}\" must be an integer, not \"{value}\"")]
    InvalidRlimitValue { name: String, value: String },

    #[error("{feature} is not supported on this platform")]
    Unsupported { feature: &'static str },

    // ─────────────────────────────────────────────────────────────
    // Process Lifecycle Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Process for {name} has already been created - {existing}")]
    NameInUse { name: String, existing: String },

    #[error("Failed to spawn process {name}: {reason}")]
    ProcessSpawn { name: String, reason: String },

    // ─────────────────────────────────────────────────────────────
    // Daemon Protocol Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    #[error("Unknown command: {command}")]
    UnknownCommand { command: String },

    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

// ─────────────────────────────────────────────────────────────────
// Convenience Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    pub fn invalid_name(name: impl Into<String>) -> Self {
        Self::InvalidName { name: name.into() }
    }

    pub fn invalid_identity(message: impl Into<String>) -> Self {
        Self::InvalidIdentity {
            message: message.into(),
        }
    }

    pub fn invalid_size(value: impl Into<String>) -> Self {
        Self::InvalidSize {
            value: value.into(),
        }
    }

    pub fn unknown_rlimit(name: impl Into<String>) -> Self {
        Self::UnknownRlimit { name: name.into() }
    }

    pub fn unsupported(feature: &'static str) -> Self {
        Self::Unsupported { feature }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Check if this error was raised while validating a process definition,
    /// before any OS process was created.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidName { .. }
                | Error::EmptyCommand { .. }
                | Error::InvalidWorkingDir { .. }
                | Error::InvalidIdentity { .. }
                | Error::InvalidSize { .. }
                | Error::InvalidCapture { .. }
                | Error::UnknownRlimit { .. }
                | Error::InvalidRlimitValue { .. }
                | Error::Unsupported { .. }
                | Error::Config { .. }
        )
    }

    /// Check if this error should be reported back to the client and the
    /// connection kept open
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Error::Io(_))
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Context Extensions
// ─────────────────────────────────────────────────────────────────

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", context.into(), err);
            err
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", f(), err);
            err
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = Error::unknown_rlimit("bogus");
        assert_eq!(err.to_string(), "Unknown rlimit \"bogus\"");

        let err = Error::InvalidRlimitValue {
            name: "nofile".to_string(),
            value: "lots".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "The rlimit value for \"nofile\" must be an integer, not \"lots\""
        );
    }

    #[test]
    fn test_name_in_use_message() {
        let err = Error::NameInUse {
            name: "web".to_string(),
            existing: "web pid=42".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Process for web has already been created - web pid=42"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_config_error_classification() {
        assert!(Error::invalid_size("12q").is_config_error());
        assert!(Error::unsupported("uid").is_config_error());
        assert!(Error::invalid_identity("no such user").is_config_error());
        assert!(!Error::protocol("bad frame").is_config_error());
        assert!(!Error::NameInUse {
            name: "a".to_string(),
            existing: "a pid=1".to_string()
        }
        .is_config_error());
    }

    #[test]
    fn test_unsupported_message() {
        let err = Error::unsupported("gid");
        assert_eq!(err.to_string(), "gid is not supported on this platform");
    }
}
