//! Error taxonomy for the context resolution engine
//!
//! Only two conditions are fatal inside the engine: the process table cannot
//! be listed at all, or the stat record that defines a process cannot be read
//! or parsed. Every other probe degrades to a default field value.

use std::io;
use thiserror::Error;

/// witr error type
#[derive(Error, Debug)]
pub enum WitrError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Failed to {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse {what}: {reason}")]
    Parse { what: String, reason: String },
}

pub type Result<T> = std::result::Result<T, WitrError>;

impl WitrError {
    /// Wrap an IO error with a short description of what was being attempted
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn parse(what: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            what: what.into(),
            reason: reason.into(),
        }
    }

    /// True when the error means the process vanished (or never existed)
    pub fn is_no_such_process(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_such_process_detection() {
        let err = WitrError::io(
            "read /proc/42/stat",
            io::Error::new(io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.is_no_such_process());

        let err = WitrError::io(
            "read /proc/42/stat",
            io::Error::new(io::ErrorKind::PermissionDenied, "nope"),
        );
        assert!(!err.is_no_such_process());

        assert!(!WitrError::Validation("empty".into()).is_no_such_process());
    }

    #[test]
    fn test_error_messages() {
        let err = WitrError::parse("/proc/1/stat", "missing ')'");
        assert_eq!(err.to_string(), "Failed to parse /proc/1/stat: missing ')'");

        let err = WitrError::io("list processes", io::Error::other("ps not found"));
        assert_eq!(err.to_string(), "Failed to list processes: ps not found");
    }
}
