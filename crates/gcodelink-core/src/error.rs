//! Error handling for GCodeLink
//!
//! Provides error types for every layer of the bridge:
//! - Link errors (serial port / byte channel)
//! - Job errors (program resources and lifecycle transitions)
//! - Transport errors (interactive peer channel)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Link error type
///
/// Represents errors on the serial channel between the bridge and the
/// motion controller.
#[derive(Error, Debug, Clone)]
pub enum LinkError {
    /// Port not found
    #[error("Port not found: {port}")]
    PortNotFound {
        /// The name of the port that was not found.
        port: String,
    },

    /// Failed to open port
    #[error("Failed to open port {port}: {reason}")]
    FailedToOpen {
        /// The name of the port that failed to open.
        port: String,
        /// The reason the port failed to open.
        reason: String,
    },

    /// Invalid connection parameters
    #[error("Invalid connection parameters: {reason}")]
    InvalidParameters {
        /// The reason the parameters are invalid.
        reason: String,
    },

    /// Write to the link failed
    #[error("Write failed: {reason}")]
    WriteFailed {
        /// The reason the write failed.
        reason: String,
    },

    /// Read from the link failed
    #[error("Read failed: {reason}")]
    ReadFailed {
        /// The reason the read failed.
        reason: String,
    },

    /// Enumerating ports failed
    #[error("Failed to enumerate ports: {reason}")]
    Enumeration {
        /// The reason enumeration failed.
        reason: String,
    },
}

/// Job error type
///
/// Represents errors raised while starting or driving an autonomous job.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// Program resource does not exist
    #[error("Program not found: {identifier}")]
    NotFound {
        /// The requested program identifier.
        identifier: String,
    },

    /// Program identifier is not acceptable for the source
    #[error("Invalid program identifier '{identifier}': {reason}")]
    InvalidIdentifier {
        /// The rejected identifier.
        identifier: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Program resource exists but could not be opened
    #[error("Failed to open program {identifier}: {reason}")]
    OpenFailed {
        /// The program identifier.
        identifier: String,
        /// The reason opening failed.
        reason: String,
    },

    /// Reading the next line of an open program failed
    #[error("Failed to read program {identifier}: {reason}")]
    ReadFailed {
        /// The program identifier.
        identifier: String,
        /// The reason reading failed.
        reason: String,
    },

    /// Invalid lifecycle transition
    #[error("Invalid job transition from {current} on {requested}")]
    InvalidTransition {
        /// The current job state.
        current: String,
        /// The requested operation.
        requested: String,
    },
}

/// Transport error type
///
/// Represents errors on the interactive peer channel.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// Listener could not be bound
    #[error("Failed to bind {addr}: {reason}")]
    Bind {
        /// The requested listen address.
        addr: String,
        /// The reason binding failed.
        reason: String,
    },

    /// The polling loop side of the channel has gone away
    #[error("Transport channel closed")]
    ChannelClosed,
}

/// Main error type for GCodeLink
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Link error
    #[error(transparent)]
    Link(#[from] LinkError),

    /// Job error
    #[error(transparent)]
    Job(#[from] JobError),

    /// Transport error
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a link error
    pub fn is_link_error(&self) -> bool {
        matches!(self, Error::Link(_))
    }

    /// Check if this is a job error
    pub fn is_job_error(&self) -> bool {
        matches!(self, Error::Job(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_error_display() {
        let err = JobError::NotFound {
            identifier: "missing.gcode".to_string(),
        };
        assert_eq!(err.to_string(), "Program not found: missing.gcode");

        let err = JobError::InvalidTransition {
            current: "Running".to_string(),
            requested: "start".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid job transition from Running on start");
    }

    #[test]
    fn test_error_conversion() {
        let err: Error = LinkError::WriteFailed {
            reason: "broken pipe".to_string(),
        }
        .into();
        assert!(err.is_link_error());
        assert_eq!(err.to_string(), "Write failed: broken pipe");

        let err: Error = JobError::NotFound {
            identifier: "a".to_string(),
        }
        .into();
        assert!(err.is_job_error());

        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
