//! Error types for dRPC.
//!
//! Errors fall into a few families: transport errors on the socket, protocol
//! validation errors that the server turns into failure responses, handler
//! failures that carry their own transport status, and caller-side conditions
//! such as cancellation.

use crate::module::ModuleId;
use crate::status::Status;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for dRPC.
#[derive(Debug, Error)]
pub enum DrpcError {
    // Transport errors
    #[error("dRPC connect to {path:?}: {source}")]
    Connect {
        path: PathBuf,
        /// Whether the dial failure is expected to clear up on its own.
        temporary: bool,
        #[source]
        source: std::io::Error,
    },

    #[error("dRPC not connected")]
    NotConnected,

    #[error("dRPC send: {source}")]
    Send {
        #[source]
        source: std::io::Error,
    },

    #[error("dRPC recv: {source}")]
    Recv {
        #[source]
        source: std::io::Error,
    },

    #[error("dRPC close: {source}")]
    Close {
        #[source]
        source: std::io::Error,
    },

    #[error("dRPC connection closed by peer")]
    ConnectionClosed,

    #[error("dRPC message size {size} exceeds maximum {max}")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Unable to listen on unix socket {path:?}: {source}")]
    Listen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Protocol validation errors
    #[error("unknown module id {0}")]
    UnknownModule(i32),

    #[error("invalid method {method} for module {module}")]
    InvalidMethod { module: ModuleId, method: i32 },

    #[error("bad dRPC response status: {0}")]
    BadResponseStatus(Status),

    #[error("failed to marshal dRPC message: {message}")]
    Marshal {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("failed to unmarshal dRPC message: {message}")]
    Unmarshal {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Handler errors
    #[error("dRPC failure ({status}): {message}")]
    Failure { status: Status, message: String },

    // Caller-side conditions
    #[error("data plane is not started (no listener at {path:?})")]
    DataPlaneNotStarted { path: PathBuf },

    #[error("dRPC call cancelled")]
    Cancelled,

    // Server lifecycle
    #[error("dRPC server already started")]
    AlreadyStarted,

    #[error("Missing Argument: {0}")]
    MissingArgument(&'static str),

    // Socket layout errors
    #[error("{message} socket directory {path:?}")]
    SocketDir {
        message: String,
        path: PathBuf,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("socket path {path:?}: {message}")]
    SocketPath { path: PathBuf, message: String },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },
}

/// Result type alias for dRPC operations.
pub type Result<T> = std::result::Result<T, DrpcError>;

impl From<std::io::Error> for DrpcError {
    fn from(err: std::io::Error) -> Self {
        DrpcError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for DrpcError {
    fn from(err: serde_json::Error) -> Self {
        DrpcError::Unmarshal {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl DrpcError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        DrpcError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create a marshal error from a serialization failure.
    pub fn marshal(err: serde_json::Error) -> Self {
        DrpcError::Marshal {
            message: err.to_string(),
            source: Some(err),
        }
    }

    /// Create a handler failure carrying a specific transport status.
    pub fn failure(status: Status, message: impl Into<String>) -> Self {
        DrpcError::Failure {
            status,
            message: message.into(),
        }
    }

    /// Transport status reported to the peer when a handler returns this error.
    ///
    /// - `Failure` carries its own status
    /// - `UnknownModule` / `InvalidMethod` → `UNKNOWN_MODULE` / `UNKNOWN_METHOD`
    /// - `Unmarshal` (handler could not decode its payload) → `FAILED_UNMARSHAL_PAYLOAD`
    /// - `Marshal` → `FAILED_MARSHAL`
    /// - anything else → `FAILURE`
    pub fn to_status(&self) -> Status {
        match self {
            DrpcError::Failure { status, .. } => *status,
            DrpcError::UnknownModule(_) => Status::UnknownModule,
            DrpcError::InvalidMethod { .. } => Status::UnknownMethod,
            DrpcError::Unmarshal { .. } => Status::FailedUnmarshalPayload,
            DrpcError::Marshal { .. } => Status::FailedMarshal,
            _ => Status::Failure,
        }
    }

    /// Check if a dial failure is transient.
    ///
    /// A permanent dial failure usually means nothing is listening on the
    /// socket yet; a temporary one is worth trying again.
    pub fn is_temporary(&self) -> bool {
        matches!(self, DrpcError::Connect { temporary: true, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DrpcError::InvalidMethod {
            module: ModuleId::MGMT,
            method: 200,
        };
        assert_eq!(err.to_string(), "invalid method 200 for module Management");
        assert_eq!(DrpcError::NotConnected.to_string(), "dRPC not connected");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            DrpcError::failure(Status::Submitted, "queued").to_status(),
            Status::Submitted
        );
        assert_eq!(DrpcError::UnknownModule(9).to_status(), Status::UnknownModule);
        assert_eq!(
            DrpcError::InvalidMethod {
                module: ModuleId::SRV,
                method: 399
            }
            .to_status(),
            Status::UnknownMethod
        );
        let bad_json = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(DrpcError::from(bad_json).to_status(), Status::FailedUnmarshalPayload);
        assert_eq!(DrpcError::NotConnected.to_status(), Status::Failure);
    }

    #[test]
    fn test_temporary_classification() {
        let temporary = DrpcError::Connect {
            path: PathBuf::from("/tmp/x.sock"),
            temporary: true,
            source: std::io::Error::from(std::io::ErrorKind::Interrupted),
        };
        let permanent = DrpcError::Connect {
            path: PathBuf::from("/tmp/x.sock"),
            temporary: false,
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(temporary.is_temporary());
        assert!(!permanent.is_temporary());
        assert!(!DrpcError::NotConnected.is_temporary());
    }
}
