// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Client-side error taxonomy.

use crate::config::ConfigError;
use crate::frame::FramingError;
use crate::protocol::{ErrorInfo, ErrorKind};

/// Error returned by [`Session`](crate::client::Session) and
/// [`Proxy`](crate::client::Proxy) operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// No type registered under the requested name.
    #[error("unknown type: {0}")]
    UnknownType(String),

    #[error("duplicate type: {0}")]
    DuplicateType(String),

    /// The type's constructor failed on the server.
    #[error("construction failed: {message}")]
    Construction {
        message: String,
        original_type_name: Option<String>,
    },

    /// The reference is not (or no longer) valid.
    #[error("unknown reference: {0}")]
    UnknownReference(String),

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Raised by the object's own behavior on the server.
    #[error("remote exception ({original_type_name}): {message}")]
    RemoteException {
        message: String,
        original_type_name: String,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A message could not be framed or decoded; the session is unusable.
    #[error("framing error: {0}")]
    Framing(String),

    /// The connection is gone; the session is unusable.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl RemoteError {
    /// Wire error kind, for errors reported by the server.
    pub fn kind(&self) -> Option<ErrorKind> {
        Some(match self {
            Self::UnknownType(_) => ErrorKind::UnknownType,
            Self::DuplicateType(_) => ErrorKind::DuplicateType,
            Self::Construction { .. } => ErrorKind::Construction,
            Self::UnknownReference(_) => ErrorKind::UnknownReference,
            Self::UnsupportedOperation(_) => ErrorKind::UnsupportedOperation,
            Self::RemoteException { .. } => ErrorKind::RemoteException,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::Framing(_) | Self::Transport(_) | Self::Config(_) => return None,
        })
    }

    /// Type tag of the failure raised inside the remote object, if any.
    pub fn original_type_name(&self) -> Option<&str> {
        match self {
            Self::Construction {
                original_type_name, ..
            } => original_type_name.as_deref(),
            Self::RemoteException {
                original_type_name, ..
            } => Some(original_type_name),
            _ => None,
        }
    }

    /// True for a lost connection. Later calls on a session that failed with
    /// [`Framing`](Self::Framing) also report `Transport`.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<ErrorInfo> for RemoteError {
    fn from(info: ErrorInfo) -> Self {
        let ErrorInfo {
            kind,
            message,
            original_type_name,
        } = info;
        match kind {
            ErrorKind::UnknownType => Self::UnknownType(message),
            ErrorKind::DuplicateType => Self::DuplicateType(message),
            ErrorKind::Construction => Self::Construction {
                message,
                original_type_name,
            },
            ErrorKind::UnknownReference => Self::UnknownReference(message),
            ErrorKind::UnsupportedOperation => Self::UnsupportedOperation(message),
            ErrorKind::RemoteException => Self::RemoteException {
                message,
                original_type_name: original_type_name.unwrap_or_else(|| "Exception".to_string()),
            },
            ErrorKind::InvalidRequest => Self::InvalidRequest(message),
        }
    }
}

impl From<FramingError> for RemoteError {
    fn from(e: FramingError) -> Self {
        match e {
            FramingError::Io(_) => Self::Transport(e.to_string()),
            other => Self::Framing(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_from_error_info() {
        let err = RemoteError::from(ErrorInfo::remote_exception("KeyNotFound", "key not found: 3"));
        assert_eq!(err.kind(), Some(ErrorKind::RemoteException));
        assert_eq!(err.original_type_name(), Some("KeyNotFound"));
        assert!(err.to_string().contains("key not found: 3"));

        let err = RemoteError::from(ErrorInfo::new(ErrorKind::UnknownReference, "Unknown reference 4"));
        assert_eq!(err, RemoteError::UnknownReference("Unknown reference 4".into()));
    }

    #[test]
    fn test_from_framing_error() {
        let err = RemoteError::from(FramingError::Io(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "reset",
        )));
        assert!(err.is_transport());
        assert_eq!(err.kind(), None);

        let err = RemoteError::from(FramingError::TooLarge { len: 10, max: 5 });
        assert!(matches!(err, RemoteError::Framing(_)));
    }
}
