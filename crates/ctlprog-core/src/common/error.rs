//! Error types for control program creation.
//!
//! This module defines the central `Error` enum, which captures every failure
//! a single batch item can run into, and the classification that turns any of
//! them into the one descriptor shape clients see ([`WireError`]).
//!
//! ## Error Cases
//! - `NotFound`: An account or account alias does not exist.
//! - `InvalidRequest`: The sub-request is malformed (e.g. no account given).
//! - `Unsupported`: The sub-request names an operation this service does not
//!   implement.
//! - `Upstream`: The account service failed in a way the caller may retry.
//! - `Internal`: Anything else, including a panic recovered from a batch item.
//!
//! Panics are never a separate case: a recovered panic becomes `Internal` and
//! is classified exactly like a declared internal error.

use crate::common::types::WireError;
use serde::{Deserialize, Serialize};
use serde_json::json;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for control program creation.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// The referenced resource does not exist.
    #[error("{resource} not found: {key}")]
    NotFound { resource: &'static str, key: String },

    /// The request was malformed.
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// The request names an operation that is not implemented.
    #[error("Unsupported operation: {operation}")]
    Unsupported { operation: String },

    /// The account service failed.
    #[error("Upstream error: {context}")]
    Upstream { context: String },

    /// Internal failure, including recovered panics.
    #[error("Internal error: {context}")]
    Internal { context: String },
}

/// Coarse error category carried on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    InvalidRequest,
    Unsupported,
    Upstream,
    Internal,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::InvalidRequest => "invalid_request",
            Self::Unsupported => "unsupported",
            Self::Upstream => "upstream",
            Self::Internal => "internal",
        }
    }
}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The detailed, client-facing view of an [`Error`].
///
/// Context strings of upstream and internal failures are not included:
/// they are logged where the error is classified and never leave the process.
#[derive(Clone, Debug, PartialEq)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
    pub detail: Option<serde_json::Value>,
    pub temporary: bool,
    pub http_status: u16,
}

impl Error {
    /// Wraps a recovered panic message.
    pub fn from_panic(message: impl Into<String>) -> Self {
        Self::Internal {
            context: format!("panic: {}", message.into()),
        }
    }

    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvalidRequest { .. } => ErrorKind::InvalidRequest,
            Self::Unsupported { .. } => ErrorKind::Unsupported,
            Self::Upstream { .. } => ErrorKind::Upstream,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Classifies the error into its client-facing form and HTTP status.
    pub fn classify(&self) -> ErrorInfo {
        match self {
            Self::NotFound { resource, key } => ErrorInfo {
                kind: ErrorKind::NotFound,
                message: format!("{resource} not found"),
                detail: Some(json!({ "key": key })),
                temporary: false,
                http_status: 404,
            },
            Self::InvalidRequest { reason } => ErrorInfo {
                kind: ErrorKind::InvalidRequest,
                message: reason.clone(),
                detail: None,
                temporary: false,
                http_status: 400,
            },
            Self::Unsupported { operation } => ErrorInfo {
                kind: ErrorKind::Unsupported,
                message: "unsupported operation".to_string(),
                detail: Some(json!({ "operation": operation })),
                temporary: false,
                http_status: 400,
            },
            Self::Upstream { .. } => ErrorInfo {
                kind: ErrorKind::Upstream,
                message: "upstream service error".to_string(),
                detail: None,
                temporary: true,
                http_status: 502,
            },
            Self::Internal { .. } => ErrorInfo {
                kind: ErrorKind::Internal,
                message: "internal error".to_string(),
                detail: None,
                temporary: false,
                http_status: 500,
            },
        }
    }
}

impl From<ErrorInfo> for WireError {
    fn from(info: ErrorInfo) -> Self {
        Self {
            kind: info.kind,
            message: info.message,
            detail: info.detail,
            temporary: info.temporary,
        }
    }
}

impl From<&Error> for WireError {
    fn from(err: &Error) -> Self {
        err.classify().into()
    }
}

impl From<Error> for WireError {
    fn from(err: Error) -> Self {
        Self::from(&err)
    }
}
