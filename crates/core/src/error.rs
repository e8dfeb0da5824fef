//! Error taxonomy shared by every layer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification of a domain failure.
///
/// Domain errors are rich enums owned by the crate that raises them; each one
/// maps into exactly one of these buckets. Transport layers translate the
/// bucket into a protocol status without inspecting the concrete variant.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A referenced user, project, permission or token does not exist.
    NotFound,
    /// A uniqueness rule would be broken (duplicate identity, owner or grant).
    Conflict,
    /// The caller failed to prove who they are.
    Unauthorized,
    /// The caller is known but not allowed to perform the mutation.
    Forbidden,
    /// The request carried a value outside the allowed set.
    Validation,
    /// Hashing, signing, storage or delivery failed.
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::Validation => "validation",
            ErrorKind::Internal => "internal",
        }
    }

    /// Whether the failure is attributable to the caller (as opposed to the system).
    pub fn is_client_error(self) -> bool {
        !matches!(self, ErrorKind::Internal)
    }
}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An identifier failed to parse.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid identifier: {kind}: {reason}")]
pub struct InvalidId {
    pub kind: &'static str,
    pub reason: String,
}

impl InvalidId {
    pub fn new(kind: &'static str, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }
}
