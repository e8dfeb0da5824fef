//! Domain error model for the three managers.

use chrono::{DateTime, Utc};
use thiserror::Error;

use keystone_core::ErrorKind;

use crate::store::StoreError;

pub type AuthResult<T> = Result<T, AuthError>;

/// Tagged domain error returned by every manager operation.
///
/// Transport layers should match on [`AuthError::kind`] to pick a status and
/// may use the variant for a precise message.
#[derive(Debug, Error)]
pub enum AuthError {
    // ── not found ───────────────────────────────────────────────────────────
    #[error("user not found")]
    UserNotFound,

    #[error("project not found")]
    ProjectNotFound,

    #[error("permission not found")]
    PermissionNotFound,

    #[error("assigner role not found")]
    AssignerRoleNotFound,

    #[error("assignable not found")]
    AssignableNotFound,

    #[error("assignable role not found")]
    AssignableRoleNotFound,

    // ── conflict ────────────────────────────────────────────────────────────
    #[error("username already exists")]
    UsernameExists,

    #[error("email already exists")]
    EmailExists,

    #[error("project already exists")]
    ProjectExists,

    #[error("permission already exists")]
    PermissionExists,

    #[error("username and email belong to different accounts")]
    PasswordConflict,

    // ── unauthorized ────────────────────────────────────────────────────────
    #[error("incorrect password")]
    IncorrectPassword,

    #[error("invalid refresh token")]
    InvalidToken,

    #[error("refresh token expired at {expired_at}, compared with {now}")]
    ExpiredToken {
        expired_at: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    #[error("invalid token signature")]
    InvalidSignature,

    #[error("access token has expired")]
    AccessTokenExpired,

    // ── forbidden ───────────────────────────────────────────────────────────
    #[error("assigner is not owner")]
    AssignerIsNotOwner,

    #[error("cannot change owner role")]
    OwnerRoleChanging,

    // ── validation ──────────────────────────────────────────────────────────
    #[error("invalid role '{0}'")]
    InvalidRole(String),

    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    #[error("username must not contain '@'")]
    UsernameContainsAt,

    #[error("email must contain '@'")]
    EmailMissingAt,

    // ── internal ────────────────────────────────────────────────────────────
    #[error("{context}: {source}")]
    Internal {
        context: &'static str,
        #[source]
        source: InternalError,
    },
}

/// Cause of an [`AuthError::Internal`].
#[derive(Debug, Error)]
pub enum InternalError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("password hashing failed: {0}")]
    Hashing(String),

    #[error("token signing failed: {0}")]
    Signing(String),

    #[error("password delivery failed: {0}")]
    Delivery(String),

    #[error("blocking task failed: {0}")]
    Task(String),
}

impl AuthError {
    pub fn internal(context: &'static str, source: impl Into<InternalError>) -> Self {
        Self::Internal {
            context,
            source: source.into(),
        }
    }

    /// Wrap an unexpected store failure with the call context.
    pub fn store(context: &'static str, err: StoreError) -> Self {
        Self::internal(context, err)
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::UserNotFound
            | AuthError::ProjectNotFound
            | AuthError::PermissionNotFound
            | AuthError::AssignerRoleNotFound
            | AuthError::AssignableNotFound
            | AuthError::AssignableRoleNotFound => ErrorKind::NotFound,

            AuthError::UsernameExists
            | AuthError::EmailExists
            | AuthError::ProjectExists
            | AuthError::PermissionExists
            | AuthError::PasswordConflict => ErrorKind::Conflict,

            AuthError::IncorrectPassword
            | AuthError::InvalidToken
            | AuthError::ExpiredToken { .. }
            | AuthError::InvalidSignature
            | AuthError::AccessTokenExpired => ErrorKind::Unauthorized,

            AuthError::AssignerIsNotOwner | AuthError::OwnerRoleChanging => ErrorKind::Forbidden,

            AuthError::InvalidRole(_)
            | AuthError::EmptyField(_)
            | AuthError::UsernameContainsAt
            | AuthError::EmailMissingAt => ErrorKind::Validation,

            AuthError::Internal { .. } => ErrorKind::Internal,
        }
    }
}
