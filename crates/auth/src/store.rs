//! Credential store boundary.
//!
//! The managers never talk to a database directly: they consume the traits
//! below (through [`crate::facade::Facade`]). Implementations live in
//! `keystone-infra` (in-memory for tests/dev, Postgres for production).
//!
//! ## Atomicity contract
//!
//! Every invariant the managers rely on is delegated to a single store call:
//!
//! - `insert_user`: unique username and unique email (reported as
//!   [`Constraint::Unique`]).
//! - `insert_owner_if_absent`: conditional insert, evaluated atomically with
//!   the write; at most one owner per project.
//! - `upsert_refresh_token`: one active refresh token per user.
//! - `take_refresh_token`: read and delete in one step, so a refresh token can
//!   be consumed at most once.
//! - `update_permission` / `delete_permission`: never touch an owner row.

use chrono::{DateTime, Utc};
use thiserror::Error;

use keystone_core::{ProjectId, UserId};

use crate::model::{NewUser, ProjectMember, ProjectPermission, RefreshToken, User};
use crate::Role;

/// Unique key that a write collided with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UniqueKey {
    Username,
    Email,
    /// `(user_id, project_id)` on the permission table.
    Permission,
    /// The single-owner-per-project index.
    ProjectOwner,
    RefreshToken,
    /// A constraint the adapter could not classify (carries its name).
    Other(String),
}

/// Structured constraint violation reported by the store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Constraint {
    #[error("unique violation on {0:?}")]
    Unique(UniqueKey),

    #[error("foreign key violation")]
    ForeignKey,
}

/// Store operation error.
///
/// "No matching row" is a sentinel ([`StoreError::NotFound`]) that managers
/// translate into the specific domain error of the call; constraint violations
/// are tagged so nothing upstream ever parses a message.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no matching row")]
    NotFound,

    #[error("constraint violation: {0}")]
    Constraint(#[from] Constraint),

    #[error("store call '{op}' timed out after {after:?}")]
    Timeout {
        op: &'static str,
        after: std::time::Duration,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn unique(key: UniqueKey) -> Self {
        Self::Constraint(Constraint::Unique(key))
    }

    pub fn is_unique_violation_on(&self, key: &UniqueKey) -> bool {
        matches!(self, StoreError::Constraint(Constraint::Unique(k)) if k == key)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// User rows.
#[async_trait::async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;

    async fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    /// Insert a user and return the store-assigned id.
    async fn insert_user(&self, user: NewUser) -> StoreResult<UserId>;

    async fn user_exists(&self, user_id: UserId) -> StoreResult<bool>;

    /// Returns [`StoreError::NotFound`] if the user does not exist.
    async fn update_username(&self, user_id: UserId, username: &str) -> StoreResult<()>;

    /// Returns [`StoreError::NotFound`] if the user does not exist.
    async fn update_email(&self, user_id: UserId, email: &str) -> StoreResult<()>;

    /// Returns [`StoreError::NotFound`] if the user does not exist.
    async fn update_password(&self, user_id: UserId, password_hash: &str) -> StoreResult<()>;
}

/// Project permission rows.
#[async_trait::async_trait]
pub trait PermissionStore: Send + Sync {
    /// A project exists iff at least one permission row references it.
    async fn project_exists(&self, project_id: ProjectId) -> StoreResult<bool>;

    async fn get_role(&self, user_id: UserId, project_id: ProjectId) -> StoreResult<Option<Role>>;

    /// Insert an owner row unless the project already has an owner.
    ///
    /// Returns `Ok(false)` when an owner already exists. The predicate is
    /// evaluated atomically with the write.
    async fn insert_owner_if_absent(
        &self,
        user_id: UserId,
        project_id: ProjectId,
    ) -> StoreResult<bool>;

    async fn insert_permission(&self, permission: ProjectPermission) -> StoreResult<()>;

    /// Change a non-owner row. [`StoreError::NotFound`] if there is none.
    async fn update_permission(
        &self,
        user_id: UserId,
        project_id: ProjectId,
        role: Role,
    ) -> StoreResult<()>;

    /// Remove a non-owner row. [`StoreError::NotFound`] if there is none.
    async fn delete_permission(&self, user_id: UserId, project_id: ProjectId) -> StoreResult<()>;

    async fn list_user_projects(&self, user_id: UserId) -> StoreResult<Vec<ProjectId>>;

    async fn list_project_members(&self, project_id: ProjectId) -> StoreResult<Vec<ProjectMember>>;
}

/// Refresh-token rows.
#[async_trait::async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Persist `token` as the only refresh token of `user_id`.
    async fn upsert_refresh_token(
        &self,
        user_id: UserId,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Delete the row matching `token` and return it.
    async fn take_refresh_token(&self, token: &str) -> StoreResult<Option<RefreshToken>>;

    /// Delete the row matching `token`; a missing row is not an error.
    async fn delete_refresh_token(&self, token: &str) -> StoreResult<()>;

    /// Delete every row with `expires_at < now`, returning how many were removed.
    async fn delete_expired_refresh_tokens(&self, now: DateTime<Utc>) -> StoreResult<u64>;
}

/// Union of every store capability the managers consume.
pub trait CredentialStore: UserStore + PermissionStore + RefreshTokenStore {}

impl<T> CredentialStore for T where T: UserStore + PermissionStore + RefreshTokenStore {}
