//! Records exchanged between the managers and the credential store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use keystone_core::{ProjectId, RefreshTokenId, UserId};

use crate::Role;

/// A registered account.
///
/// `password_hash` is a PHC-formatted digest; the plaintext never reaches the
/// store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

/// Insert payload for a new account (the store assigns the id).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

/// One row of the per-project role map.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectPermission {
    pub user_id: UserId,
    pub project_id: ProjectId,
    pub role: Role,
}

impl ProjectPermission {
    pub fn new(user_id: UserId, project_id: ProjectId, role: Role) -> Self {
        Self {
            user_id,
            project_id,
            role,
        }
    }
}

/// A project member as seen by `GetProjectUserRoles`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectMember {
    pub username: String,
    pub role: Role,
}

/// A persisted refresh token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshToken {
    pub id: RefreshTokenId,
    pub user_id: UserId,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl RefreshToken {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Access/refresh pair handed back to the caller. Never persisted as such.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub user_id: UserId,
}
