use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use keystone_core::UserId;

/// Access-token claims (HS256 JWT body).
///
/// Timestamps are seconds since the Unix epoch, as required by the registered
/// `iat`/`exp` claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject of the token.
    pub user_id: UserId,

    /// Issued-at timestamp.
    pub iat: i64,

    /// Expiration timestamp.
    pub exp: i64,
}

impl AccessClaims {
    pub fn new(user_id: UserId, issued_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        }
    }
}
