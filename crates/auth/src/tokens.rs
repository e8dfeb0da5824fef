//! Token lifecycle: issue, rotate, revoke and sweep.
//!
//! Access tokens are stateless HS256 JWTs. Refresh tokens are opaque random
//! strings persisted one per user; every successful refresh consumes the
//! presented token and issues a brand new pair.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use tracing::{info, instrument, warn};

use keystone_core::UserId;

use crate::claims::AccessClaims;
use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult, InternalError};
use crate::facade::Facade;
use crate::model::TokenPair;
use crate::store::CredentialStore;

const REFRESH_TOKEN_BYTES: usize = 32;

pub struct TokenManager<S: ?Sized> {
    facade: Facade<S>,
    config: Arc<AuthConfig>,
}

impl<S: ?Sized> Clone for TokenManager<S> {
    fn clone(&self) -> Self {
        Self {
            facade: self.facade.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S: ?Sized> TokenManager<S> {
    pub fn new(facade: Facade<S>, config: Arc<AuthConfig>) -> Self {
        Self { facade, config }
    }

    /// Verify signature and expiry of an access token and return its subject.
    ///
    /// Stateless: never touches the store.
    pub fn validate_access_token(&self, token: &str) -> AuthResult<UserId> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        jsonwebtoken::decode::<AccessClaims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims.user_id)
        .map_err(|e| match e.kind() {
            JwtErrorKind::ExpiredSignature => AuthError::AccessTokenExpired,
            _ => AuthError::InvalidSignature,
        })
    }

    fn sign_access_token(&self, user_id: UserId, now: DateTime<Utc>) -> AuthResult<String> {
        let expires_at = expiry(now, self.config.access_token_ttl)?;
        let claims = AccessClaims::new(user_id, now, expires_at);

        jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| AuthError::internal("failed to generate access token", InternalError::Signing(e.to_string())))
    }
}

impl<S> TokenManager<S>
where
    S: CredentialStore + ?Sized,
{
    /// Issue a fresh access/refresh pair for `user_id`.
    ///
    /// The new refresh token replaces any refresh token the user already had.
    #[instrument(skip(self), fields(user_id = %user_id), err)]
    pub async fn issue_token_pair(&self, user_id: UserId) -> AuthResult<TokenPair> {
        let now = Utc::now();
        let access_token = self.sign_access_token(user_id, now)?;

        let refresh_token = new_refresh_token();
        let expires_at = expiry(now, self.config.refresh_token_ttl)?;
        self.facade
            .upsert_refresh_token(user_id, &refresh_token, expires_at)
            .await
            .map_err(|e| AuthError::store("failed to save refresh token", e))?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            user_id,
        })
    }

    /// Exchange a refresh token for a new pair (rotate-on-use).
    ///
    /// The stored row is removed by the same store call that reads it, so of
    /// two concurrent refreshes with one token, only one can see the row.
    pub async fn refresh_token_pair(&self, refresh_token: &str) -> AuthResult<TokenPair> {
        let stored = self
            .facade
            .take_refresh_token(refresh_token)
            .await
            .map_err(|e| AuthError::store("failed to get refresh token", e))?;

        let Some(stored) = stored else {
            warn!("refresh rejected: unknown token");
            return Err(AuthError::InvalidToken);
        };

        let now = Utc::now();
        if stored.is_expired_at(now) {
            warn!(user_id = %stored.user_id, expired_at = %stored.expires_at, "refresh rejected: token expired");
            return Err(AuthError::ExpiredToken {
                expired_at: stored.expires_at,
                now,
            });
        }

        let pair = self.issue_token_pair(stored.user_id).await?;
        info!(user_id = %stored.user_id, "refresh token rotated");
        Ok(pair)
    }

    /// Revoke a refresh token. Unknown tokens are ignored.
    pub async fn logout(&self, refresh_token: &str) -> AuthResult<()> {
        self.facade
            .delete_refresh_token(refresh_token)
            .await
            .map_err(|e| AuthError::store("failed to delete refresh token", e))
    }

    /// Remove every refresh token whose expiry has passed.
    ///
    /// Intended for a scheduler; safe to call at any frequency.
    pub async fn delete_expired_refresh_tokens(&self) -> AuthResult<u64> {
        let removed = self
            .facade
            .delete_expired_refresh_tokens(Utc::now())
            .await
            .map_err(|e| AuthError::store("failed to delete expired refresh tokens", e))?;

        if removed > 0 {
            info!(removed, "expired refresh tokens swept");
        }
        Ok(removed)
    }
}

fn expiry(now: DateTime<Utc>, ttl: Duration) -> AuthResult<DateTime<Utc>> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| {
            AuthError::internal(
                "token lifetime out of range",
                InternalError::Signing(format!("{ttl:?}")),
            )
        })
}

fn new_refresh_token() -> String {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}
