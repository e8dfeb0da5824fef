//! Account lifecycle: registration, login and credential changes.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult, InternalError};
use crate::facade::Facade;
use crate::model::{NewUser, TokenPair, User};
use crate::password::{generate_password, CredentialHasher};
use crate::store::{CredentialStore, StoreError, UniqueKey};
use crate::tokens::TokenManager;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct DeliveryError(pub String);

/// Hands a freshly generated password to the account owner (mail, SMS, ...).
#[async_trait::async_trait]
pub trait PasswordDelivery: Send + Sync {
    async fn deliver(&self, email: &str, username: &str, password: &str) -> Result<(), DeliveryError>;
}

/// Development delivery: records that a reset happened, drops the password.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOnlyDelivery;

#[async_trait::async_trait]
impl PasswordDelivery for LogOnlyDelivery {
    async fn deliver(&self, email: &str, username: &str, _password: &str) -> Result<(), DeliveryError> {
        info!(email, username, "generated password ready for delivery");
        Ok(())
    }
}

pub struct CredentialManager<S: ?Sized> {
    facade: Facade<S>,
    tokens: TokenManager<S>,
    hasher: CredentialHasher,
    config: Arc<AuthConfig>,
    delivery: Arc<dyn PasswordDelivery>,
}

impl<S: ?Sized> Clone for CredentialManager<S> {
    fn clone(&self) -> Self {
        Self {
            facade: self.facade.clone(),
            tokens: self.tokens.clone(),
            hasher: self.hasher.clone(),
            config: self.config.clone(),
            delivery: self.delivery.clone(),
        }
    }
}

impl<S> CredentialManager<S>
where
    S: CredentialStore + ?Sized,
{
    pub fn new(
        facade: Facade<S>,
        tokens: TokenManager<S>,
        hasher: CredentialHasher,
        config: Arc<AuthConfig>,
        delivery: Arc<dyn PasswordDelivery>,
    ) -> Self {
        Self {
            facade,
            tokens,
            hasher,
            config,
            delivery,
        }
    }

    /// Create an account and log it in.
    ///
    /// The username/email lookups are a fast path only; the store's unique
    /// constraints decide under concurrency and surface the same errors.
    #[instrument(skip(self, email, password), err)]
    pub async fn register(&self, username: &str, email: &str, password: &str) -> AuthResult<TokenPair> {
        valid_username("username", username)?;
        valid_email("email", email)?;
        non_empty("password", password)?;

        if self.user_by_username(username).await?.is_some() {
            return Err(AuthError::UsernameExists);
        }
        if self.user_by_email(email).await?.is_some() {
            return Err(AuthError::EmailExists);
        }

        let password_hash = self.hasher.hash(password).await?;
        let user_id = self
            .facade
            .insert_user(NewUser {
                username: username.to_owned(),
                email: email.to_owned(),
                password_hash,
            })
            .await
            .map_err(|e| identity_conflict(e, "failed to add user"))?;

        info!(user_id = %user_id, "user registered");
        self.tokens.issue_token_pair(user_id).await
    }

    /// `identifier` is treated as an email when it contains `@`.
    pub async fn login(&self, identifier: &str, password: &str) -> AuthResult<TokenPair> {
        let user = if identifier.contains('@') {
            self.user_by_email(identifier).await?
        } else {
            self.user_by_username(identifier).await?
        };
        let user = user.ok_or_else(|| {
            warn!("login rejected: unknown account");
            AuthError::UserNotFound
        })?;

        self.check_password(&user, password).await?;
        self.tokens.issue_token_pair(user.id).await
    }

    #[instrument(skip(self, password), err)]
    pub async fn change_username(&self, username: &str, new_username: &str, password: &str) -> AuthResult<()> {
        valid_username("new username", new_username)?;

        let user = self.user_by_username(username).await?.ok_or(AuthError::UserNotFound)?;
        self.check_password(&user, password).await?;

        self.facade
            .update_username(user.id, new_username)
            .await
            .map_err(|e| identity_conflict(e, "failed to update username"))?;

        info!(user_id = %user.id, "username changed");
        Ok(())
    }

    #[instrument(skip(self, email, new_email, password), err)]
    pub async fn change_email(&self, email: &str, new_email: &str, password: &str) -> AuthResult<()> {
        valid_email("new email", new_email)?;

        let user = self.user_by_email(email).await?.ok_or(AuthError::UserNotFound)?;
        self.check_password(&user, password).await?;

        self.facade
            .update_email(user.id, new_email)
            .await
            .map_err(|e| identity_conflict(e, "failed to update email"))?;

        info!(user_id = %user.id, "email changed");
        Ok(())
    }

    /// Both identifiers must resolve to the same account.
    #[instrument(skip(self, email, old_password, new_password), err)]
    pub async fn change_password(
        &self,
        username: &str,
        email: &str,
        old_password: &str,
        new_password: &str,
    ) -> AuthResult<()> {
        non_empty("new password", new_password)?;

        let by_name = self.user_by_username(username).await?.ok_or(AuthError::UserNotFound)?;
        let by_email = self.user_by_email(email).await?.ok_or(AuthError::UserNotFound)?;
        if by_name.id != by_email.id {
            warn!(user_id = %by_name.id, "password change rejected: username and email disagree");
            return Err(AuthError::PasswordConflict);
        }

        self.check_password(&by_name, old_password).await?;
        self.set_password(&by_name, new_password).await?;

        info!(user_id = %by_name.id, "password changed");
        Ok(())
    }

    /// Replace the password of the account owning `email` with a generated one
    /// and hand it to the delivery collaborator.
    #[instrument(skip(self, email), err)]
    pub async fn forgot_password(&self, email: &str) -> AuthResult<()> {
        let user = self.user_by_email(email).await?.ok_or(AuthError::UserNotFound)?;

        let password = generate_password(self.config.generated_password_length, &mut rand::rngs::OsRng);
        self.set_password(&user, &password).await?;

        self.delivery
            .deliver(&user.email, &user.username, &password)
            .await
            .map_err(|e| AuthError::internal("failed to deliver password", InternalError::Delivery(e.0)))?;

        info!(user_id = %user.id, "password reset");
        Ok(())
    }

    async fn user_by_username(&self, username: &str) -> AuthResult<Option<User>> {
        self.facade
            .get_user_by_username(username)
            .await
            .map_err(|e| AuthError::store("failed to get user by username", e))
    }

    async fn user_by_email(&self, email: &str) -> AuthResult<Option<User>> {
        self.facade
            .get_user_by_email(email)
            .await
            .map_err(|e| AuthError::store("failed to get user by email", e))
    }

    async fn check_password(&self, user: &User, password: &str) -> AuthResult<()> {
        if self.hasher.verify(password, &user.password_hash).await? {
            Ok(())
        } else {
            warn!(user_id = %user.id, "incorrect password");
            Err(AuthError::IncorrectPassword)
        }
    }

    async fn set_password(&self, user: &User, password: &str) -> AuthResult<()> {
        let password_hash = self.hasher.hash(password).await?;
        self.facade
            .update_password(user.id, &password_hash)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => AuthError::UserNotFound,
                e => AuthError::store("failed to update password", e),
            })
    }
}

fn non_empty(field: &'static str, value: &str) -> AuthResult<()> {
    if value.is_empty() {
        Err(AuthError::EmptyField(field))
    } else {
        Ok(())
    }
}

/// Login routes identifiers by `@`, so usernames never contain one and
/// emails always do.
fn valid_username(field: &'static str, username: &str) -> AuthResult<()> {
    non_empty(field, username)?;
    if username.contains('@') {
        return Err(AuthError::UsernameContainsAt);
    }
    Ok(())
}

fn valid_email(field: &'static str, email: &str) -> AuthResult<()> {
    non_empty(field, email)?;
    if !email.contains('@') {
        return Err(AuthError::EmailMissingAt);
    }
    Ok(())
}

/// Translate identity writes: unique keys become domain conflicts.
fn identity_conflict(err: StoreError, context: &'static str) -> AuthError {
    if err.is_unique_violation_on(&UniqueKey::Username) {
        AuthError::UsernameExists
    } else if err.is_unique_violation_on(&UniqueKey::Email) {
        AuthError::EmailExists
    } else if matches!(err, StoreError::NotFound) {
        AuthError::UserNotFound
    } else {
        AuthError::store(context, err)
    }
}
