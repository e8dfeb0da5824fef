use std::sync::Arc;

use crate::config::AuthConfig;
use crate::credentials::{CredentialManager, PasswordDelivery};
use crate::error::AuthResult;
use crate::facade::Facade;
use crate::password::CredentialHasher;
use crate::permissions::PermissionEngine;
use crate::store::CredentialStore;
use crate::tokens::TokenManager;

/// The three managers wired over one store and one configuration.
///
/// Cheap to clone; every clone shares the same store handle.
pub struct AuthService<S: ?Sized> {
    tokens: TokenManager<S>,
    credentials: CredentialManager<S>,
    permissions: PermissionEngine<S>,
}

impl<S: ?Sized> Clone for AuthService<S> {
    fn clone(&self) -> Self {
        Self {
            tokens: self.tokens.clone(),
            credentials: self.credentials.clone(),
            permissions: self.permissions.clone(),
        }
    }
}

impl<S> AuthService<S>
where
    S: CredentialStore + ?Sized,
{
    /// Fails only if the hashing parameters are rejected by Argon2.
    pub fn new(store: Arc<S>, config: AuthConfig, delivery: Arc<dyn PasswordDelivery>) -> AuthResult<Self> {
        let config = Arc::new(config);
        let facade = Facade::new(store, config.store_timeout);
        let hasher = CredentialHasher::new(config.hashing)?;

        let tokens = TokenManager::new(facade.clone(), config.clone());
        let credentials = CredentialManager::new(facade.clone(), tokens.clone(), hasher, config, delivery);
        let permissions = PermissionEngine::new(facade);

        Ok(Self {
            tokens,
            credentials,
            permissions,
        })
    }

    pub fn tokens(&self) -> &TokenManager<S> {
        &self.tokens
    }

    pub fn credentials(&self) -> &CredentialManager<S> {
        &self.credentials
    }

    pub fn permissions(&self) -> &PermissionEngine<S> {
        &self.permissions
    }
}
