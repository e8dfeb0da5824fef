//! `keystone-auth`: credential, token and project-role core.
//!
//! Storage and transport are collaborators: the managers consume the
//! [`store`] traits and return [`AuthError`] values for the caller to map.

pub mod claims;
pub mod config;
pub mod credentials;
pub mod error;
pub mod facade;
pub mod model;
pub mod password;
pub mod permissions;
pub mod roles;
pub mod service;
pub mod store;
pub mod tokens;

pub use claims::AccessClaims;
pub use config::{AuthConfig, HashingParams, JwtSecret};
pub use credentials::{CredentialManager, DeliveryError, LogOnlyDelivery, PasswordDelivery};
pub use error::{AuthError, AuthResult, InternalError};
pub use facade::Facade;
pub use model::{NewUser, ProjectMember, ProjectPermission, RefreshToken, TokenPair, User};
pub use password::{generate_password, CredentialHasher, MIN_GENERATED_PASSWORD_LENGTH};
pub use permissions::{IntoRole, PermissionEngine};
pub use roles::{Role, UnknownRole};
pub use service::AuthService;
pub use store::{
    Constraint, CredentialStore, PermissionStore, RefreshTokenStore, StoreError, StoreResult, UniqueKey, UserStore,
};
pub use tokens::TokenManager;
