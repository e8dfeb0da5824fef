//! Process-wide, read-only configuration injected into the managers.

use std::sync::Arc;
use std::time::Duration;

/// HMAC key used to sign access tokens.
///
/// Loaded once at startup and shared read-only. `Debug` never prints the key.
#[derive(Clone)]
pub struct JwtSecret(Arc<[u8]>);

impl JwtSecret {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self(Arc::from(secret.as_ref()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl core::fmt::Debug for JwtSecret {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("JwtSecret(<redacted>)")
    }
}

/// Argon2id cost parameters.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct HashingParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashingParams {
    /// OWASP-recommended Argon2id baseline.
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl HashingParams {
    /// Cheapest parameters Argon2 accepts. Only for tests.
    pub fn insecure_fast() -> Self {
        Self {
            memory_kib: 8,
            iterations: 1,
            parallelism: 1,
        }
    }
}

/// Configuration shared by the token, credential and permission managers.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: JwtSecret,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    /// Upper bound for a single store call.
    pub store_timeout: Duration,
    /// Length of passwords generated by the forgot-password flow.
    pub generated_password_length: usize,
    pub hashing: HashingParams,
}

impl AuthConfig {
    pub const DEFAULT_ACCESS_TOKEN_TTL: Duration = Duration::from_secs(15 * 60);
    pub const DEFAULT_REFRESH_TOKEN_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
    pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);
    pub const DEFAULT_GENERATED_PASSWORD_LENGTH: usize = 16;

    pub fn new(jwt_secret: JwtSecret) -> Self {
        Self {
            jwt_secret,
            access_token_ttl: Self::DEFAULT_ACCESS_TOKEN_TTL,
            refresh_token_ttl: Self::DEFAULT_REFRESH_TOKEN_TTL,
            store_timeout: Self::DEFAULT_STORE_TIMEOUT,
            generated_password_length: Self::DEFAULT_GENERATED_PASSWORD_LENGTH,
            hashing: HashingParams::default(),
        }
    }

    pub fn with_hashing(mut self, hashing: HashingParams) -> Self {
        self.hashing = hashing;
        self
    }

    pub fn with_token_ttls(mut self, access: Duration, refresh: Duration) -> Self {
        self.access_token_ttl = access;
        self.refresh_token_ttl = refresh;
        self
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }
}
