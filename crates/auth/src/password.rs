//! Password hashing (Argon2id) and random password generation.
//!
//! Hashing is slow, so both hashing and verification run on the
//! blocking thread pool.

use argon2::password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::seq::SliceRandom;
use rand::{CryptoRng, Rng, RngCore};

use crate::config::HashingParams;
use crate::error::{AuthError, AuthResult, InternalError};

const LOWERCASE: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPERCASE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &[u8] = b"0123456789";
const SYMBOLS: &[u8] = b"!@#$%^&*()-_=+[]{}<>?";

const CLASSES: [&[u8]; 4] = [LOWERCASE, UPPERCASE, DIGITS, SYMBOLS];

/// Generated passwords are never shorter than this.
pub const MIN_GENERATED_PASSWORD_LENGTH: usize = 8;

/// Argon2id hasher with fixed cost parameters.
#[derive(Debug, Clone)]
pub struct CredentialHasher {
    params: Params,
}

impl CredentialHasher {
    pub fn new(params: HashingParams) -> AuthResult<Self> {
        let params = Params::new(params.memory_kib, params.iterations, params.parallelism, None)
            .map_err(|e| AuthError::internal("invalid hashing parameters", InternalError::Hashing(e.to_string())))?;
        Ok(Self { params })
    }

    fn argon2(params: Params) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
    }

    /// Hash `password` into a PHC string with a fresh 16-byte salt.
    pub async fn hash(&self, password: &str) -> AuthResult<String> {
        let params = self.params.clone();
        let password = password.to_owned();

        tokio::task::spawn_blocking(move || hash_blocking(params, &password))
            .await
            .map_err(|e| AuthError::internal("failed to hash password", InternalError::Task(e.to_string())))?
    }

    /// Check `password` against a stored PHC hash.
    ///
    /// `Ok(false)` means the password does not match; a hash that cannot be
    /// parsed is an internal error.
    pub async fn verify(&self, password: &str, password_hash: &str) -> AuthResult<bool> {
        let password = password.to_owned();
        let password_hash = password_hash.to_owned();

        tokio::task::spawn_blocking(move || verify_blocking(&password, &password_hash))
            .await
            .map_err(|e| AuthError::internal("failed to verify password", InternalError::Task(e.to_string())))?
    }
}

fn hash_blocking(params: Params, password: &str) -> AuthResult<String> {
    let mut salt_bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| AuthError::internal("failed to hash password", InternalError::Hashing(e.to_string())))?;

    CredentialHasher::argon2(params)
        .hash_password(password.as_bytes(), &salt)
        .map(|phc| phc.to_string())
        .map_err(|e| AuthError::internal("failed to hash password", InternalError::Hashing(e.to_string())))
}

fn verify_blocking(password: &str, password_hash: &str) -> AuthResult<bool> {
    let parsed = PasswordHash::new(password_hash)
        .map_err(|e| AuthError::internal("stored password hash is malformed", InternalError::Hashing(e.to_string())))?;

    // Cost parameters are read from the PHC string, not from `self`.
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Generate a random password of `length` characters (at least
/// [`MIN_GENERATED_PASSWORD_LENGTH`]) containing at least one lowercase
/// letter, uppercase letter, digit and symbol, in shuffled order.
pub fn generate_password<R>(length: usize, rng: &mut R) -> String
where
    R: Rng + CryptoRng + ?Sized,
{
    let length = length.max(MIN_GENERATED_PASSWORD_LENGTH);
    let alphabet: Vec<u8> = CLASSES.concat();

    let mut chars: Vec<u8> = Vec::with_capacity(length);
    for class in CLASSES {
        chars.push(class[rng.gen_range(0..class.len())]);
    }
    while chars.len() < length {
        chars.push(alphabet[rng.gen_range(0..alphabet.len())]);
    }
    chars.shuffle(rng);

    chars.into_iter().map(char::from).collect()
}
