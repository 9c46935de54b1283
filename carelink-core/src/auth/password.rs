//! Password hashing
//!
//! Argon2id PHC strings. Hashes are opaque to the rest of the system: they
//! are produced here, stored verbatim, and only ever checked here.

use crate::{CoreError, Result};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::rngs::OsRng;
use rand::RngCore;
use std::sync::OnceLock;

pub fn hash_password(password: &str) -> Result<String> {
    let mut salt_bytes = [0u8; 16];
    OsRng.fill_bytes(&mut salt_bytes);
    let salt =
        SaltString::encode_b64(&salt_bytes).map_err(|e| CoreError::PasswordHash(e.to_string()))?;

    let phc = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| CoreError::PasswordHash(e.to_string()))?
        .to_string();
    Ok(phc)
}

/// False for a wrong password and for a hash that does not parse.
pub fn verify_password(hash: &str, password: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Check a login attempt. An account that does not exist is verified
/// against a fixed stand-in hash so both outcomes cost one Argon2 run.
pub fn verify_credentials(stored: Option<&str>, password: &str) -> bool {
    match stored {
        Some(hash) => verify_password(hash, password),
        None => {
            verify_password(stand_in_hash(), password);
            false
        }
    }
}

/// Argon2id hash of a random secret, made once per process.
fn stand_in_hash() -> &'static str {
    static STAND_IN: OnceLock<String> = OnceLock::new();
    STAND_IN.get_or_init(|| {
        let mut secret = [0u8; 32];
        OsRng.fill_bytes(&mut secret);
        let secret = SaltString::encode_b64(&secret)
            .map(|s| s.as_str().to_owned())
            .unwrap_or_default();
        hash_password(&secret).unwrap_or_default()
    })
}
