use argon2::{
    password_hash::{PasswordHash, PasswordHasher, SaltString},
    Argon2, PasswordVerifier,
};
use rand_core::OsRng;

pub const MIN_LENGTH: usize = 8;

pub fn hash_password(raw: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(raw.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?;
    Ok(hash.to_string())
}

/// False for a wrong password and for a malformed stored hash alike.
pub fn verify_password(raw: &str, stored: &str) -> bool {
    PasswordHash::new(stored)
        .map(|parsed| Argon2::default().verify_password(raw.as_bytes(), &parsed).is_ok())
        .unwrap_or(false)
}
