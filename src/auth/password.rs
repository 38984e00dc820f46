//! Password hashing and verification.

use anyhow::{Context, Result};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use once_cell::sync::Lazy;

/// Minimum password length accepted by the policy.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Maximum password length; bounds hashing cost on attacker-supplied input.
pub const MAX_PASSWORD_LENGTH: usize = 128;

/// Digest verified when no account matches, so the not-found path costs the
/// same as a wrong password against a real account.
static DUMMY_DIGEST: Lazy<String> =
    Lazy::new(|| hash_password("gardisto-dummy-credential").unwrap_or_default());

/// Password complexity requirements enforced by the registration and
/// password-reset validators.
#[derive(Clone, Copy, Debug)]
pub struct PasswordRequirements {
    pub min_length: usize,
    pub max_length: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_digit: bool,
    pub require_special: bool,
}

impl Default for PasswordRequirements {
    fn default() -> Self {
        Self {
            min_length: MIN_PASSWORD_LENGTH,
            max_length: MAX_PASSWORD_LENGTH,
            require_uppercase: true,
            require_lowercase: true,
            require_digit: true,
            require_special: true,
        }
    }
}

impl PasswordRequirements {
    /// Check a candidate password, returning the first unmet requirement as a
    /// client-facing message.
    #[must_use]
    pub fn check(&self, password: &str) -> Option<String> {
        if password.len() < self.min_length {
            return Some(format!(
                "Password must be at least {} characters",
                self.min_length
            ));
        }
        if password.len() > self.max_length {
            return Some(format!(
                "Password cannot exceed {} characters",
                self.max_length
            ));
        }
        if self.require_uppercase && !password.chars().any(char::is_uppercase) {
            return Some("Password must contain an uppercase letter".to_string());
        }
        if self.require_lowercase && !password.chars().any(char::is_lowercase) {
            return Some("Password must contain a lowercase letter".to_string());
        }
        if self.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
            return Some("Password must contain a digit".to_string());
        }
        if self.require_special && !password.chars().any(|c| !c.is_alphanumeric()) {
            return Some("Password must contain a special character".to_string());
        }
        None
    }
}

/// Hash a password with argon2id and a fresh random salt.
///
/// # Errors
/// Returns an error if hashing fails; callers must surface this as an
/// internal error, never as a successful verification.
pub fn hash_password(plain: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let digest = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|err| anyhow::anyhow!("argon2 hashing failed: {err}"))?
        .to_string();
    Ok(digest)
}

/// Verify a password against a stored PHC-format digest.
///
/// Malformed digests verify as `false`; they are a persistence bug, not a
/// reason to accept the credential.
#[must_use]
pub fn verify_password(digest: &str, plain: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(digest) else {
        return false;
    };
    Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok()
}

/// Burn the same hashing cost as a real verification and always fail.
pub fn verify_dummy(plain: &str) {
    let _ = verify_password(&DUMMY_DIGEST, plain);
}

/// Convenience wrapper used by tests and bootstrap code.
///
/// # Errors
/// See [`hash_password`].
pub fn hash_password_checked(plain: &str, requirements: &PasswordRequirements) -> Result<String> {
    if let Some(problem) = requirements.check(plain) {
        anyhow::bail!(problem);
    }
    hash_password(plain).context("failed to hash password")
}
