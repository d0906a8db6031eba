use argon2::{
    password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use tracing::error;

use super::errors::{ModelError, Result};

/// Hash `plain` with the server-side pepper appended.
pub fn hash_password(plain: &str, pepper: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let peppered = format!("{plain}{pepper}");
    let hash = Argon2::default()
        .hash_password(peppered.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            ModelError::PasswordHash(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

/// A mismatch is `PasswordIncorrect`; anything else is surfaced as-is.
pub fn verify_password(plain: &str, pepper: &str, hash: &str) -> Result<()> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        ModelError::PasswordHash(e.to_string())
    })?;
    let peppered = format!("{plain}{pepper}");
    match Argon2::default().verify_password(peppered.as_bytes(), &parsed) {
        Ok(()) => Ok(()),
        Err(password_hash::Error::Password) => Err(ModelError::PasswordIncorrect),
        Err(e) => Err(ModelError::PasswordHash(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PEPPER: &str = "secret-random-string";

    #[test]
    fn hash_and_verify_roundtrip() {
        let password = "Secur3P@ssw0rd!";
        let hash = hash_password(password, PEPPER).expect("hashing should succeed");
        verify_password(password, PEPPER, &hash).expect("verify should succeed");
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let hash = hash_password("correct-horse-battery-staple", PEPPER).unwrap();
        let err = verify_password("wrong-password", PEPPER, &hash).unwrap_err();
        assert!(matches!(err, ModelError::PasswordIncorrect));
    }

    #[test]
    fn verify_depends_on_pepper() {
        let hash = hash_password("correct-horse-battery-staple", PEPPER).unwrap();
        let err = verify_password("correct-horse-battery-staple", "other", &hash).unwrap_err();
        assert!(matches!(err, ModelError::PasswordIncorrect));
    }

    #[test]
    fn verify_errors_on_malformed_hash() {
        let err = verify_password("anything", PEPPER, "not-a-valid-hash").unwrap_err();
        assert!(matches!(err, ModelError::PasswordHash(_)));
    }
}
