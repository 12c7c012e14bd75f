//! Password proofs (Argon2id PHC strings).

use argon2::password_hash::{PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher as _, PasswordVerifier as _};
use rand::RngCore;

use crate::error::{Error, Result};

/// "Produce a proof for a secret" / "verify a secret against a proof".
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &str) -> Result<String>;

    fn verify(&self, password: &str, proof: &str) -> Result<bool>;
}

/// Argon2id with the crate's default parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct Argon2Hasher;

impl PasswordHasher for Argon2Hasher {
    fn hash(&self, password: &str) -> Result<String> {
        let mut salt_bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut salt_bytes);
        let salt = SaltString::encode_b64(&salt_bytes)
            .map_err(|error| Error::Encryption(format!("salt encoding failed: {error}")))?;

        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|error| Error::Encryption(format!("password hashing failed: {error}")))
    }

    fn verify(&self, password: &str, proof: &str) -> Result<bool> {
        let parsed = PasswordHash::new(proof).map_err(|error| {
            Error::Database(format!("stored password hash is malformed: {error}"))
        })?;

        match Argon2::default().verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(error) => Err(Error::Encryption(format!(
                "password verification failed: {error}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let hasher = Argon2Hasher;
        let proof = hasher.hash("correct horse battery").unwrap();
        assert!(proof.starts_with("$argon2id$"));
        assert!(hasher.verify("correct horse battery", &proof).unwrap());
        assert!(!hasher.verify("wrong", &proof).unwrap());
    }

    #[test]
    fn hashes_are_salted() {
        let hasher = Argon2Hasher;
        assert_ne!(hasher.hash("same").unwrap(), hasher.hash("same").unwrap());
    }

    #[test]
    fn malformed_proof_is_an_error() {
        assert!(Argon2Hasher.verify("pw", "not-a-phc-string").is_err());
    }
}
