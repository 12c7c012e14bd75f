//! Encryption gateway
//!
//! Payloads are encrypted on a copy right before they leave the client and
//! again (optionally) before the server persists them. Both sides go through
//! the [`Cipher`] capability so tests can swap in [`PassthroughCipher`].

mod aes;

pub use aes::{AesGcmCipher, EncryptionKey, KEY_SIZE, NONCE_SIZE, TAG_SIZE};

use crate::error::Result;

/// Symmetric `encrypt(bytes) -> bytes` / `decrypt(bytes) -> bytes` capability.
///
/// Implementations are not required to be deterministic.
pub trait Cipher: Send + Sync {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>>;

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>>;
}

/// Identity cipher, used when at-rest encryption is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughCipher;

impl Cipher for PassthroughCipher {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        Ok(plaintext.to_vec())
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        Ok(ciphertext.to_vec())
    }
}

impl<C: Cipher + ?Sized> Cipher for std::sync::Arc<C> {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        (**self).encrypt(plaintext)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        (**self).decrypt(ciphertext)
    }
}

impl<C: Cipher + ?Sized> Cipher for Box<C> {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        (**self).encrypt(plaintext)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        (**self).decrypt(ciphertext)
    }
}
