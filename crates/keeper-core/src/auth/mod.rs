//! Authentication boundary: bearer tokens and password proofs

mod password;
mod token;

pub use password::{Argon2Hasher, PasswordHasher};
pub use token::{peek_claims, Claims, Identity, IdentityVerifier, TokenError, TokenSigner};
