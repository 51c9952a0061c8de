//! Cryptographic primitives for image locks.
//!
//! Provides key derivation, authenticated encryption, and the transport
//! representation of an encrypted body.

pub mod aead;
pub mod blob;
pub mod kdf;

pub use aead::{open, seal};
pub use blob::{EncryptedBlob, SideChannel};
pub use kdf::{DerivedKey, KdfParams, derive_key, generate_salt};

use getrandom::fill;

use crate::LockError;

/// Length of freshly generated salts (16 bytes).
pub const SALT_LEN: usize = 16;
/// Length of the nonce (12 bytes for AES-GCM).
pub const NONCE_LEN: usize = 12;
/// Length of the authentication tag (16 bytes for AES-GCM).
pub const TAG_LEN: usize = 16;
/// Length of the derived key (16 bytes / 128 bits).
pub const KEY_LEN: usize = 16;

/// Fill buffer with cryptographically secure random bytes
pub(crate) fn secure_random(buf: &mut [u8]) -> Result<(), LockError> {
    fill(buf).map_err(|_| LockError::Random)
}
