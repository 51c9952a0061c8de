use aes_gcm::{
    Aes128Gcm, Key,
    aead::{AeadInPlace, KeyInit, generic_array::GenericArray},
};
use zeroize::Zeroizing;

use super::{DerivedKey, EncryptedBlob, NONCE_LEN, TAG_LEN, secure_random};
use crate::LockError;

fn cipher(key: &DerivedKey) -> Aes128Gcm {
    Aes128Gcm::new(Key::<Aes128Gcm>::from_slice(key.as_bytes()))
}

/// Encrypt `plaintext` under `key` with a fresh random nonce.
///
/// `salt` is the salt `key` was derived from; it travels with the blob.
pub fn seal(key: &DerivedKey, salt: &[u8], plaintext: &[u8]) -> Result<EncryptedBlob, LockError> {
    let mut nonce = [0u8; NONCE_LEN];
    secure_random(&mut nonce)?;
    seal_with_nonce(key, salt, &nonce, plaintext)
}

/// Encrypt with a caller supplied nonce.
///
/// Reusing a nonce under the same key breaks confidentiality, so this stays
/// crate-private; [`seal`] is the only way in from outside.
pub(crate) fn seal_with_nonce(
    key: &DerivedKey,
    salt: &[u8],
    nonce: &[u8; NONCE_LEN],
    plaintext: &[u8],
) -> Result<EncryptedBlob, LockError> {
    let mut buffer = plaintext.to_vec();
    let tag = cipher(key)
        .encrypt_in_place_detached(GenericArray::from_slice(nonce), &[], &mut buffer)
        .map_err(|_| LockError::EncryptionFailed)?;

    Ok(EncryptedBlob::new(
        salt.to_vec(),
        nonce.to_vec(),
        buffer,
        tag.to_vec(),
    ))
}

/// Decrypt and authenticate `blob`.
///
/// Either the full plaintext comes back or an error does; a tag mismatch is
/// always `AuthenticationFailed`.
pub fn open(key: &DerivedKey, blob: &EncryptedBlob) -> Result<Zeroizing<Vec<u8>>, LockError> {
    if blob.nonce().len() != NONCE_LEN {
        return Err(LockError::malformed(format!(
            "nonce must be {NONCE_LEN} bytes, got {}",
            blob.nonce().len()
        )));
    }
    if blob.tag().len() != TAG_LEN {
        return Err(LockError::malformed(format!(
            "tag must be {TAG_LEN} bytes, got {}",
            blob.tag().len()
        )));
    }

    let mut buffer = Zeroizing::new(blob.ciphertext().to_vec());
    cipher(key)
        .decrypt_in_place_detached(
            GenericArray::from_slice(blob.nonce()),
            &[],
            buffer.as_mut_slice(),
            GenericArray::from_slice(blob.tag()),
        )
        .map_err(|_| LockError::AuthenticationFailed)?;

    Ok(buffer)
}
