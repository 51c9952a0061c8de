use argon2::{Algorithm, Argon2, Params, Version};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::{KEY_LEN, SALT_LEN, secure_random};
use crate::LockError;

/// Argon2id cost parameters.
///
/// Locks pin these per version (see [`crate::LockVersion::kdf_params`]);
/// arbitrary values are only useful for tests and tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    mem_cost_kib: u32,
    time_cost: u32,
    parallelism: u32,
}

impl KdfParams {
    pub fn new(mem_cost_kib: u32, time_cost: u32, parallelism: u32) -> Result<Self, LockError> {
        let params = Self {
            mem_cost_kib,
            time_cost,
            parallelism,
        };
        params.validate()?;
        Ok(params)
    }

    pub(crate) const fn pinned(mem_cost_kib: u32, time_cost: u32, parallelism: u32) -> Self {
        Self {
            mem_cost_kib,
            time_cost,
            parallelism,
        }
    }

    pub fn mem_cost_kib(&self) -> u32 {
        self.mem_cost_kib
    }

    pub fn time_cost(&self) -> u32 {
        self.time_cost
    }

    pub fn parallelism(&self) -> u32 {
        self.parallelism
    }

    pub fn key_len(&self) -> usize {
        KEY_LEN
    }

    pub fn validate(&self) -> Result<(), LockError> {
        let invalid = |reason: &str| LockError::InvalidKdfParams {
            reason: reason.to_string(),
        };
        if self.time_cost < 1 {
            return Err(invalid("time cost must be >= 1"));
        }
        if self.parallelism < 1 {
            return Err(invalid("parallelism must be >= 1"));
        }
        if self.mem_cost_kib < 8 * self.parallelism {
            return Err(invalid("memory cost must be at least 8 * parallelism"));
        }
        Ok(())
    }
}

/// A symmetric key derived from a password and salt.
///
/// Owned by the single operation that derived it and wiped on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey {
    bytes: [u8; KEY_LEN],
}

impl DerivedKey {
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Generate salt
pub fn generate_salt() -> Result<[u8; SALT_LEN], LockError> {
    let mut salt = [0u8; SALT_LEN];
    secure_random(&mut salt)?;
    Ok(salt)
}

/// Derive a lock key from `password` and `salt` with Argon2id v0x13.
///
/// Deliberately slow and memory hungry. Async callers should run this on a
/// blocking worker.
pub fn derive_key(password: &str, salt: &[u8], kdf: &KdfParams) -> Result<DerivedKey, LockError> {
    let params = Params::new(
        kdf.mem_cost_kib,
        kdf.time_cost,
        kdf.parallelism,
        Some(KEY_LEN),
    )
    .map_err(|e| LockError::KeyDerivationFailed {
        reason: format!("failed to construct Argon2 params: {e}"),
    })?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = DerivedKey {
        bytes: [0u8; KEY_LEN],
    };
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut key.bytes)
        .map_err(|e| LockError::KeyDerivationFailed {
            reason: format!("argon2 key derivation failed: {e}"),
        })?;

    Ok(key)
}

#[cfg(test)]
pub(crate) fn cheap_params() -> KdfParams {
    KdfParams::pinned(64, 1, 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LockVersion;

    #[test]
    fn kdf_is_deterministic() {
        let salt = [42u8; 16];
        let kdf = LockVersion::Aes128GcmArgon2id.kdf_params();

        let k1 = derive_key("password", &salt, &kdf).unwrap();
        let k2 = derive_key("password", &salt, &kdf).unwrap();

        assert_eq!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn different_salt_gives_different_key() {
        let kdf = cheap_params();

        let k1 = derive_key("password", &[1u8; 16], &kdf).unwrap();
        let k2 = derive_key("password", &[2u8; 16], &kdf).unwrap();

        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn kdf_params_affect_output() {
        let salt = [7u8; 16];

        let kdf1 = KdfParams::new(64, 1, 1).unwrap();
        let kdf2 = KdfParams::new(128, 1, 1).unwrap();

        let k1 = derive_key("pw", &salt, &kdf1).unwrap();
        let k2 = derive_key("pw", &salt, &kdf2).unwrap();

        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn kdf_invalid_params_fail_gracefully() {
        assert!(matches!(
            KdfParams::new(0, 0, 0),
            Err(LockError::InvalidKdfParams { .. })
        ));
        assert!(KdfParams::new(16, 1, 4).is_err());
    }

    #[test]
    fn short_salt_is_a_derivation_failure() {
        let err = derive_key("pw", &[1u8; 4], &cheap_params()).unwrap_err();
        assert!(matches!(err, LockError::KeyDerivationFailed { .. }));
    }

    #[test]
    fn debug_output_is_redacted() {
        let key = derive_key("pw", &[3u8; 16], &cheap_params()).unwrap();
        let printed = format!("{key:?}");
        assert!(printed.contains("REDACTED"));
    }

    #[test]
    fn generated_salts_differ() {
        assert_ne!(generate_salt().unwrap(), generate_salt().unwrap());
    }
}
