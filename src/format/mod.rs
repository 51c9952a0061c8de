//! Lock versions and the public lock state of an image.
//!
//! A lock version pins the cipher and the key derivation parameters. The
//! version travels with the image so old locks stay readable after newer
//! versions appear.

use serde::{Deserialize, Serialize};

use crate::{LockError, crypto::KdfParams};

pub mod v1;

/// A combination of cipher and key derivation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum LockVersion {
    Aes128GcmArgon2id,
}

impl LockVersion {
    /// The version new locks are sealed with.
    pub const LATEST: LockVersion = LockVersion::Aes128GcmArgon2id;

    pub fn as_u8(self) -> u8 {
        match self {
            LockVersion::Aes128GcmArgon2id => v1::VERSION_V1,
        }
    }

    pub fn kdf_params(self) -> KdfParams {
        match self {
            LockVersion::Aes128GcmArgon2id => v1::KDF_PARAMS,
        }
    }
}

impl TryFrom<u8> for LockVersion {
    type Error = LockError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            v1::VERSION_V1 => Ok(LockVersion::Aes128GcmArgon2id),
            other => Err(LockError::UnsupportedLockVersion(other)),
        }
    }
}

impl From<LockVersion> for u8 {
    fn from(version: LockVersion) -> Self {
        version.as_u8()
    }
}

impl std::fmt::Display for LockVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.as_u8())
    }
}

/// Whether an image is locked, and with what.
///
/// `version` is present exactly when `is_locked` is; `upgradable` only when
/// locked. Both constructors and deserialization enforce this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawLockState")]
pub struct LockState {
    is_locked: bool,
    version: Option<LockVersion>,
    upgradable: Option<bool>,
}

#[derive(Deserialize)]
struct RawLockState {
    is_locked: bool,
    #[serde(default)]
    version: Option<u8>,
    #[serde(default)]
    upgradable: Option<bool>,
}

impl TryFrom<RawLockState> for LockState {
    type Error = LockError;

    fn try_from(raw: RawLockState) -> Result<Self, Self::Error> {
        LockState::from_parts(raw.is_locked, raw.version, raw.upgradable)
    }
}

impl LockState {
    pub fn unlocked() -> Self {
        Self {
            is_locked: false,
            version: None,
            upgradable: None,
        }
    }

    pub fn locked(version: LockVersion) -> Self {
        Self {
            is_locked: true,
            version: Some(version),
            upgradable: Some(version < LockVersion::LATEST),
        }
    }

    /// Build a state from the loose values an API response carries.
    ///
    /// # Errors
    ///
    /// `UnsupportedLockVersion` for versions this crate does not implement,
    /// `InvalidLockState` when the fields contradict each other.
    pub fn from_parts(
        is_locked: bool,
        version: Option<u8>,
        upgradable: Option<bool>,
    ) -> Result<Self, LockError> {
        match (is_locked, version) {
            (true, Some(version)) => {
                let state = LockState::locked(LockVersion::try_from(version)?);
                // the server may know of versions newer than ours
                Ok(LockState {
                    upgradable: upgradable.or(state.upgradable),
                    ..state
                })
            }
            (true, None) => Err(LockError::InvalidLockState {
                reason: "locked image without a lock version".to_string(),
            }),
            (false, None) if upgradable.is_none() => Ok(LockState::unlocked()),
            (false, _) => Err(LockError::InvalidLockState {
                reason: "unlocked image carries lock details".to_string(),
            }),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.is_locked
    }

    pub fn version(&self) -> Option<LockVersion> {
        self.version
    }

    pub fn is_upgradable(&self) -> bool {
        self.upgradable.unwrap_or(false)
    }
}

impl Default for LockState {
    fn default() -> Self {
        Self::unlocked()
    }
}
