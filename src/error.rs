use thiserror::Error;

/// Every way a lock operation can fail.
///
/// Callers match on these to decide whether to re-prompt for a password,
/// re-fetch, or give up. `AuthenticationFailed` deliberately does not say
/// whether the password was wrong or the data was damaged.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("image is locked and no unlock key was provided")]
    MissingUnlockKey,

    #[error("no lock salt available for re-encrypting this image")]
    MissingSalt,

    #[error("malformed encrypted response: {reason}")]
    MalformedEncryptedResponse { reason: String },

    #[error("incorrect key or corrupted data")]
    AuthenticationFailed,

    #[error("key derivation failed: {reason}")]
    KeyDerivationFailed { reason: String },

    #[error("unsupported lock version {0}, please update the app")]
    UnsupportedLockVersion(u8),

    #[error("encryption failed: plaintext too large")]
    EncryptionFailed,

    #[error("image is already at the latest lock version")]
    NotUpgradable,

    #[error("invalid Argon2 parameters: {reason}")]
    InvalidKdfParams { reason: String },

    #[error("invalid lock state: {reason}")]
    InvalidLockState { reason: String },

    #[error("image is already locked")]
    AlreadyLocked,

    #[error("image is not locked")]
    NotLocked,

    #[error("OS random generator unavailable")]
    Random,

    #[error("decrypted metadata is not valid: {0}")]
    InvalidMetadata(#[from] serde_json::Error),

    #[error("transport error: {0:#}")]
    Transport(#[source] anyhow::Error),

    #[error("crypto worker failed: {0}")]
    Worker(String),
}

impl LockError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        LockError::MalformedEncryptedResponse {
            reason: reason.into(),
        }
    }

    /// True when asking the user for the password again is the right recovery.
    pub fn is_retryable_with_new_password(&self) -> bool {
        matches!(
            self,
            LockError::MissingUnlockKey | LockError::AuthenticationFailed
        )
    }
}

impl From<tokio::task::JoinError> for LockError {
    fn from(e: tokio::task::JoinError) -> Self {
        LockError::Worker(e.to_string())
    }
}
