//! Client-side locking for Iamages images.
//!
//! A locked image has its metadata and its image bytes encrypted separately
//! with AES-128-GCM under keys derived from the same password by Argon2id,
//! each with its own salt. Salt, nonce and tag travel next to the body as
//! base64 headers. [`LockClient`] fetches, decrypts, re-encrypts and unlocks
//! images through an injected [`ImageTransport`].

pub mod credentials;
pub mod crypto;
mod error;
pub mod format;
pub mod metadata;
mod storage;
pub mod transport;

pub use crate::credentials::{CredentialProvider, Credentials, StaticCredentials};
pub use crate::crypto::{EncryptedBlob, KdfParams, SideChannel};
pub use crate::error::LockError;
pub use crate::format::{LockState, LockVersion};
pub use crate::metadata::ImageMetadata;
pub use crate::transport::{
    ImageEdit, ImageTransport, LockPayload, LockUpdate, TransportResponse, fs::FsTransport,
};

use directories::ProjectDirs;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

/// The public, non-secret view of an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    id: String,
    lock: LockState,
}

impl ImageRef {
    pub fn new(id: impl Into<String>, lock: LockState) -> Self {
        Self {
            id: id.into(),
            lock,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn lock(&self) -> &LockState {
        &self.lock
    }
}

/// Decrypted metadata plus the salt it was locked with.
///
/// Keep `salt` around to re-encrypt edited metadata later; it cannot be
/// recovered from anything else. `None` for unlocked images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedMetadata {
    pub metadata: ImageMetadata,
    pub salt: Option<Vec<u8>>,
}

/// Image bytes ready for display.
#[derive(Debug)]
pub struct DecryptedImage {
    pub bytes: Zeroizing<Vec<u8>>,
    /// False for locked images: the plaintext must not reach any cache.
    pub cacheable: bool,
}

/// A requested change to an image's lock.
pub enum LockChange {
    /// Lock an unlocked image.
    Enable { new_password: Zeroizing<String> },
    /// Re-lock a locked image under a new password at the latest version.
    ChangePassword {
        old_password: Zeroizing<String>,
        new_password: Zeroizing<String>,
    },
    /// Re-lock a locked image under the same password at the latest version.
    /// Only applies when the lock state reports a newer version.
    Upgrade { password: Zeroizing<String> },
    /// Remove the lock.
    Disable { old_password: Zeroizing<String> },
}

/// The plaintext artifacts a lock change writes back.
#[derive(Debug, Clone)]
pub struct LockPlaintext {
    pub metadata: ImageMetadata,
    pub image: Vec<u8>,
}

/// Drives the lock protocol against a transport.
///
/// No key material outlives a single call: every operation derives its own
/// keys from the password and drops them before returning.
pub struct LockClient<T, C> {
    transport: T,
    credentials: C,
}

fn require_password(password: &str) -> Result<(), LockError> {
    if password.is_empty() {
        return Err(LockError::MissingUnlockKey);
    }
    Ok(())
}

fn locked_version(image: &ImageRef) -> Result<LockVersion, LockError> {
    image.lock.version().ok_or(LockError::NotLocked)
}

/// Key derivation failures are not user-correctable; leave a trace of them.
fn log_kdf_failure<R>(id: &str, version: LockVersion, result: &Result<R, LockError>) {
    if let Err(LockError::KeyDerivationFailed { reason }) = result {
        warn!(id, %version, %reason, "lock key derivation failed");
    }
}

/// Derive a key from `password` and the blob's salt, then open the blob.
async fn open_blob(
    id: &str,
    password: &str,
    blob: EncryptedBlob,
    version: LockVersion,
) -> Result<Zeroizing<Vec<u8>>, LockError> {
    let password = Zeroizing::new(password.to_string());
    let result = tokio::task::spawn_blocking(move || {
        let key = crypto::derive_key(&password, blob.salt(), &version.kdf_params())?;
        crypto::open(&key, &blob)
    })
    .await?;
    log_kdf_failure(id, version, &result);
    result
}

/// Seal `plaintext` under a brand new salt.
async fn seal_fresh(
    id: &str,
    password: Zeroizing<String>,
    plaintext: Zeroizing<Vec<u8>>,
    version: LockVersion,
) -> Result<EncryptedBlob, LockError> {
    let result = tokio::task::spawn_blocking(move || {
        let salt = crypto::generate_salt()?;
        let key = crypto::derive_key(&password, &salt, &version.kdf_params())?;
        crypto::seal(&key, &salt, &plaintext)
    })
    .await?;
    log_kdf_failure(id, version, &result);
    result
}

impl<T, C> LockClient<T, C>
where
    T: ImageTransport,
    C: CredentialProvider,
{
    pub fn new(transport: T, credentials: C) -> Self {
        Self {
            transport,
            credentials,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    async fn fetch_metadata_response(&self, id: &str) -> Result<TransportResponse, LockError> {
        let auth = self.credentials.credentials();
        self.transport
            .fetch_metadata(id, auth.as_ref())
            .await
            .map_err(LockError::Transport)
    }

    async fn fetch_image_response(&self, id: &str) -> Result<TransportResponse, LockError> {
        let auth = self.credentials.credentials();
        self.transport
            .fetch_image(id, auth.as_ref())
            .await
            .map_err(LockError::Transport)
    }

    async fn submit(&self, id: &str, edit: &ImageEdit) -> Result<(), LockError> {
        let auth = self.credentials.credentials();
        self.transport
            .submit_edit(id, edit, auth.as_ref())
            .await
            .map_err(LockError::Transport)
    }

    /// Fetch the current metadata blob and open it with `password`.
    ///
    /// This is the authorization proof every transition out of a locked
    /// state goes through.
    async fn prove_key(
        &self,
        image: &ImageRef,
        password: &str,
        version: LockVersion,
    ) -> Result<(), LockError> {
        let response = self.fetch_metadata_response(&image.id).await?;
        let blob = EncryptedBlob::from_transport(response.body, &response.side_channel)?;
        open_blob(&image.id, password, blob, version).await?;
        debug!(id = %image.id, %version, "lock key verified");
        Ok(())
    }

    /// Fetch an image's metadata, decrypting it if the image is locked.
    ///
    /// # Errors
    ///
    /// `MissingUnlockKey` for a locked image and an empty password, before
    /// any fetch or key derivation happens. `MalformedEncryptedResponse` when
    /// lock headers are missing or broken, `AuthenticationFailed` for a wrong
    /// password or damaged data.
    pub async fn fetch_and_decrypt_metadata(
        &self,
        image: &ImageRef,
        password: &str,
    ) -> Result<DecryptedMetadata, LockError> {
        if !image.lock.is_locked() {
            let response = self.fetch_metadata_response(&image.id).await?;
            return Ok(DecryptedMetadata {
                metadata: ImageMetadata::from_bytes(&response.body)?,
                salt: None,
            });
        }

        require_password(password)?;
        let version = locked_version(image)?;

        let response = self.fetch_metadata_response(&image.id).await?;
        let blob = EncryptedBlob::from_transport(response.body, &response.side_channel)?;
        let salt = blob.salt().to_vec();
        debug!(id = %image.id, %version, bytes = blob.ciphertext().len(), "decrypting metadata");

        let plaintext = open_blob(&image.id, password, blob, version).await?;
        Ok(DecryptedMetadata {
            metadata: ImageMetadata::from_bytes(&plaintext)?,
            salt: Some(salt),
        })
    }

    /// Fetch an image's bytes, decrypting them if the image is locked.
    ///
    /// Errors as for [`Self::fetch_and_decrypt_metadata`].
    pub async fn fetch_and_decrypt_image_bytes(
        &self,
        image: &ImageRef,
        password: &str,
    ) -> Result<DecryptedImage, LockError> {
        if !image.lock.is_locked() {
            let response = self.fetch_image_response(&image.id).await?;
            return Ok(DecryptedImage {
                bytes: Zeroizing::new(response.body),
                cacheable: true,
            });
        }

        require_password(password)?;
        let version = locked_version(image)?;

        let response = self.fetch_image_response(&image.id).await?;
        let blob = EncryptedBlob::from_transport(response.body, &response.side_channel)?;
        debug!(id = %image.id, %version, bytes = blob.ciphertext().len(), "decrypting image");

        Ok(DecryptedImage {
            bytes: open_blob(&image.id, password, blob, version).await?,
            cacheable: false,
        })
    }

    /// Compute the bodies and state for a lock change without submitting it.
    ///
    /// Metadata and image are always sealed independently: two salts, two
    /// keys, two nonces. Transitions out of a locked state first prove the
    /// old password against the stored metadata; if that fails nothing is
    /// produced.
    ///
    /// # Errors
    ///
    /// `AlreadyLocked` / `NotLocked` for transitions that do not apply to the
    /// image's current state, `NotUpgradable` when upgrading an image that is
    /// already at the latest version, `MissingUnlockKey` for empty passwords,
    /// `AuthenticationFailed` when the old password does not open the image.
    pub async fn apply_lock(
        &self,
        image: &ImageRef,
        change: LockChange,
        plaintext: LockPlaintext,
    ) -> Result<LockUpdate, LockError> {
        let new_password = match change {
            LockChange::Enable { new_password } => {
                if image.lock.is_locked() {
                    return Err(LockError::AlreadyLocked);
                }
                require_password(&new_password)?;
                new_password
            }
            LockChange::ChangePassword {
                old_password,
                new_password,
            } => {
                let version = locked_version(image)?;
                require_password(&old_password)?;
                require_password(&new_password)?;
                self.prove_key(image, &old_password, version).await?;
                new_password
            }
            LockChange::Upgrade { password } => {
                let version = locked_version(image)?;
                if !image.lock.is_upgradable() {
                    return Err(LockError::NotUpgradable);
                }
                require_password(&password)?;
                self.prove_key(image, &password, version).await?;
                password
            }
            LockChange::Disable { old_password } => {
                let version = locked_version(image)?;
                require_password(&old_password)?;
                self.prove_key(image, &old_password, version).await?;
                info!(id = %image.id, "lock removal authorized");
                return Ok(LockUpdate {
                    payload: LockPayload::Plain {
                        metadata: plaintext.metadata.to_bytes()?,
                        image: plaintext.image,
                    },
                    lock: LockState::unlocked(),
                });
            }
        };

        let version = LockVersion::LATEST;
        let metadata = Zeroizing::new(plaintext.metadata.to_bytes()?);
        let image_bytes = Zeroizing::new(plaintext.image);
        let (metadata, image_blob) = tokio::try_join!(
            seal_fresh(&image.id, new_password.clone(), metadata, version),
            seal_fresh(&image.id, new_password, image_bytes, version),
        )?;
        info!(id = %image.id, %version, "sealed image under new lock");

        Ok(LockUpdate {
            payload: LockPayload::Sealed {
                metadata,
                image: image_blob,
            },
            lock: LockState::locked(version),
        })
    }

    /// [`Self::apply_lock`], then submit the result.
    ///
    /// Nothing is submitted unless the authorization proof succeeded.
    pub async fn commit_lock(
        &self,
        image: &ImageRef,
        change: LockChange,
        plaintext: LockPlaintext,
    ) -> Result<LockState, LockError> {
        let update = self.apply_lock(image, change, plaintext).await?;
        let lock = update.lock;
        self.submit(&image.id, &ImageEdit::Lock(update)).await?;
        info!(id = %image.id, locked = lock.is_locked(), "lock change submitted");
        Ok(lock)
    }

    /// Change the description of an image, re-encrypting metadata if locked.
    ///
    /// Locked images reuse the salt retained in `current`, verify `password`
    /// against the stored metadata, and seal with a fresh nonce.
    ///
    /// # Errors
    ///
    /// `MissingSalt` when `current` has no salt or its salt no longer matches
    /// the stored metadata, `MissingUnlockKey` for an empty password,
    /// `AuthenticationFailed` for a wrong one.
    pub async fn update_description(
        &self,
        image: &ImageRef,
        password: &str,
        current: &DecryptedMetadata,
        description: &str,
    ) -> Result<DecryptedMetadata, LockError> {
        let mut metadata = current.metadata.clone();
        metadata.set_description(description.to_string());

        if !image.lock.is_locked() {
            self.submit(&image.id, &ImageEdit::Description(description.to_string()))
                .await?;
            return Ok(DecryptedMetadata {
                metadata,
                salt: None,
            });
        }

        require_password(password)?;
        let version = locked_version(image)?;
        let salt = current.salt.clone().ok_or(LockError::MissingSalt)?;

        let response = self.fetch_metadata_response(&image.id).await?;
        let stored = EncryptedBlob::from_transport(response.body, &response.side_channel)?;
        if stored.salt() != salt.as_slice() {
            return Err(LockError::MissingSalt);
        }

        let password = Zeroizing::new(password.to_string());
        let plaintext = Zeroizing::new(metadata.to_bytes()?);
        let task_salt = salt.clone();
        let sealed = tokio::task::spawn_blocking(move || {
            let key = crypto::derive_key(&password, &task_salt, &version.kdf_params())?;
            crypto::open(&key, &stored)?;
            crypto::seal(&key, &task_salt, &plaintext)
        })
        .await?;
        log_kdf_failure(&image.id, version, &sealed);
        let sealed = sealed?;

        self.submit(&image.id, &ImageEdit::SealedMetadata(sealed))
            .await?;
        debug!(id = %image.id, "re-sealed metadata");

        Ok(DecryptedMetadata {
            metadata,
            salt: Some(salt),
        })
    }

    pub async fn set_privacy(&self, image: &ImageRef, private: bool) -> Result<(), LockError> {
        self.submit(&image.id, &ImageEdit::Privacy(private)).await
    }
}

/// Default directory for [`FsTransport`] images.
pub fn default_root() -> anyhow::Result<std::path::PathBuf> {
    use anyhow::Context;

    let project_dirs = ProjectDirs::from("", "", "iamages-lock")
        .context("could not determine platform directories")?;

    Ok(project_dirs.data_dir().join("images"))
}
