//! A transport that keeps images in a local directory.
//!
//! Layout per image id:
//! ```text
//! <root>/<id>/record.json    lock state, privacy, lock headers
//! <root>/<id>/metadata.bin   metadata body (plain JSON or ciphertext)
//! <root>/<id>/image.bin      image body (plain bytes or ciphertext)
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ImageEdit, ImageTransport, LockPayload, TransportResponse};
use crate::{
    ImageRef, credentials::Credentials, crypto::EncryptedBlob, crypto::SideChannel,
    format::LockState, metadata::ImageMetadata, storage::Storage,
};

const RECORD_FILE: &str = "record.json";
const METADATA_FILE: &str = "metadata.bin";
const IMAGE_FILE: &str = "image.bin";

#[derive(Serialize, Deserialize, Debug, Default)]
struct Record {
    lock: LockState,
    #[serde(default)]
    private: bool,
    #[serde(default)]
    metadata_headers: BTreeMap<String, String>,
    #[serde(default)]
    image_headers: BTreeMap<String, String>,
}

#[derive(Clone, Copy)]
enum Artifact {
    Metadata,
    Image,
}

fn headers_to_side_channel(headers: &BTreeMap<String, String>) -> SideChannel {
    SideChannel::from_headers(headers.iter().map(|(k, v)| (k.as_str(), v.as_str())))
}

fn side_channel_to_headers(side_channel: &SideChannel) -> BTreeMap<String, String> {
    side_channel
        .to_headers()
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

fn validate_id(id: &str) -> Result<()> {
    if id.is_empty()
        || !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        bail!("invalid image id '{id}'");
    }
    Ok(())
}

/// Directory-backed [`ImageTransport`].
///
/// Credentials are accepted and ignored; the directory is trusted.
#[derive(Clone, Debug)]
pub struct FsTransport {
    storage: Storage,
}

impl FsTransport {
    pub fn new(root: PathBuf) -> Self {
        Self {
            storage: Storage::new(root),
        }
    }

    pub fn root(&self) -> &Path {
        self.storage.root()
    }

    fn path(id: &str, file: &str) -> PathBuf {
        Path::new(id).join(file)
    }

    /// Adds a new, unlocked image.
    pub fn import(&self, id: &str, metadata: &ImageMetadata, image: &[u8]) -> Result<()> {
        validate_id(id)?;
        if self.storage.exists(&Self::path(id, RECORD_FILE))? {
            bail!("image '{id}' already exists");
        }

        self.storage
            .save(&Self::path(id, METADATA_FILE), &metadata.to_bytes()?)?;
        self.storage.save(&Self::path(id, IMAGE_FILE), image)?;
        self.save_record(id, &Record::default())?;
        tracing::info!(id, "imported image");
        Ok(())
    }

    /// The public view of `id`.
    pub fn image_ref(&self, id: &str) -> Result<ImageRef> {
        let record = self.load_record(id)?;
        Ok(ImageRef::new(id, record.lock))
    }

    pub fn is_private(&self, id: &str) -> Result<bool> {
        Ok(self.load_record(id)?.private)
    }

    fn load_record(&self, id: &str) -> Result<Record> {
        validate_id(id)?;
        let path = Self::path(id, RECORD_FILE);
        if !self.storage.exists(&path)? {
            bail!("image '{id}' does not exist");
        }
        serde_json::from_slice(&self.storage.load(&path)?)
            .with_context(|| format!("corrupted record for image '{id}'"))
    }

    fn save_record(&self, id: &str, record: &Record) -> Result<()> {
        self.storage
            .save(&Self::path(id, RECORD_FILE), &serde_json::to_vec_pretty(record)?)
    }

    fn read(&self, id: &str, artifact: Artifact) -> Result<TransportResponse> {
        let record = self.load_record(id)?;
        let (file, headers) = match artifact {
            Artifact::Metadata => (METADATA_FILE, &record.metadata_headers),
            Artifact::Image => (IMAGE_FILE, &record.image_headers),
        };
        Ok(TransportResponse {
            body: self.storage.load(&Self::path(id, file))?,
            side_channel: headers_to_side_channel(headers),
        })
    }

    fn write_blob(&self, id: &str, file: &str, blob: &EncryptedBlob) -> Result<BTreeMap<String, String>> {
        let (body, side_channel) = blob.to_transport();
        self.storage.save(&Self::path(id, file), &body)?;
        Ok(side_channel_to_headers(&side_channel))
    }

    fn apply(&self, id: &str, edit: &ImageEdit) -> Result<()> {
        let mut record = self.load_record(id)?;
        match edit {
            ImageEdit::Description(description) => {
                if record.lock.is_locked() {
                    bail!("plain description edit on locked image '{id}'");
                }
                let path = Self::path(id, METADATA_FILE);
                let mut metadata = ImageMetadata::from_bytes(&self.storage.load(&path)?)?;
                metadata.set_description(description.clone());
                self.storage.save(&path, &metadata.to_bytes()?)?;
            }
            ImageEdit::Privacy(private) => {
                record.private = *private;
            }
            ImageEdit::SealedMetadata(blob) => {
                if !record.lock.is_locked() {
                    bail!("sealed metadata edit on unlocked image '{id}'");
                }
                record.metadata_headers = self.write_blob(id, METADATA_FILE, blob)?;
            }
            ImageEdit::Lock(update) => {
                match &update.payload {
                    LockPayload::Sealed { metadata, image } => {
                        record.metadata_headers = self.write_blob(id, METADATA_FILE, metadata)?;
                        record.image_headers = self.write_blob(id, IMAGE_FILE, image)?;
                    }
                    LockPayload::Plain { metadata, image } => {
                        self.storage.save(&Self::path(id, METADATA_FILE), metadata)?;
                        self.storage.save(&Self::path(id, IMAGE_FILE), image)?;
                        record.metadata_headers.clear();
                        record.image_headers.clear();
                    }
                }
                record.lock = update.lock;
            }
        }
        self.save_record(id, &record)
    }

    async fn blocking<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(FsTransport) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let this = self.clone();
        tokio::task::spawn_blocking(move || f(this)).await?
    }
}

#[async_trait]
impl ImageTransport for FsTransport {
    async fn fetch_metadata(
        &self,
        id: &str,
        _auth: Option<&Credentials>,
    ) -> Result<TransportResponse> {
        let id = id.to_string();
        self.blocking(move |t| t.read(&id, Artifact::Metadata)).await
    }

    async fn fetch_image(&self, id: &str, _auth: Option<&Credentials>) -> Result<TransportResponse> {
        let id = id.to_string();
        self.blocking(move |t| t.read(&id, Artifact::Image)).await
    }

    async fn submit_edit(
        &self,
        id: &str,
        edit: &ImageEdit,
        _auth: Option<&Credentials>,
    ) -> Result<()> {
        let id = id.to_string();
        let edit = edit.clone();
        self.blocking(move |t| t.apply(&id, &edit)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::LockVersion;
    use crate::transport::LockUpdate;
    use tempfile::tempdir;

    fn transport() -> (tempfile::TempDir, FsTransport) {
        let dir = tempdir().unwrap();
        let transport = FsTransport::new(dir.path().join("images"));
        (dir, transport)
    }

    #[tokio::test]
    async fn imported_image_is_plain() {
        let (_dir, t) = transport();
        t.import("cat", &ImageMetadata::new("a cat", 2, 3), b"PNG").unwrap();

        assert!(!t.image_ref("cat").unwrap().lock().is_locked());
        let image = t.fetch_image("cat", None).await.unwrap();
        assert_eq!(image.body, b"PNG");
        assert_eq!(image.side_channel, SideChannel::default());
    }

    #[test]
    fn import_twice_fails() {
        let (_dir, t) = transport();
        t.import("cat", &ImageMetadata::new("a", 1, 1), b"x").unwrap();
        assert!(t.import("cat", &ImageMetadata::new("b", 1, 1), b"y").is_err());
    }

    #[test]
    fn ids_with_path_separators_are_rejected() {
        let (_dir, t) = transport();
        assert!(t.import("../cat", &ImageMetadata::new("a", 1, 1), b"x").is_err());
        assert!(t.image_ref("").is_err());
    }

    #[tokio::test]
    async fn sealed_lock_update_stores_headers() {
        let (_dir, t) = transport();
        t.import("cat", &ImageMetadata::new("a", 1, 1), b"x").unwrap();

        let metadata = EncryptedBlob::new(vec![1; 16], vec![2; 12], vec![3; 5], vec![4; 16]);
        let image = EncryptedBlob::new(vec![5; 16], vec![6; 12], vec![7; 9], vec![8; 16]);
        let update = LockUpdate {
            payload: LockPayload::Sealed {
                metadata: metadata.clone(),
                image: image.clone(),
            },
            lock: LockState::locked(LockVersion::LATEST),
        };
        t.submit_edit("cat", &ImageEdit::Lock(update), None).await.unwrap();

        assert!(t.image_ref("cat").unwrap().lock().is_locked());
        let fetched = t.fetch_metadata("cat", None).await.unwrap();
        assert_eq!(
            EncryptedBlob::from_transport(fetched.body, &fetched.side_channel).unwrap(),
            metadata
        );
        let fetched = t.fetch_image("cat", None).await.unwrap();
        assert_eq!(
            EncryptedBlob::from_transport(fetched.body, &fetched.side_channel).unwrap(),
            image
        );
    }

    #[tokio::test]
    async fn description_and_privacy_edits() {
        let (_dir, t) = transport();
        t.import("cat", &ImageMetadata::new("old", 1, 1), b"x").unwrap();

        t.submit_edit("cat", &ImageEdit::Description("new".into()), None)
            .await
            .unwrap();
        t.submit_edit("cat", &ImageEdit::Privacy(true), None).await.unwrap();

        let body = t.fetch_metadata("cat", None).await.unwrap().body;
        assert_eq!(ImageMetadata::from_bytes(&body).unwrap().description(), "new");
        assert!(t.is_private("cat").unwrap());
    }

    #[tokio::test]
    async fn sealed_metadata_requires_lock() {
        let (_dir, t) = transport();
        t.import("cat", &ImageMetadata::new("a", 1, 1), b"x").unwrap();
        let blob = EncryptedBlob::new(vec![1; 16], vec![2; 12], vec![3; 5], vec![4; 16]);

        assert!(
            t.submit_edit("cat", &ImageEdit::SealedMetadata(blob), None)
                .await
                .is_err()
        );
    }
}
