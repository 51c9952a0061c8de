//! The boundary between the lock protocol and whatever moves bytes.
//!
//! The protocol never speaks HTTP itself. An [`ImageTransport`] fetches bodies
//! with their lock headers and submits edits; [`fs::FsTransport`] is a local
//! implementation backed by a directory.

use async_trait::async_trait;

use crate::{
    credentials::Credentials,
    crypto::{EncryptedBlob, SideChannel},
    format::LockState,
};

pub mod fs;

/// A fetched body and the lock headers that came with it.
#[derive(Debug, Clone, Default)]
pub struct TransportResponse {
    pub body: Vec<u8>,
    pub side_channel: SideChannel,
}

/// Bodies written back by a lock change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockPayload {
    /// Both artifacts re-encrypted, each under its own salt, key and nonce.
    Sealed {
        metadata: EncryptedBlob,
        image: EncryptedBlob,
    },
    /// Lock removed; plain bodies for re-upload.
    Plain { metadata: Vec<u8>, image: Vec<u8> },
}

/// The result of a lock change: new bodies plus the state they imply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockUpdate {
    pub payload: LockPayload,
    pub lock: LockState,
}

/// One edit to an image, as handed to the transport for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageEdit {
    Description(String),
    Privacy(bool),
    /// Re-encrypted metadata of a locked image.
    SealedMetadata(EncryptedBlob),
    Lock(LockUpdate),
}

#[async_trait]
pub trait ImageTransport: Send + Sync {
    /// Fetch the metadata body of `id` with its lock headers.
    async fn fetch_metadata(
        &self,
        id: &str,
        auth: Option<&Credentials>,
    ) -> anyhow::Result<TransportResponse>;

    /// Fetch the image body of `id` with its lock headers.
    async fn fetch_image(
        &self,
        id: &str,
        auth: Option<&Credentials>,
    ) -> anyhow::Result<TransportResponse>;

    /// Submit an edit. The transport owns the wire schema.
    async fn submit_edit(
        &self,
        id: &str,
        edit: &ImageEdit,
        auth: Option<&Credentials>,
    ) -> anyhow::Result<()>;
}
