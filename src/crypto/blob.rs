use base64::{Engine as _, engine::general_purpose::STANDARD};

use crate::LockError;

/// Header carrying the base64 lock salt.
pub const SALT_HEADER: &str = "X-Iamages-Lock-Salt";
/// Header carrying the base64 AES-GCM nonce.
pub const NONCE_HEADER: &str = "X-Iamages-Lock-Nonce";
/// Header carrying the base64 AES-GCM tag.
pub const TAG_HEADER: &str = "X-Iamages-Lock-Tag";

/// The out-of-band values that accompany an encrypted body.
///
/// Each value is base64 as it appears on the wire. `None` means the header was
/// absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SideChannel {
    pub salt: Option<String>,
    pub nonce: Option<String>,
    pub tag: Option<String>,
}

impl SideChannel {
    /// Pick the lock headers out of a response's headers, ignoring case.
    pub fn from_headers<'a, I>(headers: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut side_channel = SideChannel::default();
        for (name, value) in headers {
            let slot = if name.eq_ignore_ascii_case(SALT_HEADER) {
                &mut side_channel.salt
            } else if name.eq_ignore_ascii_case(NONCE_HEADER) {
                &mut side_channel.nonce
            } else if name.eq_ignore_ascii_case(TAG_HEADER) {
                &mut side_channel.tag
            } else {
                continue;
            };
            *slot = Some(value.trim().to_string());
        }
        side_channel
    }

    pub fn to_headers(&self) -> Vec<(&'static str, String)> {
        [
            (SALT_HEADER, &self.salt),
            (NONCE_HEADER, &self.nonce),
            (TAG_HEADER, &self.tag),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.as_ref().map(|v| (name, v.clone())))
        .collect()
    }
}

/// An encrypted body together with everything needed to open it.
///
/// Built fresh for every fetch or edit and never persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedBlob {
    salt: Vec<u8>,
    nonce: Vec<u8>,
    ciphertext: Vec<u8>,
    tag: Vec<u8>,
}

impl EncryptedBlob {
    pub fn new(salt: Vec<u8>, nonce: Vec<u8>, ciphertext: Vec<u8>, tag: Vec<u8>) -> Self {
        Self {
            salt,
            nonce,
            ciphertext,
            tag,
        }
    }

    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    pub fn nonce(&self) -> &[u8] {
        &self.nonce
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    pub fn tag(&self) -> &[u8] {
        &self.tag
    }

    /// Rebuild a blob from a response body and its lock headers.
    ///
    /// # Errors
    ///
    /// Returns `MalformedEncryptedResponse` if any header is missing, is not
    /// valid base64, or decodes to nothing.
    pub fn from_transport(body: Vec<u8>, side_channel: &SideChannel) -> Result<Self, LockError> {
        let salt = decode_field("salt", side_channel.salt.as_deref())?;
        let nonce = decode_field("nonce", side_channel.nonce.as_deref())?;
        let tag = decode_field("tag", side_channel.tag.as_deref())?;

        Ok(Self::new(salt, nonce, body, tag))
    }

    /// Split the blob back into a body and base64 headers.
    pub fn to_transport(&self) -> (Vec<u8>, SideChannel) {
        let side_channel = SideChannel {
            salt: Some(STANDARD.encode(&self.salt)),
            nonce: Some(STANDARD.encode(&self.nonce)),
            tag: Some(STANDARD.encode(&self.tag)),
        };
        (self.ciphertext.clone(), side_channel)
    }
}

impl std::fmt::Debug for EncryptedBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedBlob")
            .field("salt_len", &self.salt.len())
            .field("nonce_len", &self.nonce.len())
            .field("ciphertext_len", &self.ciphertext.len())
            .field("tag_len", &self.tag.len())
            .finish()
    }
}

fn decode_field(name: &str, value: Option<&str>) -> Result<Vec<u8>, LockError> {
    let value = value.ok_or_else(|| LockError::malformed(format!("missing lock {name}")))?;
    let bytes = STANDARD
        .decode(value)
        .map_err(|e| LockError::malformed(format!("lock {name} is not valid base64: {e}")))?;
    if bytes.is_empty() {
        return Err(LockError::malformed(format!("lock {name} is empty")));
    }
    Ok(bytes)
}
