use serde::{Deserialize, Serialize};

use crate::LockError;

/// The metadata document of an image.
///
/// For locked images this whole document is the encrypted metadata body, so
/// the description and the real content type stay private.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ImageMetadata {
    description: String,
    width: u32,
    height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    real_content_type: Option<String>,
}

impl ImageMetadata {
    pub fn new(description: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            description: description.into(),
            width,
            height,
            real_content_type: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.real_content_type = Some(content_type.into());
        self
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn real_content_type(&self) -> Option<&str> {
        self.real_content_type.as_deref()
    }

    pub(crate) fn set_description(&mut self, description: String) {
        self.description = description;
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, LockError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LockError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
