//! Encoded frames exchanged with the detection service

use base64::Engine;
use serde::{Deserialize, Serialize};

/// A transport-ready image: a `data:<mime>;base64,<payload>` URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncodedImage(String);

impl EncodedImage {
    /// Wrap raw encoded bytes (JPEG, PNG) in a data URL
    pub fn from_bytes(mime: &str, bytes: &[u8]) -> Self {
        let payload = base64::engine::general_purpose::STANDARD.encode(bytes);
        Self(format!("data:{};base64,{}", mime, payload))
    }

    /// JPEG shorthand, the format the service expects
    pub fn jpeg(bytes: &[u8]) -> Self {
        Self::from_bytes("image/jpeg", bytes)
    }

    /// Accept a data URL as produced by the service
    pub fn from_data_url(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// MIME type between `data:` and `;base64`
    pub fn mime(&self) -> Option<&str> {
        let rest = self.0.strip_prefix("data:")?;
        rest.split_once(';').map(|(mime, _)| mime)
    }

    /// Decode the payload back into bytes
    pub fn decode(&self) -> Option<Vec<u8>> {
        let (_, payload) = self.0.split_once(',')?;
        base64::engine::general_purpose::STANDARD.decode(payload).ok()
    }

    /// Size of the data URL in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Pixel dimensions reported once a stream delivers metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameDimensions {
    pub width: u32,
    pub height: u32,
}
