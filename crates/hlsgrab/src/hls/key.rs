// Key resolution: fetches the single AES-128 key a media playlist declares.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::hls::HlsError;
use crate::hls::fetcher::{ResourceFetcher, fetch_with_timeout};
use crate::hls::manifest::KeyDeclaration;
use crate::hls::uri;

pub const KEY_LENGTH: usize = 16;

/// A validated AES-128 key and the absolute URI it came from
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey {
    bytes: [u8; KEY_LENGTH],
    uri: String,
}

impl EncryptionKey {
    pub fn from_slice(uri: impl Into<String>, data: &[u8]) -> Result<Self, HlsError> {
        let uri = uri.into();
        let bytes: [u8; KEY_LENGTH] = data.try_into().map_err(|_| HlsError::KeyFormat {
            uri: uri.clone(),
            length: data.len(),
        })?;
        Ok(Self { bytes, uri })
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.bytes
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }
}

// Key material stays out of logs
impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("uri", &self.uri)
            .finish_non_exhaustive()
    }
}

pub struct KeyResolver {
    fetcher: Arc<dyn ResourceFetcher>,
    timeout: Duration,
}

impl KeyResolver {
    pub fn new(fetcher: Arc<dyn ResourceFetcher>, timeout: Duration) -> Self {
        Self { fetcher, timeout }
    }

    /// Fetches and validates the key for a media playlist.
    ///
    /// No declaration means the playlist is in the clear and yields `Ok(None)`.
    pub async fn resolve(
        &self,
        declaration: Option<&KeyDeclaration>,
        manifest_uri: &str,
    ) -> Result<Option<EncryptionKey>, HlsError> {
        let Some(declaration) = declaration else {
            debug!(manifest = manifest_uri, "No key declared, segments are clear");
            return Ok(None);
        };

        let key_uri = uri::resolve(&declaration.uri, manifest_uri)?;
        let data = fetch_with_timeout(self.fetcher.as_ref(), &key_uri, None, self.timeout).await?;
        let key = EncryptionKey::from_slice(key_uri, &data)?;
        info!(uri = key.uri(), "Resolved AES-128 key");
        Ok(Some(key))
    }
}
