//! # Segment Storage
//!
//! Index-addressed storage for segment payloads. Each payload is keyed by
//! track, processing stage and 0-based segment index, so concurrent writers
//! never touch the same entry and readers can walk indices in order.

use std::collections::HashMap;
use std::io;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tokio::fs;
use tracing::trace;

use crate::hls::HlsError;
use crate::hls::context::{RunContext, TrackKind};

/// Processing stage of a stored payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Bytes exactly as fetched
    Raw,
    /// Bytes after decryption (identical to `Raw` for clear segments)
    Decrypted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentKey {
    pub track: TrackKind,
    pub stage: Stage,
    pub index: usize,
}

impl SegmentKey {
    pub fn new(track: TrackKind, stage: Stage, index: usize) -> Self {
        Self {
            track,
            stage,
            index,
        }
    }
}

#[async_trait]
pub trait SegmentStore: Send + Sync {
    async fn put(&self, key: SegmentKey, data: Bytes) -> Result<(), HlsError>;

    /// Missing entries are a storage error
    async fn get(&self, key: SegmentKey) -> Result<Bytes, HlsError>;

    async fn contains(&self, key: SegmentKey) -> Result<bool, HlsError>;
}

fn missing(key: SegmentKey) -> HlsError {
    HlsError::from(io::Error::new(
        io::ErrorKind::NotFound,
        format!(
            "no {:?} payload stored for {} segment {}",
            key.stage, key.track, key.index
        ),
    ))
}

/// Keeps payloads as files under the run directory
#[derive(Debug, Clone)]
pub struct FileStore {
    context: RunContext,
}

impl FileStore {
    pub fn new(context: RunContext) -> Self {
        Self { context }
    }

    fn path_for(&self, key: SegmentKey) -> std::path::PathBuf {
        match key.stage {
            Stage::Raw => self.context.raw_segment_path(key.track, key.index),
            Stage::Decrypted => self.context.decrypted_segment_path(key.track, key.index),
        }
    }
}

#[async_trait]
impl SegmentStore for FileStore {
    async fn put(&self, key: SegmentKey, data: Bytes) -> Result<(), HlsError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, &data).await?;
        trace!(path = %path.display(), bytes = data.len(), "Stored segment");
        Ok(())
    }

    async fn get(&self, key: SegmentKey) -> Result<Bytes, HlsError> {
        match fs::read(self.path_for(key)).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(missing(key)),
            Err(e) => Err(e.into()),
        }
    }

    async fn contains(&self, key: SegmentKey) -> Result<bool, HlsError> {
        Ok(fs::try_exists(self.path_for(key)).await?)
    }
}

/// Keeps payloads in memory; nothing but the assembled tracks reaches disk
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<SegmentKey, Bytes>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl SegmentStore for MemoryStore {
    async fn put(&self, key: SegmentKey, data: Bytes) -> Result<(), HlsError> {
        self.entries.write().insert(key, data);
        Ok(())
    }

    async fn get(&self, key: SegmentKey) -> Result<Bytes, HlsError> {
        self.entries.read().get(&key).cloned().ok_or_else(|| missing(key))
    }

    async fn contains(&self, key: SegmentKey) -> Result<bool, HlsError> {
        Ok(self.entries.read().contains_key(&key))
    }
}
