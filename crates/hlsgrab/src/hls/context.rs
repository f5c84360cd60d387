//! # Run Context
//!
//! Per-run state handed to the pipeline: the working directory and its
//! layout, plus the cancellation token shared by every stage.
//!
//! ```text
//! <root>/
//!   meta/master.m3u8, meta/video-index.m3u8, meta/audio-index.m3u8
//!   meta/video.key, meta/audio.key, meta/run.json
//!   video/encrypted/enc{i}.ts, video/segments/seg{i}.ts, video/video.ts
//!   audio/...                                             audio/audio.ts
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::hls::HlsError;

/// One of the elementary streams a run reconstructs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
}

impl TrackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackKind::Video => "video",
            TrackKind::Audio => "audio",
        }
    }
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct RunContext {
    root: PathBuf,
    cancel: CancellationToken,
}

impl RunContext {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned token, e.g. one tied to Ctrl-C
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Fails with [`HlsError::Cancelled`] once the run has been cancelled
    pub fn check_cancelled(&self) -> Result<(), HlsError> {
        if self.cancel.is_cancelled() {
            Err(HlsError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn exists(&self) -> bool {
        self.root.exists()
    }

    pub fn meta_dir(&self) -> PathBuf {
        self.root.join("meta")
    }

    pub fn master_manifest_path(&self) -> PathBuf {
        self.meta_dir().join("master.m3u8")
    }

    pub fn media_manifest_path(&self, track: TrackKind) -> PathBuf {
        self.meta_dir().join(format!("{track}-index.m3u8"))
    }

    pub fn key_path(&self, track: TrackKind) -> PathBuf {
        self.meta_dir().join(format!("{track}.key"))
    }

    pub fn summary_path(&self) -> PathBuf {
        self.meta_dir().join("run.json")
    }

    pub fn track_dir(&self, track: TrackKind) -> PathBuf {
        self.root.join(track.as_str())
    }

    pub fn raw_segment_path(&self, track: TrackKind, index: usize) -> PathBuf {
        self.track_dir(track)
            .join("encrypted")
            .join(format!("enc{index}.ts"))
    }

    pub fn decrypted_segment_path(&self, track: TrackKind, index: usize) -> PathBuf {
        self.track_dir(track)
            .join("segments")
            .join(format!("seg{index}.ts"))
    }

    /// Reassembled elementary stream for `track`
    pub fn stream_path(&self, track: TrackKind) -> PathBuf {
        self.track_dir(track).join(format!("{track}.ts"))
    }

    /// Muxed container named after the run directory
    pub fn muxed_output_path(&self, extension: &str) -> PathBuf {
        let name = self
            .root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        self.root.join(format!("{name}.{extension}"))
    }

    /// Creates the run directory and its `meta/` subdirectory
    pub async fn prepare(&self) -> Result<(), HlsError> {
        fs::create_dir_all(self.meta_dir()).await?;
        debug!(root = %self.root.display(), "Prepared run directory");
        Ok(())
    }

    /// Writes a metadata artifact, creating parent directories as needed
    pub async fn write_artifact(&self, path: &Path, contents: &[u8]) -> Result<(), HlsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, contents).await?;
        debug!(path = %path.display(), bytes = contents.len(), "Wrote artifact");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_follows_track_and_index() {
        let ctx = RunContext::new("/data/show");
        assert_eq!(
            ctx.raw_segment_path(TrackKind::Video, 3),
            Path::new("/data/show/video/encrypted/enc3.ts")
        );
        assert_eq!(
            ctx.decrypted_segment_path(TrackKind::Audio, 0),
            Path::new("/data/show/audio/segments/seg0.ts")
        );
        assert_eq!(
            ctx.stream_path(TrackKind::Audio),
            Path::new("/data/show/audio/audio.ts")
        );
        assert_eq!(
            ctx.media_manifest_path(TrackKind::Video),
            Path::new("/data/show/meta/video-index.m3u8")
        );
        assert_eq!(
            ctx.muxed_output_path("mp4"),
            Path::new("/data/show/show.mp4")
        );
    }

    #[test]
    fn cancellation_is_observed() {
        let token = CancellationToken::new();
        let ctx = RunContext::new("/tmp/x").with_cancellation(token.clone());
        assert!(ctx.check_cancelled().is_ok());
        token.cancel();
        assert!(matches!(ctx.check_cancelled(), Err(HlsError::Cancelled)));
    }

    #[tokio::test]
    async fn prepare_creates_meta_dir() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = RunContext::new(dir.path().join("run"));
        assert!(!ctx.exists());
        ctx.prepare().await.unwrap();
        assert!(ctx.meta_dir().is_dir());

        ctx.write_artifact(&ctx.key_path(TrackKind::Video), &[7u8; 16])
            .await
            .unwrap();
        assert_eq!(std::fs::read(ctx.key_path(TrackKind::Video)).unwrap(), [7u8; 16]);
    }
}
