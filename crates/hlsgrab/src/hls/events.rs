use std::path::PathBuf;
use std::sync::Arc;

use crate::hls::context::TrackKind;
use crate::hls::manifest::ManifestKind;

/// Progress notifications emitted while a run executes
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    ManifestFetched {
        kind: ManifestKind,
        uri: String,
    },
    VariantSelected {
        position: usize,
        uri: String,
        width: Option<u64>,
        height: Option<u64>,
        has_audio: bool,
    },
    TrackStarted {
        track: TrackKind,
        segments: usize,
        encrypted: bool,
    },
    SegmentFetched {
        track: TrackKind,
        index: usize,
        bytes: usize,
    },
    TrackDecrypted {
        track: TrackKind,
    },
    TrackAssembled {
        track: TrackKind,
        path: PathBuf,
        bytes: u64,
    },
    Finished,
}

pub type EventCallback = Arc<dyn Fn(PipelineEvent) + Send + Sync>;
