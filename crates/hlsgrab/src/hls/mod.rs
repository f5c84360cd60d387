// Segmented HLS acquisition: manifests, keys, segment fetching, decryption
// and reassembly.

pub mod assembler;
pub mod config;
pub mod context;
pub mod decryption;
pub mod error;
pub mod events;
pub mod fetcher;
pub mod key;
pub mod manifest;
pub mod pipeline;
pub mod selector;
pub mod storage;
pub mod uri;

// Re-exports for easier access
pub use config::{
    HlsConfig, HlsConfigBuilder, HlsDecryptionConfig, HlsFetcherConfig, HlsOutputConfig,
    IvScheme, SegmentPadding,
};
pub use context::{RunContext, TrackKind};
pub use error::HlsError;
pub use events::{EventCallback, PipelineEvent};
pub use fetcher::{HttpFetcher, ResourceFetcher, SegmentFetcher};
pub use key::{EncryptionKey, KeyResolver};
pub use pipeline::{HlsPipeline, PipelineOutput, TrackOutput};
pub use selector::{Selection, select_variant};
pub use storage::{FileStore, MemoryStore, SegmentStore, Stage};
