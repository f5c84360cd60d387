//! # hlsgrab
//!
//! A library for acquiring segmented HLS media. Given a master playlist URL it
//! selects the best variant (and its companion audio rendition), downloads
//! every segment with bounded parallelism, decrypts AES-128 protected
//! segments and reassembles them into order-correct elementary streams that
//! can be handed to an external muxer.
//!
//! ## Features
//!
//! - Master/media playlist parsing with deterministic variant selection
//! - Index-addressed segment storage (on disk or in memory)
//! - Per-segment AES-128-CBC decryption with sequence-derived IVs
//! - Run-level cancellation and per-request timeouts
//! - ffmpeg stream-copy muxing of the reconstructed tracks

pub mod builder;
pub mod client;
pub mod config;
pub mod error;
pub mod hls;
pub mod mux;
pub mod proxy;

pub use builder::DownloaderConfigBuilder;
pub use client::create_client;
pub use config::DownloaderConfig;
pub use error::DownloadError;

pub use hls::{
    HlsConfig, HlsConfigBuilder, HlsError, HlsPipeline, PipelineEvent, PipelineOutput,
    RunContext, TrackKind, TrackOutput,
};

pub use mux::{MuxError, Muxer};

// Re-export proxy utilities
pub use proxy::{ProxyAuth, ProxyConfig, ProxyType};
