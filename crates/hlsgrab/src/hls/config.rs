use std::time::Duration;

use reqwest::header::HeaderMap;

use crate::DownloaderConfig;
use crate::proxy::ProxyConfig;

// --- Top-Level Configuration ---
#[derive(Debug, Clone, Default)]
pub struct HlsConfig {
    /// Base HTTP client configuration
    pub base: DownloaderConfig,
    pub fetcher_config: HlsFetcherConfig,
    pub decryption_config: HlsDecryptionConfig,
    pub output_config: HlsOutputConfig,
}

impl HlsConfig {
    pub fn builder() -> HlsConfigBuilder {
        HlsConfigBuilder::new()
    }
}

// --- Fetcher Configuration ---
#[derive(Debug, Clone)]
pub struct HlsFetcherConfig {
    /// Max concurrent segment downloads
    pub download_concurrency: usize,
    pub playlist_fetch_timeout: Duration,
    pub segment_download_timeout: Duration,
    /// Extra attempts after a failed segment fetch. Zero fails the run on the first error.
    pub max_segment_retries: u32,
    pub segment_retry_delay_base: Duration, // Base for exponential backoff
    pub key_download_timeout: Duration,
}

impl Default for HlsFetcherConfig {
    fn default() -> Self {
        Self {
            download_concurrency: 4,
            playlist_fetch_timeout: Duration::from_secs(15),
            segment_download_timeout: Duration::from_secs(30),
            max_segment_retries: 0,
            segment_retry_delay_base: Duration::from_millis(500),
            key_download_timeout: Duration::from_secs(10),
        }
    }
}

/// How the 16-byte IV is derived from a segment's 1-based sequence number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum IvScheme {
    /// Sequence number in the last byte only; wraps after 256 segments
    #[default]
    LowByte,
    /// Full sequence number, big-endian, in the low 8 bytes
    BigEndianCounter,
}

/// What happens to the last block of a decrypted segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum SegmentPadding {
    /// Keep decrypted blocks verbatim; segments need not carry padding
    #[default]
    Keep,
    /// Strip PKCS#7 padding from the last block; a segment without valid padding fails
    Pkcs7,
}

// --- Decryption Configuration ---
#[derive(Debug, Clone, Default)]
pub struct HlsDecryptionConfig {
    pub iv_scheme: IvScheme,
    pub padding: SegmentPadding,
}

// --- Output Configuration ---
#[derive(Debug, Clone)]
pub struct HlsOutputConfig {
    /// Keep raw and decrypted segments on disk under the run directory.
    /// When false segments live in memory and only the assembled tracks are written.
    pub persist_segments: bool,
    /// Write raw manifests, keys and run.json under `meta/`
    pub persist_metadata: bool,
}

impl Default for HlsOutputConfig {
    fn default() -> Self {
        Self {
            persist_segments: true,
            persist_metadata: true,
        }
    }
}

/// Fluent builder for [`HlsConfig`]
#[derive(Debug, Clone, Default)]
pub struct HlsConfigBuilder {
    config: HlsConfig,
}

impl HlsConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_config(mut self, base_config: DownloaderConfig) -> Self {
        self.config.base = base_config;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.base.user_agent = user_agent.into();
        self
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.config.base.headers = DownloaderConfig::merge_headers(&headers);
        self
    }

    pub fn proxy(mut self, proxy_config: ProxyConfig) -> Self {
        self.config.base.proxy = Some(proxy_config);
        self.config.base.use_system_proxy = false;
        self
    }

    /// Set maximum concurrent segment downloads (at least 1)
    pub fn download_concurrency(mut self, concurrency: usize) -> Self {
        self.config.fetcher_config.download_concurrency = concurrency.max(1);
        self
    }

    pub fn playlist_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.config.fetcher_config.playlist_fetch_timeout = timeout;
        self
    }

    pub fn segment_download_timeout(mut self, timeout: Duration) -> Self {
        self.config.fetcher_config.segment_download_timeout = timeout;
        self
    }

    pub fn segment_retry_count(mut self, retries: u32) -> Self {
        self.config.fetcher_config.max_segment_retries = retries;
        self
    }

    pub fn segment_retry_delay(mut self, delay: Duration) -> Self {
        self.config.fetcher_config.segment_retry_delay_base = delay;
        self
    }

    pub fn key_download_timeout(mut self, timeout: Duration) -> Self {
        self.config.fetcher_config.key_download_timeout = timeout;
        self
    }

    pub fn iv_scheme(mut self, scheme: IvScheme) -> Self {
        self.config.decryption_config.iv_scheme = scheme;
        self
    }

    pub fn padding(mut self, padding: SegmentPadding) -> Self {
        self.config.decryption_config.padding = padding;
        self
    }

    pub fn persist_segments(mut self, persist: bool) -> Self {
        self.config.output_config.persist_segments = persist;
        self
    }

    pub fn persist_metadata(mut self, persist: bool) -> Self {
        self.config.output_config.persist_metadata = persist;
        self
    }

    pub fn build(self) -> HlsConfig {
        self.config
    }
}
