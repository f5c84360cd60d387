use std::time::Duration;

use reqwest::header::{ACCEPT, CONNECTION, HeaderMap, HeaderValue};

use crate::proxy::ProxyConfig;

const USER_AGENT: &str = concat!("hlsgrab/", env!("CARGO_PKG_VERSION"));

// Playlists first, then transport stream segments, then anything (keys)
const ACCEPT_HLS: &str =
    "application/vnd.apple.mpegurl, application/x-mpegurl, video/mp2t;q=0.9, */*;q=0.8";

/// HTTP client settings for manifest, key and segment requests
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    /// Upper bound for any single request; zero leaves requests unbounded
    pub timeout: Duration,
    pub connect_timeout: Duration,
    /// How long idle keep-alive connections stay pooled
    pub pool_idle_timeout: Duration,
    pub follow_redirects: bool,
    pub user_agent: String,
    /// Sent with every request, e.g. `Referer` or auth cookies for the CDN
    pub headers: HeaderMap,
    pub proxy: Option<ProxyConfig>,
    /// Honour `HTTP_PROXY`/`HTTPS_PROXY` when no explicit proxy is set
    pub use_system_proxy: bool,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            pool_idle_timeout: Duration::from_secs(30),
            follow_redirects: true,
            user_agent: USER_AGENT.to_string(),
            headers: Self::default_headers(),
            proxy: None,
            use_system_proxy: true,
        }
    }
}

impl DownloaderConfig {
    pub fn builder() -> crate::builder::DownloaderConfigBuilder {
        crate::builder::DownloaderConfigBuilder::new()
    }

    /// Headers every request starts from. Accept-Encoding is left to reqwest
    /// so compressed playlists are decoded transparently.
    pub fn default_headers() -> HeaderMap {
        HeaderMap::from_iter([
            (CONNECTION, HeaderValue::from_static("keep-alive")),
            (ACCEPT, HeaderValue::from_static(ACCEPT_HLS)),
        ])
    }

    /// The default headers overlaid with `extra`
    pub fn merge_headers(extra: &HeaderMap) -> HeaderMap {
        let mut headers = Self::default_headers();
        headers.extend(extra.clone());
        headers
    }
}
