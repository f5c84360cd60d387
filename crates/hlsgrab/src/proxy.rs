use reqwest::Proxy;

use crate::DownloadError;

/// Which requests a proxy applies to
#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub enum ProxyType {
    /// Plain HTTP requests only
    Http,
    /// HTTPS requests only
    Https,
    /// SOCKS5, applied to every request
    Socks5,
    /// Every request regardless of scheme
    All,
}

#[derive(Debug, Clone)]
pub struct ProxyAuth {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Proxy server URL (e.g., "http://proxy.example.com:8080")
    pub url: String,
    pub proxy_type: ProxyType,
    pub auth: Option<ProxyAuth>,
}

/// Build a reqwest Proxy from a [`ProxyConfig`]
pub fn build_proxy(config: &ProxyConfig) -> Result<Proxy, DownloadError> {
    let url = &config.url;
    let invalid = |e: reqwest::Error| DownloadError::ProxyError(format!("{url}: {e}"));

    let mut proxy = match config.proxy_type {
        ProxyType::Http => Proxy::http(url).map_err(invalid)?,
        ProxyType::Https => Proxy::https(url).map_err(invalid)?,
        ProxyType::Socks5 => {
            if url.starts_with("socks5://") || url.starts_with("socks5h://") {
                Proxy::all(url).map_err(invalid)?
            } else {
                Proxy::all(format!("socks5://{url}")).map_err(invalid)?
            }
        }
        ProxyType::All => Proxy::all(url).map_err(invalid)?,
    };

    if let Some(auth) = &config.auth {
        proxy = proxy.basic_auth(&auth.username, &auth.password);
    }

    Ok(proxy)
}
