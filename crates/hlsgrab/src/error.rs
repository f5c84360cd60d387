use crate::hls::HlsError;
use crate::mux::MuxError;

// Top-level error type for an acquisition run
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid proxy configuration: {0}")]
    ProxyError(String),

    #[error("TLS configuration error: {0}")]
    TlsError(String),

    #[error("HLS error: {0}")]
    HlsError(#[from] HlsError),

    #[error("Mux error: {0}")]
    MuxError(#[from] MuxError),
}
