use hlsgrab_engine::{DownloadError, HlsError, MuxError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Download error: {0}")]
    Download(#[from] DownloadError),

    #[error("HLS error: {0}")]
    Hls(#[from] HlsError),

    #[error("Mux error: {0}")]
    Mux(#[from] MuxError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Initialization failed: {0}")]
    Initialization(String),
}
