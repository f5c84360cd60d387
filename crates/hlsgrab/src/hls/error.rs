use std::sync::Arc;

#[derive(Debug, thiserror::Error, Clone)]
pub enum HlsError {
    #[error("Manifest format error: {0}")]
    ManifestFormat(String),

    #[error("Fetch error for {}: {reason}", describe_target(.uri, .index))]
    Fetch {
        uri: String,
        /// Segment index, `None` for manifest and key requests
        index: Option<usize>,
        reason: String,
    },

    #[error("Key from {uri} has invalid length {length} (expected 16 bytes)")]
    KeyFormat { uri: String, length: usize },

    #[error("Decryption error for segment {index}: {reason}")]
    Decryption { index: usize, reason: String },

    #[error("Storage error: {source}")]
    Storage {
        #[from]
        source: Arc<std::io::Error>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Operation cancelled")]
    Cancelled,
}

fn describe_target(uri: &str, index: &Option<usize>) -> String {
    match index {
        Some(index) => format!("segment {index} ({uri})"),
        None => uri.to_string(),
    }
}

impl HlsError {
    pub(crate) fn fetch(uri: impl Into<String>, index: Option<usize>, reason: impl ToString) -> Self {
        HlsError::Fetch {
            uri: uri.into(),
            index,
            reason: reason.to_string(),
        }
    }

    /// Segment index this error refers to, if any
    pub fn segment_index(&self) -> Option<usize> {
        match self {
            HlsError::Fetch { index, .. } => *index,
            HlsError::Decryption { index, .. } => Some(*index),
            _ => None,
        }
    }
}

// Arc wrapping keeps the error Clone, so From has to be written by hand.
impl From<std::io::Error> for HlsError {
    fn from(err: std::io::Error) -> Self {
        HlsError::Storage {
            source: Arc::new(err),
        }
    }
}
