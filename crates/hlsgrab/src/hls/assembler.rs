use std::path::Path;

use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::info;

use crate::hls::HlsError;
use crate::hls::context::TrackKind;
use crate::hls::storage::{SegmentKey, SegmentStore, Stage};

/// Concatenates the decrypted payloads `0..count` of `track` into
/// `output_path` and returns the number of bytes written.
///
/// Order is by index only; the order segments arrived in does not matter.
pub async fn assemble(
    track: TrackKind,
    count: usize,
    store: &dyn SegmentStore,
    output_path: &Path,
) -> Result<u64, HlsError> {
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let mut writer = BufWriter::new(File::create(output_path).await?);
    let mut written: u64 = 0;
    for index in 0..count {
        let data = store
            .get(SegmentKey::new(track, Stage::Decrypted, index))
            .await?;
        writer.write_all(&data).await?;
        written += data.len() as u64;
    }
    writer.flush().await?;

    info!(%track, segments = count, bytes = written, path = %output_path.display(), "Assembled track");
    Ok(written)
}
