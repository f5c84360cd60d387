// HLS Decryption: AES-128-CBC segment decryption with sequence-derived IVs.

use aes::Aes128;
use bytes::Bytes;
use cipher::block_padding::{NoPadding, Pkcs7};
use cipher::{BlockDecryptMut, KeyIvInit};
use tracing::{debug, info, trace};

use crate::hls::HlsError;
use crate::hls::config::{HlsDecryptionConfig, IvScheme, SegmentPadding};
use crate::hls::context::TrackKind;
use crate::hls::key::EncryptionKey;
use crate::hls::storage::{SegmentKey, SegmentStore, Stage};

type Aes128CbcDec = cbc::Decryptor<Aes128>;

const BLOCK_SIZE: usize = 16;

/// Builds the IV for the segment with the given 1-based sequence number
pub fn derive_iv(sequence: u64, scheme: IvScheme) -> [u8; 16] {
    let mut iv = [0u8; 16];
    match scheme {
        // Wraps after 256 segments; kept for compatibility with existing captures
        IvScheme::LowByte => iv[15] = (sequence % 256) as u8,
        IvScheme::BigEndianCounter => iv[8..].copy_from_slice(&sequence.to_be_bytes()),
    }
    iv
}

/// Decrypts one segment. Without a key the payload is returned unchanged.
pub fn decrypt_segment(
    index: usize,
    data: Bytes,
    key: Option<&EncryptionKey>,
    config: &HlsDecryptionConfig,
) -> Result<Bytes, HlsError> {
    let Some(key) = key else {
        return Ok(data);
    };

    if data.len() % BLOCK_SIZE != 0 {
        return Err(HlsError::Decryption {
            index,
            reason: format!(
                "ciphertext length {} is not a multiple of {BLOCK_SIZE}",
                data.len()
            ),
        });
    }

    let iv = derive_iv(index as u64 + 1, config.iv_scheme);
    let cipher = Aes128CbcDec::new_from_slices(key.as_bytes(), &iv).map_err(|e| {
        HlsError::Decryption {
            index,
            reason: format!("failed to initialize AES decryptor: {e}"),
        }
    })?;

    let mut buffer = data.to_vec();
    let plain_len = match config.padding {
        SegmentPadding::Pkcs7 => cipher.decrypt_padded_mut::<Pkcs7>(&mut buffer),
        SegmentPadding::Keep => cipher.decrypt_padded_mut::<NoPadding>(&mut buffer),
    }
    .map_err(|e| HlsError::Decryption {
        index,
        reason: format!("invalid padding: {e}"),
    })?
    .len();

    buffer.truncate(plain_len);
    Ok(Bytes::from(buffer))
}

/// Decrypts a whole track, reading `Raw` payloads and writing `Decrypted` ones
pub struct Decryptor {
    config: HlsDecryptionConfig,
}

impl Decryptor {
    pub fn new(config: HlsDecryptionConfig) -> Self {
        Self { config }
    }

    pub async fn decrypt_track(
        &self,
        track: TrackKind,
        count: usize,
        key: Option<&EncryptionKey>,
        store: &dyn SegmentStore,
    ) -> Result<(), HlsError> {
        if key.is_some() {
            info!(%track, segments = count, scheme = ?self.config.iv_scheme, "Decrypting track");
        }
        for index in 0..count {
            let raw = store.get(SegmentKey::new(track, Stage::Raw, index)).await?;
            if key.is_some() {
                let iv = derive_iv(index as u64 + 1, self.config.iv_scheme);
                trace!(%track, index, iv = %hex::encode(iv), "Decrypting segment");
            }
            let raw_len = raw.len();
            let plain = decrypt_segment(index, raw, key, &self.config)?;
            debug!(%track, index, raw = raw_len, plain = plain.len(), "Segment decrypted");
            store
                .put(SegmentKey::new(track, Stage::Decrypted, index), plain)
                .await?;
        }
        Ok(())
    }
}
