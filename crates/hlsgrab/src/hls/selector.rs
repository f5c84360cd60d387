// Variant selection over a parsed master manifest.

use tracing::debug;

use crate::hls::HlsError;
use crate::hls::manifest::{MasterManifest, Variant};

/// The chosen rendition and, when it references one, its audio playlist URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub variant: Variant,
    /// Audio playlist URI as written in the master manifest (not yet resolved)
    pub audio_uri: Option<String>,
}

/// Picks the variant with the largest `width * height`.
///
/// Ties go to the variant declared first. Variants without a resolution
/// count as zero pixels.
pub fn select_variant(master: &MasterManifest) -> Result<Selection, HlsError> {
    let mut best: Option<&Variant> = None;
    for variant in &master.variants {
        // strict comparison keeps the earliest variant on ties
        if best.is_none_or(|b| variant.area() > b.area()) {
            best = Some(variant);
        }
    }
    let variant = best.ok_or_else(|| {
        HlsError::ManifestFormat("Master playlist has no variants to select from".to_string())
    })?;

    let audio_uri = match &variant.audio_group {
        Some(group_id) => {
            let uri = master.audio_group_uri(group_id).ok_or_else(|| {
                HlsError::ManifestFormat(format!(
                    "Variant {} references undeclared audio group '{group_id}'",
                    variant.position
                ))
            })?;
            Some(uri.to_string())
        }
        None => None,
    };

    debug!(
        position = variant.position,
        uri = %variant.uri,
        area = variant.area(),
        audio = ?audio_uri,
        "Selected variant"
    );

    Ok(Selection {
        variant: variant.clone(),
        audio_uri,
    })
}
