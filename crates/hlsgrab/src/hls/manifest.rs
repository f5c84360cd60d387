// HLS manifest parsing: turns playlist text into variant, audio group,
// segment and key records.

use m3u8_rs::{AlternativeMediaType, KeyMethod, MasterPlaylist, MediaPlaylist, Playlist};
use serde::Serialize;
use tracing::{debug, warn};

use crate::hls::HlsError;

/// Which level of the two-level playlist structure a text holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestKind {
    Master,
    Media,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub width: u64,
    pub height: u64,
}

impl Resolution {
    pub fn area(&self) -> u64 {
        self.width.saturating_mul(self.height)
    }
}

/// One `#EXT-X-STREAM-INF` rendition of a master manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Variant {
    /// Order of occurrence in the manifest, used for tie-breaking
    pub position: usize,
    pub resolution: Option<Resolution>,
    pub audio_group: Option<String>,
    /// Media playlist URI as written in the manifest
    pub uri: String,
}

impl Variant {
    /// Pixel count; a variant without RESOLUTION counts as zero
    pub fn area(&self) -> u64 {
        self.resolution.map_or(0, |r| r.area())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioGroup {
    pub group_id: String,
    pub uri: String,
    /// Rendition carries `DEFAULT=YES`
    pub default: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MasterManifest {
    pub variants: Vec<Variant>,
    pub audio_groups: Vec<AudioGroup>,
}

impl MasterManifest {
    /// URI of the audio rendition for `group_id`: the one marked `DEFAULT=YES`,
    /// otherwise the first declared
    pub fn audio_group_uri(&self, group_id: &str) -> Option<&str> {
        let mut renditions = self.audio_groups.iter().filter(|g| g.group_id == group_id);
        let first = renditions.clone().next()?;
        Some(renditions.find(|g| g.default).unwrap_or(first).uri.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// 0-based position in the media playlist
    pub index: usize,
    pub uri: String,
}

impl Segment {
    /// 1-based sequence number fed into IV derivation
    pub fn sequence_number(&self) -> u64 {
        self.index as u64 + 1
    }
}

/// An AES-128 `#EXT-X-KEY` declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDeclaration {
    pub uri: String,
    pub iv: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MediaManifest {
    pub segments: Vec<Segment>,
    pub key: Option<KeyDeclaration>,
}

#[derive(Debug, Clone)]
pub enum Manifest {
    Master(MasterManifest),
    Media(MediaManifest),
}

impl Manifest {
    pub fn kind(&self) -> ManifestKind {
        match self {
            Manifest::Master(_) => ManifestKind::Master,
            Manifest::Media(_) => ManifestKind::Media,
        }
    }
}

fn parse_raw(text: &str) -> Result<Playlist, HlsError> {
    m3u8_rs::parse_playlist_res(text.as_bytes())
        .map_err(|e| HlsError::ManifestFormat(format!("Unparseable playlist: {e:?}")))
}

/// Parses a playlist of either kind, deciding by content
pub fn parse_any(text: &str) -> Result<Manifest, HlsError> {
    match parse_raw(text)? {
        Playlist::MasterPlaylist(pl) => Ok(Manifest::Master(master_from(pl)?)),
        Playlist::MediaPlaylist(pl) => Ok(Manifest::Media(media_from(pl)?)),
    }
}

/// Reports which kind of playlist `text` holds without validating its contents
pub fn detect(text: &str) -> Result<ManifestKind, HlsError> {
    Ok(match parse_raw(text)? {
        Playlist::MasterPlaylist(_) => ManifestKind::Master,
        Playlist::MediaPlaylist(_) => ManifestKind::Media,
    })
}

fn kind_mismatch(expected: ManifestKind, found: ManifestKind) -> HlsError {
    HlsError::ManifestFormat(format!(
        "Expected a {expected:?} playlist, got a {found:?} playlist"
    ))
}

/// Parses `text`, requiring it to be of the given kind
pub fn parse(text: &str, kind: ManifestKind) -> Result<Manifest, HlsError> {
    let manifest = parse_any(text)?;
    if manifest.kind() != kind {
        return Err(kind_mismatch(kind, manifest.kind()));
    }
    Ok(manifest)
}

pub fn parse_master(text: &str) -> Result<MasterManifest, HlsError> {
    match parse_any(text)? {
        Manifest::Master(master) => Ok(master),
        Manifest::Media(_) => Err(kind_mismatch(ManifestKind::Master, ManifestKind::Media)),
    }
}

pub fn parse_media(text: &str) -> Result<MediaManifest, HlsError> {
    match parse_any(text)? {
        Manifest::Media(media) => Ok(media),
        Manifest::Master(_) => Err(kind_mismatch(ManifestKind::Media, ManifestKind::Master)),
    }
}

fn master_from(playlist: MasterPlaylist) -> Result<MasterManifest, HlsError> {
    let variants: Vec<Variant> = playlist
        .variants
        .into_iter()
        .filter(|v| !v.is_i_frame)
        .enumerate()
        .map(|(position, v)| Variant {
            position,
            resolution: v.resolution.map(|r| Resolution {
                width: r.width,
                height: r.height,
            }),
            audio_group: v.audio,
            uri: v.uri,
        })
        .collect();

    if variants.is_empty() {
        return Err(HlsError::ManifestFormat(
            "Master playlist declares no variant streams".to_string(),
        ));
    }
    if let Some(v) = variants.iter().find(|v| v.uri.trim().is_empty()) {
        return Err(HlsError::ManifestFormat(format!(
            "Variant {} has no playlist URI",
            v.position
        )));
    }

    let audio_groups = playlist
        .alternatives
        .into_iter()
        .filter(|m| matches!(m.media_type, AlternativeMediaType::Audio))
        .filter_map(|m| match m.uri {
            Some(uri) => Some(AudioGroup {
                group_id: m.group_id,
                uri,
                default: m.default,
            }),
            None => {
                debug!(group = %m.group_id, "Audio rendition without URI is muxed into the variant");
                None
            }
        })
        .collect();

    Ok(MasterManifest {
        variants,
        audio_groups,
    })
}

fn media_from(playlist: MediaPlaylist) -> Result<MediaManifest, HlsError> {
    if playlist.segments.is_empty() {
        return Err(HlsError::ManifestFormat(
            "Media playlist lists no segments".to_string(),
        ));
    }

    let mut key: Option<KeyDeclaration> = None;
    let mut saw_key_tag = false;
    let mut segments = Vec::with_capacity(playlist.segments.len());

    for (index, segment) in playlist.segments.into_iter().enumerate() {
        if let Some(declared) = segment.key {
            let current = match declared.method {
                KeyMethod::None => None,
                KeyMethod::AES128 => {
                    let uri = declared.uri.filter(|u| !u.trim().is_empty()).ok_or_else(|| {
                        HlsError::ManifestFormat(format!(
                            "AES-128 key declaration before segment {index} has no URI"
                        ))
                    })?;
                    Some(KeyDeclaration {
                        uri,
                        iv: declared.iv,
                    })
                }
                other => {
                    return Err(HlsError::ManifestFormat(format!(
                        "Unsupported encryption method {other:?}"
                    )));
                }
            };

            if saw_key_tag && current != key {
                return Err(HlsError::ManifestFormat(format!(
                    "Key rotation at segment {index} is not supported"
                )));
            }
            saw_key_tag = true;
            key = current;
        }

        if segment.uri.trim().is_empty() {
            return Err(HlsError::ManifestFormat(format!(
                "Segment {index} has no URI"
            )));
        }
        segments.push(Segment {
            index,
            uri: segment.uri,
        });
    }

    if let Some(KeyDeclaration { iv: Some(iv), .. }) = &key {
        warn!(iv = %iv, "Explicit IV in key declaration is ignored; IVs follow segment sequence numbers");
    }

    Ok(MediaManifest { segments, key })
}
