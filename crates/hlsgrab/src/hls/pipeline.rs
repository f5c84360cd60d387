// HLS Pipeline: master manifest in, reassembled elementary streams out.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{info, warn};

use crate::hls::HlsError;
use crate::hls::assembler::assemble;
use crate::hls::config::HlsConfig;
use crate::hls::context::{RunContext, TrackKind};
use crate::hls::decryption::Decryptor;
use crate::hls::events::{EventCallback, PipelineEvent};
use crate::hls::fetcher::{HttpFetcher, ResourceFetcher, SegmentFetcher, fetch_text};
use crate::hls::key::KeyResolver;
use crate::hls::manifest::{self, Manifest, ManifestKind, Variant};
use crate::hls::selector::select_variant;
use crate::hls::storage::{FileStore, MemoryStore, SegmentStore};
use crate::hls::uri;
use crate::{DownloadError, create_client};

/// Result of reconstructing one track
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackOutput {
    pub kind: TrackKind,
    /// Assembled elementary stream
    pub path: PathBuf,
    pub segments: usize,
    pub bytes: u64,
    /// Absolute URI of the media playlist the track was read from
    pub playlist_uri: String,
    pub encrypted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineOutput {
    pub video: TrackOutput,
    pub audio: Option<TrackOutput>,
}

impl PipelineOutput {
    /// Stream files in muxer input order: video first, then audio if present
    pub fn stream_paths(&self) -> Vec<&Path> {
        std::iter::once(&self.video)
            .chain(self.audio.as_ref())
            .map(|t| t.path.as_path())
            .collect()
    }
}

#[derive(Serialize)]
struct RunSummary<'a> {
    master_uri: &'a str,
    input_kind: ManifestKind,
    variant: Option<&'a Variant>,
    output: &'a PipelineOutput,
    elapsed_ms: u128,
}

pub struct HlsPipeline {
    config: Arc<HlsConfig>,
    fetcher: Arc<dyn ResourceFetcher>,
    events: Option<EventCallback>,
}

impl HlsPipeline {
    /// Creates a pipeline that fetches over HTTP with a client built from `config.base`
    pub fn new(config: HlsConfig) -> Result<Self, DownloadError> {
        let client = create_client(&config.base)?;
        Ok(Self::with_fetcher(config, Arc::new(HttpFetcher::new(client))))
    }

    pub fn with_fetcher(config: HlsConfig, fetcher: Arc<dyn ResourceFetcher>) -> Self {
        Self {
            config: Arc::new(config),
            fetcher,
            events: None,
        }
    }

    pub fn on_event<F>(mut self, callback: F) -> Self
    where
        F: Fn(PipelineEvent) + Send + Sync + 'static,
    {
        self.events = Some(Arc::new(callback));
        self
    }

    pub fn config(&self) -> &HlsConfig {
        &self.config
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(events) = &self.events {
            events(event);
        }
    }

    /// Downloads, decrypts and reassembles the best rendition reachable from
    /// `master_uri` into the layout of `ctx`.
    ///
    /// A media playlist URL is accepted too and becomes the video track.
    pub async fn run(&self, master_uri: &str, ctx: &RunContext) -> Result<PipelineOutput, HlsError> {
        let started = Instant::now();
        let persist_meta = self.config.output_config.persist_metadata;
        ctx.prepare().await?;
        ctx.check_cancelled()?;

        let master_text = fetch_text(
            self.fetcher.as_ref(),
            master_uri,
            self.config.fetcher_config.playlist_fetch_timeout,
        )
        .await?;
        if persist_meta {
            ctx.write_artifact(&ctx.master_manifest_path(), master_text.as_bytes())
                .await?;
        }

        let store: Box<dyn SegmentStore> = if self.config.output_config.persist_segments {
            Box::new(FileStore::new(ctx.clone()))
        } else {
            Box::new(MemoryStore::new())
        };

        let input_kind = manifest::detect(&master_text)?;
        self.emit(PipelineEvent::ManifestFetched {
            kind: input_kind,
            uri: master_uri.to_string(),
        });

        let (variant, output) = match manifest::parse(&master_text, input_kind)? {
            Manifest::Master(master) => {
                let selection = select_variant(&master)?;
                info!(
                    position = selection.variant.position,
                    uri = %selection.variant.uri,
                    audio = ?selection.audio_uri,
                    "Selected variant"
                );
                self.emit(PipelineEvent::VariantSelected {
                    position: selection.variant.position,
                    uri: selection.variant.uri.clone(),
                    width: selection.variant.resolution.map(|r| r.width),
                    height: selection.variant.resolution.map(|r| r.height),
                    has_audio: selection.audio_uri.is_some(),
                });

                let video_uri = uri::resolve(&selection.variant.uri, master_uri)?;
                let audio_uri = selection
                    .audio_uri
                    .as_deref()
                    .map(|a| uri::resolve(a, master_uri))
                    .transpose()?;

                let video = self
                    .run_track(TrackKind::Video, &video_uri, None, ctx, store.as_ref())
                    .await?;
                let audio = match audio_uri {
                    Some(audio_uri) => Some(
                        self.run_track(TrackKind::Audio, &audio_uri, None, ctx, store.as_ref())
                            .await?,
                    ),
                    None => None,
                };
                (Some(selection.variant), PipelineOutput { video, audio })
            }
            Manifest::Media(_) => {
                warn!(uri = master_uri, "Input is a media playlist, treating it as the only video track");
                let video = self
                    .run_track(
                        TrackKind::Video,
                        master_uri,
                        Some(master_text),
                        ctx,
                        store.as_ref(),
                    )
                    .await?;
                (None, PipelineOutput { video, audio: None })
            }
        };

        if persist_meta {
            let summary = RunSummary {
                master_uri,
                input_kind,
                variant: variant.as_ref(),
                output: &output,
                elapsed_ms: started.elapsed().as_millis(),
            };
            ctx.write_artifact(&ctx.summary_path(), &summary_json(&summary)?)
                .await?;
        }

        self.emit(PipelineEvent::Finished);
        info!(
            video = %output.video.path.display(),
            audio = ?output.audio.as_ref().map(|a| a.path.display().to_string()),
            elapsed = ?started.elapsed(),
            "Pipeline finished"
        );
        Ok(output)
    }

    async fn run_track(
        &self,
        track: TrackKind,
        playlist_uri: &str,
        preloaded: Option<String>,
        ctx: &RunContext,
        store: &dyn SegmentStore,
    ) -> Result<TrackOutput, HlsError> {
        ctx.check_cancelled()?;
        let persist_meta = self.config.output_config.persist_metadata;

        let text = match preloaded {
            Some(text) => text,
            None => {
                fetch_text(
                    self.fetcher.as_ref(),
                    playlist_uri,
                    self.config.fetcher_config.playlist_fetch_timeout,
                )
                .await?
            }
        };
        if persist_meta {
            ctx.write_artifact(&ctx.media_manifest_path(track), text.as_bytes())
                .await?;
        }
        self.emit(PipelineEvent::ManifestFetched {
            kind: ManifestKind::Media,
            uri: playlist_uri.to_string(),
        });

        let media = manifest::parse_media(&text)?;
        let count = media.segments.len();
        info!(%track, segments = count, encrypted = media.key.is_some(), playlist = playlist_uri, "Processing track");
        self.emit(PipelineEvent::TrackStarted {
            track,
            segments: count,
            encrypted: media.key.is_some(),
        });

        // Key must be valid before any segment is decrypted
        let key = KeyResolver::new(
            self.fetcher.clone(),
            self.config.fetcher_config.key_download_timeout,
        )
        .resolve(media.key.as_ref(), playlist_uri)
        .await?;
        if let (Some(key), true) = (&key, persist_meta) {
            ctx.write_artifact(&ctx.key_path(track), key.as_bytes())
                .await?;
        }

        SegmentFetcher::new(self.fetcher.clone(), self.config.clone())
            .with_events(self.events.clone())
            .fetch_all(
                track,
                &media.segments,
                playlist_uri,
                store,
                ctx.cancellation(),
            )
            .await?;

        ctx.check_cancelled()?;
        Decryptor::new(self.config.decryption_config.clone())
            .decrypt_track(track, count, key.as_ref(), store)
            .await?;
        self.emit(PipelineEvent::TrackDecrypted { track });

        let path = ctx.stream_path(track);
        let bytes = assemble(track, count, store, &path).await?;
        self.emit(PipelineEvent::TrackAssembled {
            track,
            path: path.clone(),
            bytes,
        });

        Ok(TrackOutput {
            kind: track,
            path,
            segments: count,
            bytes,
            playlist_uri: playlist_uri.to_string(),
            encrypted: key.is_some(),
        })
    }
}

/// Serialized run summary; a serializer failure is reported as a storage error
fn summary_json<T: Serialize>(summary: &T) -> Result<Vec<u8>, HlsError> {
    Ok(serde_json::to_vec_pretty(summary).map_err(std::io::Error::other)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hls::fetcher::tests::ScriptedFetcher;
    use parking_lot::Mutex;

    const MASTER: &str = "#EXTM3U
#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"aac\",NAME=\"en\",URI=\"audio/index.m3u8\"
#EXT-X-STREAM-INF:BANDWIDTH=500000,RESOLUTION=640x360
low/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=3000000,RESOLUTION=1280x720,AUDIO=\"aac\"
high/index.m3u8
";

    fn media(prefix: &str, n: usize) -> String {
        let mut text = String::from("#EXTM3U\n#EXT-X-TARGETDURATION:4\n");
        for i in 0..n {
            text.push_str(&format!("#EXTINF:4,\n{prefix}{i}.ts\n"));
        }
        text.push_str("#EXT-X-ENDLIST\n");
        text
    }

    #[tokio::test]
    async fn clear_master_with_audio_produces_two_tracks() {
        let scripted = Arc::new(ScriptedFetcher::default());
        scripted.serve("http://h/show/master.m3u8", MASTER);
        scripted.serve("http://h/show/high/index.m3u8", media("v", 2));
        scripted.serve("http://h/show/audio/index.m3u8", media("a", 3));
        scripted.serve("http://h/show/high/v0.ts", "V0");
        scripted.serve("http://h/show/high/v1.ts", "V1");
        for i in 0..3 {
            scripted.serve(&format!("http://h/show/audio/a{i}.ts"), format!("A{i}"));
        }

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let pipeline = HlsPipeline::with_fetcher(HlsConfig::default(), scripted.clone())
            .on_event(move |e| sink.lock().push(e));

        let dir = tempfile::tempdir().unwrap();
        let ctx = RunContext::new(dir.path().join("show"));
        let output = pipeline.run("http://h/show/master.m3u8", &ctx).await.unwrap();

        assert_eq!(std::fs::read_to_string(&output.video.path).unwrap(), "V0V1");
        let audio = output.audio.as_ref().unwrap();
        assert_eq!(std::fs::read_to_string(&audio.path).unwrap(), "A0A1A2");
        assert_eq!(output.stream_paths().len(), 2);
        assert!(!output.video.encrypted);

        assert!(ctx.master_manifest_path().is_file());
        assert!(ctx.media_manifest_path(TrackKind::Audio).is_file());
        assert!(ctx.raw_segment_path(TrackKind::Video, 1).is_file());
        let summary: serde_json::Value =
            serde_json::from_slice(&std::fs::read(ctx.summary_path()).unwrap()).unwrap();
        assert_eq!(summary["variant"]["uri"], "high/index.m3u8");
        assert_eq!(summary["output"]["audio"]["segments"], 3);

        let events = events.lock();
        assert!(matches!(events.last(), Some(PipelineEvent::Finished)));
        let fetched = events
            .iter()
            .filter(|e| matches!(e, PipelineEvent::SegmentFetched { .. }))
            .count();
        assert_eq!(fetched, 5);
        // low rendition is never touched
        assert!(!scripted.requests.lock().iter().any(|r| r.contains("/low/")));
    }

    #[tokio::test]
    async fn media_playlist_input_is_the_video_track() {
        let scripted = Arc::new(ScriptedFetcher::default());
        scripted.serve("http://h/live/index.m3u8", media("s", 2));
        scripted.serve("http://h/live/s0.ts", "one");
        scripted.serve("http://h/live/s1.ts", "two");

        let config = HlsConfig::builder().persist_segments(false).build();
        let pipeline = HlsPipeline::with_fetcher(config, scripted);
        let dir = tempfile::tempdir().unwrap();
        let ctx = RunContext::new(dir.path());
        let output = pipeline.run("http://h/live/index.m3u8", &ctx).await.unwrap();

        assert!(output.audio.is_none());
        assert_eq!(output.video.bytes, 6);
        assert_eq!(std::fs::read_to_string(&output.video.path).unwrap(), "onetwo");
        assert!(!ctx.raw_segment_path(TrackKind::Video, 0).exists());
    }

    #[tokio::test]
    async fn missing_segment_aborts_before_assembly() {
        let scripted = Arc::new(ScriptedFetcher::default());
        scripted.serve("http://h/live/index.m3u8", media("s", 3));
        scripted.serve("http://h/live/s0.ts", "zero");
        scripted.serve("http://h/live/s1.ts", "one");

        // one request at a time so 0 and 1 land before 2 fails
        let config = HlsConfig::builder().download_concurrency(1).build();
        let pipeline = HlsPipeline::with_fetcher(config, scripted);
        let dir = tempfile::tempdir().unwrap();
        let ctx = RunContext::new(dir.path());
        let err = pipeline.run("http://h/live/index.m3u8", &ctx).await.unwrap_err();

        assert_eq!(err.segment_index(), Some(2));
        assert_eq!(
            std::fs::read_to_string(ctx.raw_segment_path(TrackKind::Video, 0)).unwrap(),
            "zero"
        );
        assert_eq!(
            std::fs::read_to_string(ctx.raw_segment_path(TrackKind::Video, 1)).unwrap(),
            "one"
        );
        assert!(!ctx.raw_segment_path(TrackKind::Video, 2).exists());
        for index in 0..3 {
            assert!(!ctx.decrypted_segment_path(TrackKind::Video, index).exists());
        }
        assert!(!ctx.stream_path(TrackKind::Video).exists());
        assert!(!ctx.summary_path().exists());
    }

    #[test]
    fn summary_serialization_failure_is_a_storage_error() {
        let unserializable: std::collections::HashMap<(u8, u8), u8> = [((1, 2), 3)].into();
        let err = summary_json(&unserializable).unwrap_err();
        assert!(matches!(err, HlsError::Storage { .. }));
        assert!(summary_json(&[1, 2, 3]).is_ok());
    }
}
