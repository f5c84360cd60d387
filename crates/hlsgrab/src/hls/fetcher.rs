// HLS Segment Fetcher: downloads manifests, keys and segments, the latter with
// bounded parallelism and optional retries.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::hls::HlsError;
use crate::hls::config::HlsConfig;
use crate::hls::context::TrackKind;
use crate::hls::events::{EventCallback, PipelineEvent};
use crate::hls::manifest::Segment;
use crate::hls::storage::{SegmentKey, SegmentStore, Stage};
use crate::hls::uri;

/// Single-attempt retrieval of a resource by absolute URI.
///
/// `index` is the segment index the request belongs to, `None` for manifests
/// and keys; it is carried into [`HlsError::Fetch`].
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    async fn fetch(&self, uri: &str, index: Option<usize>) -> Result<Bytes, HlsError>;
}

/// [`ResourceFetcher`] over a shared reqwest client
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http_client: Client,
}

impl HttpFetcher {
    pub fn new(http_client: Client) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl ResourceFetcher for HttpFetcher {
    async fn fetch(&self, uri: &str, index: Option<usize>) -> Result<Bytes, HlsError> {
        let response = self
            .http_client
            .get(uri)
            .send()
            .await
            .map_err(|e| HlsError::fetch(uri, index, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(HlsError::fetch(uri, index, format!("HTTP status {status}")));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| HlsError::fetch(uri, index, e))?;
        debug!(uri, bytes = body.len(), "Fetched resource");
        Ok(body)
    }
}

/// Runs a single fetch under `timeout`
pub async fn fetch_with_timeout(
    fetcher: &dyn ResourceFetcher,
    uri: &str,
    index: Option<usize>,
    timeout: Duration,
) -> Result<Bytes, HlsError> {
    match tokio::time::timeout(timeout, fetcher.fetch(uri, index)).await {
        Ok(result) => result,
        Err(_) => Err(HlsError::fetch(
            uri,
            index,
            format!("timed out after {timeout:?}"),
        )),
    }
}

/// Fetches a playlist and decodes it as UTF-8
pub async fn fetch_text(
    fetcher: &dyn ResourceFetcher,
    uri: &str,
    timeout: Duration,
) -> Result<String, HlsError> {
    let body = fetch_with_timeout(fetcher, uri, None, timeout).await?;
    String::from_utf8(body.to_vec())
        .map_err(|e| HlsError::ManifestFormat(format!("Playlist at {uri} is not UTF-8: {e}")))
}

pub struct SegmentFetcher {
    fetcher: Arc<dyn ResourceFetcher>,
    config: Arc<HlsConfig>,
    events: Option<EventCallback>,
}

impl SegmentFetcher {
    pub fn new(fetcher: Arc<dyn ResourceFetcher>, config: Arc<HlsConfig>) -> Self {
        Self {
            fetcher,
            config,
            events: None,
        }
    }

    pub fn with_events(mut self, events: Option<EventCallback>) -> Self {
        self.events = events;
        self
    }

    /// Fetches one segment, retrying with exponential backoff up to
    /// `max_segment_retries` extra attempts.
    async fn fetch_with_retries(&self, uri: &str, index: usize) -> Result<Bytes, HlsError> {
        let fetcher_config = &self.config.fetcher_config;
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            match fetch_with_timeout(
                self.fetcher.as_ref(),
                uri,
                Some(index),
                fetcher_config.segment_download_timeout,
            )
            .await
            {
                Ok(data) => return Ok(data),
                Err(e) if attempts > fetcher_config.max_segment_retries => return Err(e),
                Err(e) => {
                    let delay = fetcher_config.segment_retry_delay_base
                        * 2_u32.saturating_pow(attempts.saturating_sub(1));
                    warn!(index, uri, attempt = attempts, error = %e, ?delay, "Segment fetch failed, retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn fetch_and_store(
        &self,
        track: TrackKind,
        index: usize,
        uri: String,
        store: &dyn SegmentStore,
    ) -> Result<(usize, usize), HlsError> {
        let data = self.fetch_with_retries(&uri, index).await?;
        let len = data.len();
        store
            .put(SegmentKey::new(track, Stage::Raw, index), data)
            .await?;
        Ok((index, len))
    }

    /// Downloads every segment of a track into `store` at stage `Raw`.
    ///
    /// At most `download_concurrency` fetches are in flight. The first failure,
    /// or cancellation of `cancel`, drops the outstanding fetches and is
    /// returned. Returns the total number of bytes fetched.
    pub async fn fetch_all(
        &self,
        track: TrackKind,
        segments: &[Segment],
        manifest_uri: &str,
        store: &dyn SegmentStore,
        cancel: &CancellationToken,
    ) -> Result<u64, HlsError> {
        let jobs = segments
            .iter()
            .map(|s| uri::resolve(&s.uri, manifest_uri).map(|abs| (s.index, abs)))
            .collect::<Result<Vec<_>, _>>()?;

        let limit = self.config.fetcher_config.download_concurrency.max(1);
        info!(%track, segments = jobs.len(), concurrency = limit, "Fetching segments");

        let mut pending = jobs.into_iter();
        let mut in_flight = FuturesUnordered::new();
        let mut total_bytes: u64 = 0;

        loop {
            // Top up the pool before waiting on the next completion
            while in_flight.len() < limit {
                match pending.next() {
                    Some((index, uri)) => {
                        debug!(%track, index, uri = %uri, "Scheduling segment fetch");
                        in_flight.push(self.fetch_and_store(track, index, uri, store));
                    }
                    None => break,
                }
            }

            if in_flight.is_empty() {
                break;
            }

            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    warn!(%track, outstanding = in_flight.len(), "Segment fetching cancelled");
                    return Err(HlsError::Cancelled);
                }

                Some(result) = in_flight.next() => {
                    match result {
                        Ok((index, bytes)) => {
                            total_bytes += bytes as u64;
                            debug!(%track, index, bytes, "Segment fetched");
                            if let Some(events) = &self.events {
                                events(PipelineEvent::SegmentFetched { track, index, bytes });
                            }
                        }
                        Err(e) => {
                            warn!(%track, error = %e, outstanding = in_flight.len(), "Segment fetch failed, aborting track");
                            return Err(e);
                        }
                    }
                }
            }
        }

        info!(%track, bytes = total_bytes, "All segments fetched");
        Ok(total_bytes)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::hls::storage::MemoryStore;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves canned bodies keyed by URI; unknown URIs fail with a 404-like error
    #[derive(Default)]
    pub(crate) struct ScriptedFetcher {
        bodies: Mutex<HashMap<String, Bytes>>,
        failures: Mutex<HashMap<String, usize>>,
        delays: Mutex<HashMap<String, Duration>>,
        pub(crate) requests: Mutex<Vec<String>>,
        in_flight: AtomicUsize,
        pub(crate) peak_in_flight: AtomicUsize,
    }

    impl ScriptedFetcher {
        pub(crate) fn serve(&self, uri: &str, body: impl Into<Bytes>) {
            self.bodies.lock().insert(uri.to_string(), body.into());
        }

        /// Fail the first `times` requests for `uri`
        pub(crate) fn fail(&self, uri: &str, times: usize) {
            self.failures.lock().insert(uri.to_string(), times);
        }

        pub(crate) fn delay(&self, uri: &str, delay: Duration) {
            self.delays.lock().insert(uri.to_string(), delay);
        }
    }

    #[async_trait]
    impl ResourceFetcher for ScriptedFetcher {
        async fn fetch(&self, uri: &str, index: Option<usize>) -> Result<Bytes, HlsError> {
            self.requests.lock().push(uri.to_string());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

            let delay = self.delays.lock().get(uri).copied();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            {
                let mut failures = self.failures.lock();
                if let Some(remaining) = failures.get_mut(uri) {
                    if *remaining > 0 {
                        *remaining -= 1;
                        return Err(HlsError::fetch(uri, index, "HTTP status 503"));
                    }
                }
            }

            self.bodies
                .lock()
                .get(uri)
                .cloned()
                .ok_or_else(|| HlsError::fetch(uri, index, "HTTP status 404"))
        }
    }

    fn segments(n: usize) -> Vec<Segment> {
        (0..n)
            .map(|index| Segment {
                index,
                uri: format!("seg{index}.ts"),
            })
            .collect()
    }

    const MANIFEST: &str = "http://origin.test/live/index.m3u8";

    fn fetcher_with(
        scripted: Arc<ScriptedFetcher>,
        configure: impl FnOnce(crate::hls::HlsConfigBuilder) -> crate::hls::HlsConfigBuilder,
    ) -> SegmentFetcher {
        let config = configure(HlsConfig::builder()).build();
        SegmentFetcher::new(scripted, Arc::new(config))
    }

    #[tokio::test]
    async fn stores_every_segment_by_index() {
        let scripted = Arc::new(ScriptedFetcher::default());
        for i in 0..6 {
            scripted.serve(&format!("http://origin.test/live/seg{i}.ts"), vec![i as u8; 10 + i]);
        }
        // Later segments complete first
        scripted.delay("http://origin.test/live/seg0.ts", Duration::from_millis(40));
        scripted.delay("http://origin.test/live/seg1.ts", Duration::from_millis(20));

        let fetcher = fetcher_with(scripted.clone(), |b| b.download_concurrency(3));
        let store = MemoryStore::new();
        let total = fetcher
            .fetch_all(TrackKind::Video, &segments(6), MANIFEST, &store, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(total, (0..6).map(|i| 10 + i as u64).sum::<u64>());
        for i in 0..6 {
            let data = store
                .get(SegmentKey::new(TrackKind::Video, Stage::Raw, i))
                .await
                .unwrap();
            assert_eq!(data.len(), 10 + i);
            assert!(data.iter().all(|b| *b == i as u8));
        }
        assert!(scripted.peak_in_flight.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn failure_names_the_index_and_uri() {
        let scripted = Arc::new(ScriptedFetcher::default());
        scripted.serve("http://origin.test/live/seg0.ts", "a");
        scripted.serve("http://origin.test/live/seg1.ts", "b");
        scripted.fail("http://origin.test/live/seg2.ts", 1);

        let fetcher = fetcher_with(scripted, |b| b);
        let err = fetcher
            .fetch_all(
                TrackKind::Video,
                &segments(3),
                MANIFEST,
                &MemoryStore::new(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        match err {
            HlsError::Fetch { uri, index, .. } => {
                assert_eq!(index, Some(2));
                assert_eq!(uri, "http://origin.test/live/seg2.ts");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn retries_recover_transient_failures() {
        let scripted = Arc::new(ScriptedFetcher::default());
        scripted.serve("http://origin.test/live/seg0.ts", "ok");
        scripted.fail("http://origin.test/live/seg0.ts", 2);

        let fetcher = fetcher_with(scripted.clone(), |b| {
            b.segment_retry_count(2)
                .segment_retry_delay(Duration::from_millis(1))
        });
        let store = MemoryStore::new();
        fetcher
            .fetch_all(TrackKind::Audio, &segments(1), MANIFEST, &store, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(scripted.requests.lock().len(), 3);
        assert!(store
            .contains(SegmentKey::new(TrackKind::Audio, Stage::Raw, 0))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn slow_fetch_times_out() {
        let scripted = Arc::new(ScriptedFetcher::default());
        scripted.serve("http://origin.test/live/seg0.ts", "late");
        scripted.delay("http://origin.test/live/seg0.ts", Duration::from_secs(5));

        let fetcher = fetcher_with(scripted, |b| {
            b.segment_download_timeout(Duration::from_millis(20))
        });
        let err = fetcher
            .fetch_all(
                TrackKind::Video,
                &segments(1),
                MANIFEST,
                &MemoryStore::new(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.segment_index(), Some(0));
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn cancelled_token_stops_the_run() {
        let scripted = Arc::new(ScriptedFetcher::default());
        scripted.serve("http://origin.test/live/seg0.ts", "x");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let fetcher = fetcher_with(scripted, |b| b);
        let err = fetcher
            .fetch_all(TrackKind::Video, &segments(1), MANIFEST, &MemoryStore::new(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, HlsError::Cancelled));
    }
}
