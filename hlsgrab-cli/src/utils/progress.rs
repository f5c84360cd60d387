use hlsgrab_engine::{PipelineEvent, TrackKind};
use indicatif::{HumanBytes, MultiProgress, ProgressBar, ProgressStyle};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

fn segment_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} {msg}\n[{elapsed_precise}] [{bar:40.green/white}] {pos}/{len} segments")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

/// Renders one segment counter per track from pipeline events
#[derive(Clone)]
pub struct ProgressManager {
    multi: MultiProgress,
    bars: Arc<Mutex<HashMap<TrackKind, ProgressBar>>>,
    disabled: bool,
}

impl ProgressManager {
    pub fn new(multi: MultiProgress) -> Self {
        Self {
            multi,
            bars: Arc::new(Mutex::new(HashMap::new())),
            disabled: false,
        }
    }

    pub fn new_disabled(multi: MultiProgress) -> Self {
        Self {
            multi,
            bars: Arc::new(Mutex::new(HashMap::new())),
            disabled: true,
        }
    }

    pub fn handle_event(&self, event: PipelineEvent) {
        if self.disabled {
            return;
        }

        let Ok(mut bars) = self.bars.lock() else {
            return;
        };
        match event {
            PipelineEvent::TrackStarted {
                track,
                segments,
                encrypted,
            } => {
                let bar = self.multi.add(ProgressBar::new(segments as u64));
                bar.set_style(segment_style());
                let lock = if encrypted { " (AES-128)" } else { "" };
                bar.set_message(format!("Fetching {track}{lock}"));
                bar.enable_steady_tick(Duration::from_millis(500));
                bars.insert(track, bar);
            }
            PipelineEvent::SegmentFetched { track, .. } => {
                if let Some(bar) = bars.get(&track) {
                    bar.inc(1);
                }
            }
            PipelineEvent::TrackDecrypted { track } => {
                if let Some(bar) = bars.get(&track) {
                    bar.set_message(format!("Assembling {track}"));
                }
            }
            PipelineEvent::TrackAssembled { track, path, bytes } => {
                if let Some(bar) = bars.remove(&track) {
                    bar.finish_with_message(format!(
                        "Finished {} ({})",
                        path.display(),
                        HumanBytes(bytes)
                    ));
                }
            }
            PipelineEvent::ManifestFetched { .. }
            | PipelineEvent::VariantSelected { .. }
            | PipelineEvent::Finished => {}
        }
    }
}
