//! Replays pre-cut face frames onto the frames topic.
//!
//! A source is either a single cut directory (`.../cut_3`) holding numbered
//! `.jpg` frames, or a directory of such cut directories. Cuts and frames are
//! both visited in numeric order.

use crate::error::{LipstreamError, Result};
use crate::transport::Publisher;
use image::ImageOutputFormat;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Length of the `cut_` prefix on cut directory names.
const CUT_PREFIX_LEN: usize = 4;

/// Counters for one replay run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub published: u64,
    pub skipped: u64,
    pub failed: u64,
}

/// Cut directories under `source`, in numeric order.
pub fn cut_directories(source: &Path) -> Result<Vec<PathBuf>> {
    let is_single_cut = source
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.contains("cut"));
    if is_single_cut {
        return Ok(vec![source.to_path_buf()]);
    }

    let mut cuts = Vec::new();
    for entry in fs::read_dir(source)? {
        let path = entry?.path();
        if !path.is_dir() {
            continue;
        }
        let number = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| name.get(CUT_PREFIX_LEN..))
            .and_then(|suffix| suffix.parse::<u64>().ok());
        match number {
            Some(n) => cuts.push((n, path)),
            None => debug!("ignoring {}", path.display()),
        }
    }
    cuts.sort_by_key(|(n, _)| *n);
    Ok(cuts.into_iter().map(|(_, path)| path).collect())
}

/// Numbered `.jpg` frames in `cut`, in numeric order.
pub fn frame_files(cut: &Path) -> Result<Vec<PathBuf>> {
    let mut frames = Vec::new();
    for entry in fs::read_dir(cut)? {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("jpg") {
            continue;
        }
        let number = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .and_then(|stem| stem.parse::<u64>().ok());
        match number {
            Some(n) => frames.push((n, path)),
            None => debug!("ignoring {}", path.display()),
        }
    }
    frames.sort_by_key(|(n, _)| *n);
    Ok(frames.into_iter().map(|(_, path)| path).collect())
}

/// Read an image file and re-encode it as a PNG payload.
pub fn load_frame(path: &Path) -> Result<Vec<u8>> {
    let image = image::open(path)
        .map_err(|e| LipstreamError::Other(format!("cannot read {}: {}", path.display(), e)))?;
    let mut bytes = Cursor::new(Vec::new());
    image
        .to_rgb8()
        .write_to(&mut bytes, ImageOutputFormat::Png)
        .map_err(|e| LipstreamError::Other(format!("cannot encode {}: {}", path.display(), e)))?;
    Ok(bytes.into_inner())
}

/// Publishes frames from disk, optionally paced.
pub struct Replayer {
    publisher: Arc<dyn Publisher>,
    interval: Option<Duration>,
    cancel: Arc<AtomicBool>,
}

impl Replayer {
    pub fn new(publisher: Arc<dyn Publisher>) -> Self {
        Self {
            publisher,
            interval: None,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Minimum time between two publishes.
    pub fn with_interval(mut self, interval: Option<Duration>) -> Self {
        self.interval = interval.filter(|d| !d.is_zero());
        self
    }

    /// Flag that stops the run before the next frame when set.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Publish every frame under `source`.
    ///
    /// Unreadable frames and failed publishes are logged and counted; the run
    /// continues with the next frame.
    pub fn run(&self, source: &Path) -> Result<ReplayStats> {
        let mut stats = ReplayStats::default();
        let cuts = cut_directories(source)?;
        info!(
            cuts = cuts.len(),
            "replaying frames from {} to {}",
            source.display(),
            self.publisher.topic()
        );

        for cut in cuts {
            for path in frame_files(&cut)? {
                if self.cancel.load(Ordering::SeqCst) {
                    info!(published = stats.published, "replay cancelled");
                    return Ok(stats);
                }
                let started = Instant::now();

                let payload = match load_frame(&path) {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!("skipping frame: {}", e);
                        stats.skipped += 1;
                        continue;
                    }
                };
                match self.publisher.publish(payload) {
                    Ok(()) => stats.published += 1,
                    Err(e) => {
                        warn!("publish of {} failed: {}", path.display(), e);
                        stats.failed += 1;
                    }
                }
                debug!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "sent {}",
                    path.display()
                );

                if let Some(interval) = self.interval {
                    let elapsed = started.elapsed();
                    if elapsed < interval {
                        std::thread::sleep(interval - elapsed);
                    }
                }
            }
        }

        info!(
            published = stats.published,
            skipped = stats.skipped,
            failed = stats.failed,
            "replay finished"
        );
        Ok(stats)
    }
}
