//! Player station: clip payloads in, played clips out, strictly one at a time.

use crate::audio::playback::AudioOutput;
use crate::audio::wav::{decode_wav, write_pcm16};
use crate::error::{LipstreamError, Result};
use crate::pipeline::error::StationError;
use crate::pipeline::station::Station;
use crate::pipeline::types::{PlaybackItem, PlaybackReport};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, ErrorKind};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const MAX_STAGE_ATTEMPTS: u32 = 1000;

/// Stages each payload to `<staging_dir>/<clip>.wav` and plays it to completion
/// before accepting the next one.
///
/// Staged files are created exclusively. When `<clip>.wav` is already taken
/// (kept from an earlier run, or another player sharing the directory) the clip
/// goes to `<clip>-<k>.wav` with the first free `k`.
pub struct PlayerStation {
    output: Box<dyn AudioOutput>,
    staging_dir: PathBuf,
    keep_files: bool,
    next_clip: u64,
    played: u64,
}

impl PlayerStation {
    pub fn new(output: Box<dyn AudioOutput>, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            output,
            staging_dir: staging_dir.into(),
            keep_files: false,
            next_clip: 1,
            played: 0,
        }
    }

    /// Leave staged clips on disk after playback.
    pub fn with_keep_files(mut self, keep: bool) -> Self {
        self.keep_files = keep;
        self
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    fn stage(&self, clip: u64, payload: &[u8]) -> Result<(PlaybackItem, PlaybackReport)> {
        let decoded = decode_wav(payload)?;
        fs::create_dir_all(&self.staging_dir)?;
        let (path, file) = self.create_staged(clip)?;
        if let Err(e) = write_pcm16(BufWriter::new(file), &decoded.samples, decoded.sample_rate) {
            if let Err(remove) = fs::remove_file(&path) {
                debug!("could not remove {}: {}", path.display(), remove);
            }
            return Err(e);
        }
        let report = PlaybackReport {
            clip,
            samples: decoded.samples.len(),
            sample_rate: decoded.sample_rate,
        };
        Ok((PlaybackItem { clip, path }, report))
    }

    fn create_staged(&self, clip: u64) -> Result<(PathBuf, File)> {
        let mut path = self.staging_dir.join(format!("{}.wav", clip));
        let mut attempt = 0u32;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists && attempt < MAX_STAGE_ATTEMPTS => {
                    attempt += 1;
                    path = self.staging_dir.join(format!("{}-{}.wav", clip, attempt));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn discard(&self, item: &PlaybackItem) {
        if self.keep_files {
            return;
        }
        if let Err(e) = fs::remove_file(&item.path) {
            debug!("could not remove {}: {}", item.path.display(), e);
        }
    }
}

impl Station for PlayerStation {
    type Input = Vec<u8>;
    type Output = PlaybackReport;

    fn name(&self) -> &'static str {
        "player"
    }

    fn process(
        &mut self,
        payload: Vec<u8>,
    ) -> std::result::Result<Option<PlaybackReport>, StationError> {
        let clip = self.next_clip;
        self.next_clip += 1;

        let wrap = |e: LipstreamError| LipstreamError::Playback {
            clip,
            message: e.to_string(),
        };

        let (item, report) = self.stage(clip, &payload).map_err(wrap)?;
        debug!(clip, "staged {}", item.path.display());

        let result = self.output.play(&item.path);
        self.discard(&item);
        result.map_err(wrap)?;

        self.played += 1;
        info!(
            clip,
            samples = report.samples,
            sample_rate = report.sample_rate,
            "clip played via {}",
            self.output.name()
        );
        Ok(Some(report))
    }

    fn shutdown(&mut self) {
        let staging_empty =
            fs::read_dir(&self.staging_dir).is_ok_and(|mut entries| entries.next().is_none());
        if !self.keep_files
            && staging_empty
            && let Err(e) = fs::remove_dir(&self.staging_dir)
        {
            warn!("could not remove {}: {}", self.staging_dir.display(), e);
        }
        info!(
            received = self.next_clip - 1,
            played = self.played,
            "player stopped"
        );
    }
}
