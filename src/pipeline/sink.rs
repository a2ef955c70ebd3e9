//! Output dispatch for synthesized waveforms.

use crate::audio::wav::{encode_wav, write_wav};
use crate::config::{OutputAction, OutputConfig};
use crate::error::{LipstreamError, Result};
use crate::pipeline::types::{Destination, OutputUnit};
use crate::transport::Publisher;
use std::fs::{self, File, OpenOptions};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Pluggable destination for output units.
pub trait WaveformSink: Send + 'static {
    /// Deliver one unit. Failures are not retried.
    fn dispatch(&mut self, unit: &OutputUnit) -> Result<Destination>;

    /// Name for logging/debugging.
    fn name(&self) -> &'static str {
        "sink"
    }
}

/// Writes each unit to `<root>/<sequence>.wav`.
pub struct PersistSink {
    root: PathBuf,
    root_ready: bool,
}

impl PersistSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            root_ready: false,
        }
    }

    pub fn path_for(&self, sequence: u64) -> PathBuf {
        self.root.join(format!("{}.wav", sequence))
    }
}

impl WaveformSink for PersistSink {
    fn dispatch(&mut self, unit: &OutputUnit) -> Result<Destination> {
        if !self.root_ready {
            fs::create_dir_all(&self.root)?;
            self.root_ready = true;
            info!("writing results to {}", self.root.display());
        }

        let path = self.path_for(unit.sequence);
        write_new_file(&path, unit.sequence, |file| {
            write_wav(BufWriter::new(file), &unit.waveform)
        })?;
        debug!(sequence = unit.sequence, "saved {}", path.display());
        Ok(Destination::File(path))
    }

    fn name(&self) -> &'static str {
        "persist"
    }
}

/// Create `path` exclusively and fill it with `write`.
///
/// A failed write removes the partial file so no truncated clip is left behind.
fn write_new_file(
    path: &Path,
    sequence: u64,
    write: impl FnOnce(File) -> Result<()>,
) -> Result<()> {
    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                LipstreamError::DispatchFailed {
                    sequence,
                    message: format!("{} already exists", path.display()),
                }
            } else {
                LipstreamError::Io(e)
            }
        })?;

    if let Err(e) = write(file) {
        if let Err(remove) = fs::remove_file(path) {
            warn!("could not remove partial {}: {}", path.display(), remove);
        }
        return Err(LipstreamError::DispatchFailed {
            sequence,
            message: format!("writing {}: {}", path.display(), e),
        });
    }
    Ok(())
}

/// Publishes each unit as one WAV message.
pub struct ForwardSink {
    publisher: Arc<dyn Publisher>,
}

impl ForwardSink {
    pub fn new(publisher: Arc<dyn Publisher>) -> Self {
        Self { publisher }
    }
}

impl WaveformSink for ForwardSink {
    fn dispatch(&mut self, unit: &OutputUnit) -> Result<Destination> {
        let payload = encode_wav(&unit.waveform)?;
        let size = payload.len();
        self.publisher.publish(payload)?;
        debug!(
            sequence = unit.sequence,
            bytes = size,
            "published to {}",
            self.publisher.topic()
        );
        Ok(Destination::Topic(self.publisher.topic().to_string()))
    }

    fn name(&self) -> &'static str {
        "forward"
    }
}

/// Keeps every unit in memory. Used in tests.
#[derive(Clone, Default)]
pub struct CollectorSink {
    collected: Arc<Mutex<Vec<OutputUnit>>>,
}

impl CollectorSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle to the collected units.
    pub fn collected(&self) -> Arc<Mutex<Vec<OutputUnit>>> {
        Arc::clone(&self.collected)
    }
}

impl WaveformSink for CollectorSink {
    fn dispatch(&mut self, unit: &OutputUnit) -> Result<Destination> {
        self.collected
            .lock()
            .map_err(|_| LipstreamError::Other("collector poisoned".to_string()))?
            .push(unit.clone());
        Ok(Destination::Topic("memory".to_string()))
    }

    fn name(&self) -> &'static str {
        "collector"
    }
}

/// Build the configured sink. Forward mode needs a publisher.
pub fn build_sink(
    config: &OutputConfig,
    publisher: Option<Arc<dyn Publisher>>,
) -> Result<Box<dyn WaveformSink>> {
    match config.action {
        OutputAction::Persist => Ok(Box::new(PersistSink::new(&config.results_root))),
        OutputAction::Forward => {
            let publisher = publisher.ok_or_else(|| LipstreamError::ConfigInvalidValue {
                key: "output.action".to_string(),
                message: "forward requires an audio publisher".to_string(),
            })?;
            Ok(Box::new(ForwardSink::new(publisher)))
        }
    }
}
