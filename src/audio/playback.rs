//! Audio output backends for staged clips.
//!
//! `play` returns only after the clip has finished, which is what keeps the
//! player strictly serial.

use crate::error::{LipstreamError, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Plays one WAV file to completion.
pub trait AudioOutput: Send {
    fn play(&mut self, path: &Path) -> Result<()>;

    /// Name for logging
    fn name(&self) -> &'static str;
}

/// Plays clips by running an external program (e.g. `aplay -q <file>`).
#[derive(Debug, Clone)]
pub struct CommandAudioOutput {
    program: String,
    args: Vec<String>,
}

impl CommandAudioOutput {
    /// `command[0]` is the program, the rest are leading arguments; the clip
    /// path is appended.
    pub fn new(command: &[String]) -> Result<Self> {
        let Some((program, args)) = command.split_first() else {
            return Err(LipstreamError::ConfigInvalidValue {
                key: "player.command".to_string(),
                message: "must name a program".to_string(),
            });
        };
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl AudioOutput for CommandAudioOutput {
    fn play(&mut self, path: &Path) -> Result<()> {
        debug!(program = %self.program, "playing {}", path.display());
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .output()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    LipstreamError::AudioDeviceNotFound {
                        device: format!("player program '{}'", self.program),
                    }
                } else {
                    LipstreamError::AudioOutput {
                        message: format!("failed to run {}: {}", self.program, e),
                    }
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(LipstreamError::AudioOutput {
                message: format!(
                    "{} failed with status {:?}: {}",
                    self.program,
                    output.status.code(),
                    stderr.trim()
                ),
            });
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "command"
    }
}

/// Mock output for testing
///
/// Records every path it is asked to play and fails on chosen call numbers.
/// Fails loudly if two plays ever overlap.
#[derive(Debug, Clone, Default)]
pub struct MockAudioOutput {
    played: Arc<Mutex<Vec<PathBuf>>>,
    fail_on: Vec<usize>,
    calls: usize,
    busy: Arc<AtomicBool>,
    delay: Option<std::time::Duration>,
}

impl MockAudioOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `n`th call to `play` (0-based).
    pub fn fail_on_call(mut self, n: usize) -> Self {
        self.fail_on.push(n);
        self
    }

    /// Pretend each clip takes `delay` to play.
    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Shared list of successfully played paths.
    pub fn played(&self) -> Arc<Mutex<Vec<PathBuf>>> {
        Arc::clone(&self.played)
    }
}

impl AudioOutput for MockAudioOutput {
    fn play(&mut self, path: &Path) -> Result<()> {
        let call = self.calls;
        self.calls += 1;

        if self.busy.swap(true, Ordering::SeqCst) {
            return Err(LipstreamError::AudioOutput {
                message: "overlapping playback".to_string(),
            });
        }
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        let result = if self.fail_on.contains(&call) {
            Err(LipstreamError::AudioOutput {
                message: format!("mock playback failure on call {}", call),
            })
        } else if !path.exists() {
            Err(LipstreamError::AudioOutput {
                message: format!("{} does not exist", path.display()),
            })
        } else {
            if let Ok(mut played) = self.played.lock() {
                played.push(path.to_path_buf());
            }
            Ok(())
        };
        self.busy.store(false, Ordering::SeqCst);
        result
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
