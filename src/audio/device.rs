//! Direct playback through the system's output device.

use crate::audio::playback::AudioOutput;
use crate::audio::wav::{decode_wav, resample};
use crate::error::{LipstreamError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How often `play` checks whether the device has consumed the clip.
const DRAIN_POLL: Duration = Duration::from_millis(10);

/// Extra time allowed past the clip's nominal duration before giving up.
const DRAIN_SLACK: Duration = Duration::from_secs(2);

/// Run a closure with stderr temporarily redirected to /dev/null.
///
/// ALSA and JACK print probing noise straight to fd 2 while cpal enumerates
/// backends.
fn with_suppressed_stderr<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    unsafe {
        let saved_fd = libc::dup(2);
        let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
        if saved_fd >= 0 && devnull >= 0 {
            libc::dup2(devnull, 2);
            libc::close(devnull);
        }

        let result = f();

        if saved_fd >= 0 {
            libc::dup2(saved_fd, 2);
            libc::close(saved_fd);
        }

        result
    }
}

/// Plays clips on an output device via cpal, resampling to the device rate.
pub struct CpalAudioOutput {
    device: cpal::Device,
}

impl CpalAudioOutput {
    /// Open the named output device, or the host default.
    pub fn new(device_name: Option<&str>) -> Result<Self> {
        let device = with_suppressed_stderr(|| {
            let host = cpal::default_host();

            if let Some(name) = device_name {
                let devices = host
                    .output_devices()
                    .map_err(|e| LipstreamError::AudioOutput {
                        message: format!("Failed to enumerate output devices: {}", e),
                    })?;

                let mut found_device = None;
                for dev in devices {
                    if let Ok(dev_name) = dev.name()
                        && dev_name == name
                    {
                        found_device = Some(dev);
                        break;
                    }
                }

                found_device.ok_or_else(|| LipstreamError::AudioDeviceNotFound {
                    device: name.to_string(),
                })
            } else {
                host.default_output_device()
                    .ok_or_else(|| LipstreamError::AudioDeviceNotFound {
                        device: "default output".to_string(),
                    })
            }
        })?;

        Ok(Self { device })
    }

    fn build_stream(
        &self,
        samples: Arc<Vec<i16>>,
        cursor: Arc<AtomicUsize>,
        channels: usize,
        config: &cpal::SupportedStreamConfig,
    ) -> Result<cpal::Stream> {
        use cpal::SampleFormat;

        let stream_config: cpal::StreamConfig = config.clone().into();
        let err_callback = |err| {
            warn!("audio stream error: {}", err);
        };

        // Each callback fills interleaved frames with the next mono sample.
        let next = move |cursor: &AtomicUsize| -> Option<i16> {
            let index = cursor.fetch_add(1, Ordering::Relaxed);
            samples.get(index).copied()
        };

        match config.sample_format() {
            SampleFormat::I16 => self
                .device
                .build_output_stream(
                    &stream_config,
                    move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                        for frame in data.chunks_mut(channels) {
                            let value = next(&cursor).unwrap_or(0);
                            frame.fill(value);
                        }
                    },
                    err_callback,
                    None,
                )
                .map_err(|e| LipstreamError::AudioOutput {
                    message: format!("Failed to build i16 output stream: {}", e),
                }),
            SampleFormat::F32 => self
                .device
                .build_output_stream(
                    &stream_config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        for frame in data.chunks_mut(channels) {
                            let value = next(&cursor).map_or(0.0, |s| s as f32 / i16::MAX as f32);
                            frame.fill(value);
                        }
                    },
                    err_callback,
                    None,
                )
                .map_err(|e| LipstreamError::AudioOutput {
                    message: format!("Failed to build f32 output stream: {}", e),
                }),
            fmt => Err(LipstreamError::AudioOutput {
                message: format!(
                    "Unsupported output sample format: {:?}. \
                     Try the command backend instead.",
                    fmt
                ),
            }),
        }
    }
}

impl AudioOutput for CpalAudioOutput {
    fn play(&mut self, path: &Path) -> Result<()> {
        let bytes = std::fs::read(path)?;
        let clip = decode_wav(&bytes)?;

        let config = self
            .device
            .default_output_config()
            .map_err(|e| LipstreamError::AudioOutput {
                message: format!("Failed to query default output config: {}", e),
            })?;
        let device_rate = config.sample_rate().0;
        let channels = config.channels().max(1) as usize;

        let samples = Arc::new(resample(&clip.samples, clip.sample_rate, device_rate));
        let total = samples.len();
        let cursor = Arc::new(AtomicUsize::new(0));
        debug!(
            samples = total,
            device_rate,
            channels,
            "playing {}",
            path.display()
        );

        let stream = self.build_stream(Arc::clone(&samples), Arc::clone(&cursor), channels, &config)?;
        stream.play().map_err(|e| LipstreamError::AudioOutput {
            message: format!("Failed to start output stream: {}", e),
        })?;

        let nominal = Duration::from_secs_f64(total as f64 / device_rate.max(1) as f64);
        let deadline = Instant::now() + nominal + DRAIN_SLACK;
        while cursor.load(Ordering::Relaxed) < total {
            if Instant::now() >= deadline {
                return Err(LipstreamError::AudioOutput {
                    message: "output device stopped consuming samples".to_string(),
                });
            }
            std::thread::sleep(DRAIN_POLL);
        }
        // Let the device drain its last buffer before the stream is dropped.
        std::thread::sleep(DRAIN_POLL * 5);
        drop(stream);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "cpal"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore = "requires an audio output device"]
    fn test_open_default_output_device() {
        let output = CpalAudioOutput::new(None);
        assert!(output.is_ok());
    }

    #[test]
    fn test_unknown_device_name_is_not_found() {
        match CpalAudioOutput::new(Some("lipstream-no-such-device")) {
            Err(LipstreamError::AudioDeviceNotFound { device }) => {
                assert_eq!(device, "lipstream-no-such-device");
            }
            // Hosts without any audio backend fail enumeration instead
            Err(LipstreamError::AudioOutput { .. }) => {}
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }
}
