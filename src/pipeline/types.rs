//! Data types for the synthesis and playback pipelines.

use crate::error::{LipstreamError, Result};
use image::RgbImage;
use ndarray::{Array2, Array4, Axis, concatenate, s};
use std::path::PathBuf;
use std::sync::Arc;

/// One decoded face crop with its arrival index.
///
/// The image is shared so that window snapshots and padding do not copy pixels.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Position among successfully decoded frames, starting at 0.
    pub index: u64,
    pub image: Arc<RgbImage>,
}

impl Frame {
    pub fn new(index: u64, image: RgbImage) -> Self {
        Self {
            index,
            image: Arc::new(image),
        }
    }

    /// (width, height) in pixels.
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// An ordered, complete batch of frames.
#[derive(Debug, Clone)]
pub struct Window {
    /// Count of windows completed before this one.
    pub index: u64,
    frames: Vec<Frame>,
}

impl Window {
    /// Build a window. Frames must be non-empty and share one size.
    pub fn from_frames(index: u64, frames: Vec<Frame>) -> Result<Self> {
        let Some(first) = frames.first() else {
            return Err(LipstreamError::Other(format!(
                "window {} has no frames",
                index
            )));
        };
        let dims = first.dimensions();
        if let Some(odd) = frames.iter().find(|f| f.dimensions() != dims) {
            return Err(LipstreamError::MalformedFrame {
                index: odd.index,
                message: format!(
                    "frame is {:?}, window {} expects {:?}",
                    odd.dimensions(),
                    index,
                    dims
                ),
            });
        }
        Ok(Self { index, frames })
    }

    /// A window of `len` black frames, used to initialize a model.
    pub fn blank(len: usize, size: u32) -> Self {
        let image = Arc::new(RgbImage::new(size, size));
        let frames = (0..len as u64)
            .map(|index| Frame {
                index,
                image: Arc::clone(&image),
            })
            .collect();
        Self { index: 0, frames }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// `(N, H, W, 3)` tensor with pixels scaled to `[0, 1]`.
    pub fn tensor(&self) -> Array4<f32> {
        let (width, height) = self
            .frames
            .first()
            .map(|f| f.dimensions())
            .unwrap_or((0, 0));
        Array4::from_shape_fn(
            (self.frames.len(), height as usize, width as usize, 3),
            |(n, y, x, c)| {
                let pixel = self.frames[n].image.get_pixel(x as u32, y as u32);
                pixel.0[c] as f32 / 255.0
            },
        )
    }
}

/// `(bins, steps)` spectrogram fragment or running buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrogram(pub Array2<f32>);

impl Spectrogram {
    pub fn zeros(bins: usize, steps: usize) -> Self {
        Self(Array2::zeros((bins, steps)))
    }

    pub fn bins(&self) -> usize {
        self.0.nrows()
    }

    pub fn steps(&self) -> usize {
        self.0.ncols()
    }

    /// Append `other` along the time axis after dropping its first `overlap` steps.
    pub fn append_trimmed(&mut self, other: &Spectrogram, overlap: usize) -> Result<()> {
        if other.bins() != self.bins() {
            return Err(LipstreamError::Inference {
                message: format!(
                    "fragment has {} bins, buffer has {}",
                    other.bins(),
                    self.bins()
                ),
            });
        }
        let start = overlap.min(other.steps());
        let tail = other.0.slice(s![.., start..]);
        self.0 = concatenate(Axis(1), &[self.0.view(), tail]).map_err(|e| {
            LipstreamError::Inference {
                message: format!("spectrogram concatenation failed: {}", e),
            }
        })?;
        Ok(())
    }
}

/// Mono audio samples in the model's nominal range.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |m, s| m.max(s.abs()))
    }

    /// Round and saturate to 16-bit PCM.
    pub fn to_pcm16(&self) -> Vec<i16> {
        self.samples
            .iter()
            .map(|s| s.round().clamp(i16::MIN as f32, i16::MAX as f32) as i16)
            .collect()
    }

    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// A normalized waveform ready for dispatch.
#[derive(Debug, Clone)]
pub struct OutputUnit {
    /// Starts at 1, strictly increasing, never reused.
    pub sequence: u64,
    /// Window that completed this unit.
    pub window_index: u64,
    pub waveform: Waveform,
}

/// Where a dispatched unit went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    File(PathBuf),
    Topic(String),
}

/// Emitted by the synthesis station for every successfully dispatched unit.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputReceipt {
    pub sequence: u64,
    pub window_index: u64,
    pub destination: Destination,
    pub samples: usize,
}

/// A clip staged on disk, waiting for its turn on the output device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackItem {
    /// Arrival position, starting at 1.
    pub clip: u64,
    pub path: PathBuf,
}

/// Emitted by the player station after each clip finishes playing.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackReport {
    pub clip: u64,
    pub samples: usize,
    pub sample_rate: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn solid(index: u64, size: u32, value: u8) -> Frame {
        Frame::new(index, RgbImage::from_pixel(size, size, Rgb([value, value, value])))
    }

    #[test]
    fn test_window_rejects_empty_and_mixed_sizes() {
        assert!(Window::from_frames(0, vec![]).is_err());

        let frames = vec![solid(0, 4, 0), solid(1, 8, 0)];
        let err = Window::from_frames(3, frames).unwrap_err();
        assert!(matches!(err, LipstreamError::MalformedFrame { index: 1, .. }));
    }

    #[test]
    fn test_window_tensor_shape_and_scale() {
        let frames = vec![solid(0, 2, 0), solid(1, 2, 255), solid(2, 2, 51)];
        let window = Window::from_frames(0, frames).unwrap();
        let tensor = window.tensor();

        assert_eq!(tensor.shape(), &[3, 2, 2, 3]);
        assert_eq!(tensor[[0, 0, 0, 0]], 0.0);
        assert_eq!(tensor[[1, 1, 1, 2]], 1.0);
        assert!((tensor[[2, 0, 1, 1]] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_blank_window() {
        let window = Window::blank(5, 8);
        assert_eq!(window.len(), 5);
        assert_eq!(window.frames()[4].dimensions(), (8, 8));
        assert!(window.tensor().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_append_trimmed_drops_leading_steps() {
        let mut buffer = Spectrogram(Array2::from_elem((2, 5), 1.0));
        let fragment = Spectrogram(Array2::from_shape_fn((2, 5), |(_, t)| t as f32));

        buffer.append_trimmed(&fragment, 2).unwrap();

        assert_eq!(buffer.steps(), 8);
        assert_eq!(buffer.0[[0, 4]], 1.0);
        // First appended column is step 2 of the fragment
        assert_eq!(buffer.0[[1, 5]], 2.0);
        assert_eq!(buffer.0[[1, 7]], 4.0);
    }

    #[test]
    fn test_append_trimmed_rejects_bin_mismatch() {
        let mut buffer = Spectrogram::zeros(3, 4);
        let fragment = Spectrogram::zeros(2, 4);
        assert!(buffer.append_trimmed(&fragment, 1).is_err());
        assert_eq!(buffer.steps(), 4);
    }

    #[test]
    fn test_waveform_pcm16_saturates() {
        let waveform = Waveform::new(vec![0.4, -1.6, 40000.0, -40000.0], 16000);
        assert_eq!(waveform.to_pcm16(), vec![0, -2, i16::MAX, i16::MIN]);
        assert_eq!(waveform.peak(), 40000.0);
    }
}
