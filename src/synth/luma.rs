//! Weight-free reference model.
//!
//! Reads the window's `(N, H, W, 3)` input tensor as a stack of horizontal
//! luminance bands: each spectrogram step samples one frame, each bin is the
//! mean brightness of one band (bin 0 is the bottom band). Inversion drives a
//! bank of phase-continuous sine oscillators, one per bin, for `hop_size`
//! samples per step. The audio is not speech; the model exists so the whole
//! pipeline runs without trained weights.

use crate::error::{LipstreamError, Result};
use crate::pipeline::types::{Spectrogram, Waveform, Window};
use crate::synth::model::SynthesisModel;
use ndarray::{Array2, ArrayView3, Axis, s};
use std::f32::consts::TAU;
use tracing::debug;

const LOWEST_HZ: f32 = 100.0;
const HIGHEST_HZ: f32 = 4000.0;

pub struct LumaModel {
    bins: usize,
    steps: usize,
    hop_size: usize,
    sample_rate: u32,
    /// Per-bin oscillator phase increment, filled by `load`.
    increments: Vec<f32>,
}

impl LumaModel {
    pub fn new(bins: usize, steps: usize, hop_size: usize, sample_rate: u32) -> Self {
        Self {
            bins,
            steps,
            hop_size,
            sample_rate,
            increments: Vec::new(),
        }
    }

    /// Mean luminance of each horizontal band of one `(H, W, 3)` frame in `[0, 1]`.
    fn band_means(&self, frame: ArrayView3<f32>) -> Vec<f32> {
        let height = frame.shape()[0];
        (0..self.bins)
            .map(|bin| {
                // Bin 0 sits at the bottom edge of the image.
                let top = ((self.bins - 1 - bin) * height / self.bins).min(height);
                let bottom = ((self.bins - bin) * height / self.bins).max(top + 1).min(height);
                let band = frame.slice(s![top..bottom, .., ..]);
                let count = band.len() / 3;
                if count == 0 {
                    return 0.0;
                }
                let sum: f32 = band
                    .lanes(Axis(2))
                    .into_iter()
                    .map(|rgb| 0.299 * rgb[0] + 0.587 * rgb[1] + 0.114 * rgb[2])
                    .sum();
                sum / count as f32
            })
            .collect()
    }
}

impl SynthesisModel for LumaModel {
    fn name(&self) -> &str {
        "luma"
    }

    fn load(&mut self) -> Result<()> {
        if self.bins == 0 || self.steps == 0 || self.hop_size == 0 || self.sample_rate == 0 {
            return Err(LipstreamError::ModelLoad {
                model: "luma".to_string(),
                message: "bins, steps, hop size and sample rate must be positive".to_string(),
            });
        }
        let sr = self.sample_rate as f32;
        let highest = HIGHEST_HZ.min(0.45 * sr).max(LOWEST_HZ);
        self.increments = (0..self.bins)
            .map(|bin| {
                let t = if self.bins > 1 {
                    bin as f32 / (self.bins - 1) as f32
                } else {
                    0.0
                };
                TAU * (LOWEST_HZ + (highest - LOWEST_HZ) * t) / sr
            })
            .collect();
        debug!(
            bins = self.bins,
            lowest_hz = LOWEST_HZ,
            highest_hz = highest,
            "luma oscillator bank ready"
        );
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn spectrogram(&mut self, window: &Window) -> Result<Spectrogram> {
        if window.is_empty() {
            return Err(LipstreamError::Inference {
                message: format!("window {} is empty", window.index),
            });
        }

        let tensor = window.tensor();
        let frames = tensor.shape()[0];
        let mut cached: Vec<Option<Vec<f32>>> = vec![None; frames];
        let mut spectrogram = Array2::zeros((self.bins, self.steps));
        for step in 0..self.steps {
            let frame = step * frames / self.steps;
            let means = cached[frame]
                .get_or_insert_with(|| self.band_means(tensor.index_axis(Axis(0), frame)));
            for (bin, value) in means.iter().enumerate() {
                spectrogram[[bin, step]] = *value;
            }
        }
        Ok(Spectrogram(spectrogram))
    }

    fn waveform(&mut self, window: &Window) -> Result<Waveform> {
        let spectrogram = self.spectrogram(window)?;
        self.invert(&spectrogram)
    }

    fn invert(&mut self, spectrogram: &Spectrogram) -> Result<Waveform> {
        if spectrogram.bins() != self.increments.len() {
            return Err(LipstreamError::Inference {
                message: format!(
                    "spectrogram has {} bins, model expects {}",
                    spectrogram.bins(),
                    self.increments.len()
                ),
            });
        }

        let mut phases = vec![0.0f32; self.bins];
        let mut samples = Vec::with_capacity(spectrogram.steps() * self.hop_size);
        let gain = 1.0 / self.bins as f32;
        for column in spectrogram.0.columns() {
            for _ in 0..self.hop_size {
                let mut sample = 0.0f32;
                for ((amplitude, phase), increment) in
                    column.iter().zip(phases.iter_mut()).zip(&self.increments)
                {
                    sample += amplitude * phase.sin();
                    *phase = (*phase + increment) % TAU;
                }
                samples.push(sample * gain);
            }
        }
        Ok(Waveform::new(samples, self.sample_rate))
    }
}
