use crate::error::{LipstreamError, Result};
use crate::pipeline::types::{Spectrogram, Waveform, Window};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::info;

/// Trait for the inference capability that turns frame windows into audio.
///
/// This trait allows swapping implementations (reference model vs mock).
/// Implementations may defer expensive setup to [`load`](Self::load); callers
/// go through [`ModelHandle`], which loads once on first use.
pub trait SynthesisModel: Send {
    /// Name of the model for logging
    fn name(&self) -> &str;

    /// Prepare the model for inference. Called once before the first request.
    fn load(&mut self) -> Result<()>;

    /// Sample rate of produced waveforms
    fn sample_rate(&self) -> u32;

    /// Predict a `(bins, steps)` spectrogram fragment for one window.
    fn spectrogram(&mut self, window: &Window) -> Result<Spectrogram>;

    /// Predict a complete waveform for one window.
    fn waveform(&mut self, window: &Window) -> Result<Waveform>;

    /// Convert a spectrogram (single fragment or concatenation) to audio.
    fn invert(&mut self, spectrogram: &Spectrogram) -> Result<Waveform>;
}

/// Owns a model and loads it lazily, exactly once per process.
pub struct ModelHandle {
    model: Box<dyn SynthesisModel>,
    loaded: bool,
}

impl ModelHandle {
    pub fn new(model: Box<dyn SynthesisModel>) -> Self {
        Self {
            model,
            loaded: false,
        }
    }

    pub fn name(&self) -> &str {
        self.model.name()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn sample_rate(&self) -> u32 {
        self.model.sample_rate()
    }

    /// Load the model if that has not happened yet.
    ///
    /// A failed load is retried on the next request.
    pub fn ensure_loaded(&mut self) -> Result<&mut dyn SynthesisModel> {
        if !self.loaded {
            let start = Instant::now();
            self.model.load().map_err(|e| match e {
                LipstreamError::ModelLoad { .. } => e,
                other => LipstreamError::ModelLoad {
                    model: self.model.name().to_string(),
                    message: other.to_string(),
                },
            })?;
            self.loaded = true;
            info!(
                model = self.model.name(),
                "model loaded in {:.0?}",
                start.elapsed()
            );
        }
        Ok(self.model.as_mut())
    }

    pub fn spectrogram(&mut self, window: &Window) -> Result<Spectrogram> {
        self.ensure_loaded()?.spectrogram(window)
    }

    pub fn waveform(&mut self, window: &Window) -> Result<Waveform> {
        self.ensure_loaded()?.waveform(window)
    }

    pub fn invert(&mut self, spectrogram: &Spectrogram) -> Result<Waveform> {
        self.ensure_loaded()?.invert(spectrogram)
    }
}

/// What a [`MockModel`] has been asked to do.
#[derive(Debug, Default, Clone)]
pub struct MockProbe {
    /// Window index and frame indices of every spectrogram/waveform request.
    pub windows: Vec<(u64, Vec<u64>)>,
    /// Step count of every spectrogram handed to `invert`.
    pub inverted_steps: Vec<usize>,
    pub loads: usize,
}

/// Mock model for testing
///
/// Spectrogram and waveform values equal `window.index + 1`, so tests can tell
/// which window produced which output.
#[derive(Debug, Clone)]
pub struct MockModel {
    bins: usize,
    steps: usize,
    samples_per_window: usize,
    samples_per_step: usize,
    sample_rate: u32,
    fail_on_window: Option<u64>,
    fail_load: bool,
    probe: Arc<Mutex<MockProbe>>,
}

impl MockModel {
    pub fn new() -> Self {
        Self {
            bins: 4,
            steps: 10,
            samples_per_window: 160,
            samples_per_step: 16,
            sample_rate: 16000,
            fail_on_window: None,
            fail_load: false,
            probe: Arc::new(Mutex::new(MockProbe::default())),
        }
    }

    /// Configure the spectrogram fragment shape
    pub fn with_shape(mut self, bins: usize, steps: usize) -> Self {
        self.bins = bins;
        self.steps = steps;
        self
    }

    /// Configure the mock to fail inference on one window
    pub fn fail_on_window(mut self, index: u64) -> Self {
        self.fail_on_window = Some(index);
        self
    }

    /// Configure the mock to fail on load
    pub fn with_load_failure(mut self) -> Self {
        self.fail_load = true;
        self
    }

    /// Shared record of calls, readable after the model has been moved.
    pub fn probe(&self) -> Arc<Mutex<MockProbe>> {
        Arc::clone(&self.probe)
    }

    fn record(&self, window: &Window) -> Result<()> {
        if let Ok(mut probe) = self.probe.lock() {
            probe
                .windows
                .push((window.index, window.frames().iter().map(|f| f.index).collect()));
        }
        if self.fail_on_window == Some(window.index) {
            return Err(LipstreamError::Inference {
                message: format!("mock failure on window {}", window.index),
            });
        }
        Ok(())
    }
}

impl Default for MockModel {
    fn default() -> Self {
        Self::new()
    }
}

impl SynthesisModel for MockModel {
    fn name(&self) -> &str {
        "mock"
    }

    fn load(&mut self) -> Result<()> {
        if let Ok(mut probe) = self.probe.lock() {
            probe.loads += 1;
        }
        if self.fail_load {
            return Err(LipstreamError::ModelLoad {
                model: "mock".to_string(),
                message: "mock load failure".to_string(),
            });
        }
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn spectrogram(&mut self, window: &Window) -> Result<Spectrogram> {
        self.record(window)?;
        let value = (window.index + 1) as f32;
        Ok(Spectrogram(ndarray::Array2::from_elem(
            (self.bins, self.steps),
            value,
        )))
    }

    fn waveform(&mut self, window: &Window) -> Result<Waveform> {
        self.record(window)?;
        let value = (window.index + 1) as f32;
        let samples = (0..self.samples_per_window)
            .map(|i| if i % 2 == 0 { value } else { -value / 2.0 })
            .collect();
        Ok(Waveform::new(samples, self.sample_rate))
    }

    fn invert(&mut self, spectrogram: &Spectrogram) -> Result<Waveform> {
        if let Ok(mut probe) = self.probe.lock() {
            probe.inverted_steps.push(spectrogram.steps());
        }
        let samples = spectrogram
            .0
            .columns()
            .into_iter()
            .flat_map(|column| {
                let mean = column.mean().unwrap_or(0.0);
                std::iter::repeat_n(mean * 0.01, self.samples_per_step)
            })
            .collect();
        Ok(Waveform::new(samples, self.sample_rate))
    }
}
