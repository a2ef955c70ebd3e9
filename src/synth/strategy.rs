//! Synthesis strategies.
//!
//! The strategy is chosen once when the pipeline is built. Both normalize
//! every waveform they return.

use crate::error::{LipstreamError, Result};
use crate::pipeline::types::{Spectrogram, Waveform, Window};
use crate::synth::model::ModelHandle;
use crate::synth::normalize::PeakNormalizer;
use tracing::debug;

/// Turns windows into waveforms.
pub trait SynthesisStrategy: Send {
    fn name(&self) -> &'static str;

    /// Process one window. `Ok(None)` means the window was absorbed into
    /// pending state and no output unit is complete yet.
    ///
    /// Errors are `SynthesisFailed` for this window; any pending state for the
    /// in-flight unit is discarded.
    fn synthesize(&mut self, window: &Window) -> Result<Option<Waveform>>;

    /// Emit whatever pending state exists as a final waveform.
    fn flush(&mut self) -> Result<Option<Waveform>> {
        Ok(None)
    }

    /// Windows absorbed since the last emitted waveform.
    fn pending_fragments(&self) -> usize {
        0
    }

    /// Run one inference that leaves no trace in strategy state.
    fn warm_up(&mut self, window: &Window) -> Result<()>;
}

fn failed(window_index: u64, error: LipstreamError) -> LipstreamError {
    match error {
        LipstreamError::SynthesisFailed { .. } => error,
        other => LipstreamError::SynthesisFailed {
            window_index,
            message: other.to_string(),
        },
    }
}

/// One complete waveform per window. Stateless between windows.
pub struct DirectStrategy {
    model: ModelHandle,
    normalizer: PeakNormalizer,
}

impl DirectStrategy {
    pub fn new(model: ModelHandle, normalizer: PeakNormalizer) -> Self {
        Self { model, normalizer }
    }
}

impl SynthesisStrategy for DirectStrategy {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn synthesize(&mut self, window: &Window) -> Result<Option<Waveform>> {
        let mut waveform = self
            .model
            .waveform(window)
            .map_err(|e| failed(window.index, e))?;
        let scale = self.normalizer.apply(&mut waveform);
        debug!(
            window = window.index,
            samples = waveform.len(),
            scale,
            "direct waveform"
        );
        Ok(Some(waveform))
    }

    fn warm_up(&mut self, window: &Window) -> Result<()> {
        self.model.waveform(window).map(|_| ())
    }
}

/// Spectrogram per window, concatenated with overlap trimming and inverted
/// once every `batches_per_output` windows.
pub struct IncrementalStrategy {
    model: ModelHandle,
    normalizer: PeakNormalizer,
    batches_per_output: usize,
    overlap: usize,
    buffer: Option<Spectrogram>,
    fragments: usize,
    last_window: u64,
}

impl IncrementalStrategy {
    pub fn new(
        model: ModelHandle,
        normalizer: PeakNormalizer,
        batches_per_output: usize,
        overlap: usize,
    ) -> Self {
        Self {
            model,
            normalizer,
            batches_per_output: batches_per_output.max(1),
            overlap,
            buffer: None,
            fragments: 0,
            last_window: 0,
        }
    }

    /// Time steps currently buffered.
    pub fn buffered_steps(&self) -> usize {
        self.buffer.as_ref().map_or(0, Spectrogram::steps)
    }

    fn reset(&mut self) {
        self.buffer = None;
        self.fragments = 0;
    }

    fn absorb(&mut self, window: &Window) -> Result<()> {
        let fragment = self.model.spectrogram(window)?;
        match &mut self.buffer {
            None => self.buffer = Some(fragment),
            Some(buffer) => buffer.append_trimmed(&fragment, self.overlap)?,
        }
        self.fragments += 1;
        Ok(())
    }

    fn emit(&mut self) -> Result<Option<Waveform>> {
        let Some(buffer) = self.buffer.take() else {
            return Ok(None);
        };
        let fragments = self.fragments;
        self.fragments = 0;

        let mut waveform = self.model.invert(&buffer)?;
        let scale = self.normalizer.apply(&mut waveform);
        debug!(
            fragments,
            steps = buffer.steps(),
            samples = waveform.len(),
            scale,
            "inverted spectrogram buffer"
        );
        Ok(Some(waveform))
    }
}

impl SynthesisStrategy for IncrementalStrategy {
    fn name(&self) -> &'static str {
        "incremental"
    }

    fn synthesize(&mut self, window: &Window) -> Result<Option<Waveform>> {
        self.last_window = window.index;
        if let Err(e) = self.absorb(window) {
            self.reset();
            return Err(failed(window.index, e));
        }
        if self.fragments < self.batches_per_output {
            debug!(
                window = window.index,
                fragments = self.fragments,
                of = self.batches_per_output,
                "fragment buffered"
            );
            return Ok(None);
        }
        self.emit().map_err(|e| {
            self.reset();
            failed(window.index, e)
        })
    }

    fn flush(&mut self) -> Result<Option<Waveform>> {
        let window_index = self.last_window;
        self.emit().map_err(|e| {
            self.reset();
            failed(window_index, e)
        })
    }

    fn pending_fragments(&self) -> usize {
        self.fragments
    }

    fn warm_up(&mut self, window: &Window) -> Result<()> {
        let fragment = self.model.spectrogram(window)?;
        self.model.invert(&fragment).map(|_| ())
    }
}
