//! Synthesis station: frame payloads in, dispatched output units out.

use crate::error::LipstreamError;
use crate::pipeline::decode::FrameDecoder;
use crate::pipeline::error::StationError;
use crate::pipeline::sink::WaveformSink;
use crate::pipeline::station::Station;
use crate::pipeline::types::{OutputReceipt, OutputUnit, Waveform, Window};
use crate::pipeline::window::WindowAccumulator;
use crate::synth::SynthesisStrategy;
use crossbeam_channel::{Receiver, Sender};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Station that decodes, windows, synthesizes and dispatches, in that order.
///
/// This station:
/// - Assigns arrival indices to frames that decode successfully
/// - Drops undecodable payloads without counting them toward a window
/// - Assigns output sequence numbers starting at 1, consumed even when
///   dispatch fails
pub struct SynthesisStation {
    decoder: FrameDecoder,
    accumulator: WindowAccumulator,
    strategy: Box<dyn SynthesisStrategy>,
    sink: Box<dyn WaveformSink>,
    next_frame: u64,
    next_sequence: u64,
    dispatched: u64,
    flush_partial: bool,
    /// Output channel for receipts produced while flushing on shutdown.
    flush_tx: Option<Sender<OutputReceipt>>,
    /// Ingest queue, observed for depth logging.
    queue: Option<Receiver<Vec<u8>>>,
}

impl SynthesisStation {
    pub fn new(
        decoder: FrameDecoder,
        window_size: usize,
        strategy: Box<dyn SynthesisStrategy>,
        sink: Box<dyn WaveformSink>,
    ) -> Self {
        Self {
            decoder,
            accumulator: WindowAccumulator::new(window_size),
            strategy,
            sink,
            next_frame: 0,
            next_sequence: 1,
            dispatched: 0,
            flush_partial: false,
            flush_tx: None,
            queue: None,
        }
    }

    /// Pad and synthesize the partial window, then flush the strategy, on shutdown.
    pub fn with_flush_partial(mut self, flush: bool) -> Self {
        self.flush_partial = flush;
        self
    }

    /// Set the output channel used for receipts produced during shutdown.
    pub fn with_flush_tx(mut self, tx: Sender<OutputReceipt>) -> Self {
        self.flush_tx = Some(tx);
        self
    }

    /// Observe `queue` so its depth can be logged per window.
    pub fn with_queue_probe(mut self, queue: Receiver<Vec<u8>>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Load the model and run one throwaway inference on a blank window.
    pub fn warm_up(&mut self) -> crate::error::Result<()> {
        let start = Instant::now();
        let window = Window::blank(self.accumulator.window_size(), self.decoder.size());
        self.strategy.warm_up(&window)?;
        info!(
            strategy = self.strategy.name(),
            "warm-up finished in {:.0?}",
            start.elapsed()
        );
        Ok(())
    }

    pub fn frames_accepted(&self) -> u64 {
        self.next_frame
    }

    fn queue_depth(&self) -> usize {
        self.queue.as_ref().map_or(0, Receiver::len)
    }

    fn handle_window(&mut self, window: Window) -> Result<Option<OutputReceipt>, StationError> {
        debug!(
            window = window.index,
            frames = window.len(),
            queue_depth = self.queue_depth(),
            "window complete"
        );
        let start = Instant::now();
        match self.strategy.synthesize(&window)? {
            Some(waveform) => {
                debug!(
                    window = window.index,
                    "synthesized in {:.0?}",
                    start.elapsed()
                );
                self.dispatch(window.index, waveform).map(Some)
            }
            None => Ok(None),
        }
    }

    fn dispatch(
        &mut self,
        window_index: u64,
        waveform: Waveform,
    ) -> Result<OutputReceipt, StationError> {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let unit = OutputUnit {
            sequence,
            window_index,
            waveform,
        };
        let destination = self.sink.dispatch(&unit).map_err(|e| match e {
            LipstreamError::DispatchFailed { .. } => e,
            other => LipstreamError::DispatchFailed {
                sequence,
                message: other.to_string(),
            },
        })?;
        self.dispatched += 1;

        info!(
            sequence,
            window = window_index,
            seconds = unit.waveform.duration_secs(),
            "output unit dispatched via {}",
            self.sink.name()
        );
        Ok(OutputReceipt {
            sequence,
            window_index,
            destination,
            samples: unit.waveform.len(),
        })
    }

    fn flush(&mut self) {
        let mut receipts = Vec::new();

        match self.accumulator.flush_padded() {
            Ok(Some(window)) => match self.handle_window(window) {
                Ok(Some(receipt)) => receipts.push(receipt),
                Ok(None) => {}
                Err(e) => warn!("flushing partial window failed: {}", e),
            },
            Ok(None) => {}
            Err(e) => warn!("flushing partial window failed: {}", e),
        }

        match self.strategy.flush() {
            Ok(Some(waveform)) => {
                let window_index = self.accumulator.windows_completed().saturating_sub(1);
                match self.dispatch(window_index, waveform) {
                    Ok(receipt) => receipts.push(receipt),
                    Err(e) => warn!("flushing pending fragments failed: {}", e),
                }
            }
            Ok(None) => {}
            Err(e) => warn!("flushing pending fragments failed: {}", e),
        }

        if let Some(tx) = &self.flush_tx {
            for receipt in receipts {
                if tx.send(receipt).is_err() {
                    break;
                }
            }
        }
    }
}

impl Station for SynthesisStation {
    type Input = Vec<u8>;
    type Output = OutputReceipt;

    fn name(&self) -> &'static str {
        "synthesis"
    }

    fn process(&mut self, payload: Vec<u8>) -> Result<Option<OutputReceipt>, StationError> {
        let frame = self.decoder.decode(self.next_frame, &payload)?;
        let completed = self.accumulator.accept(frame)?;
        self.next_frame += 1;
        match completed {
            Some(window) => self.handle_window(window),
            None => Ok(None),
        }
    }

    fn shutdown(&mut self) {
        if self.flush_partial {
            self.flush();
        } else if self.accumulator.pending() > 0 || self.strategy.pending_fragments() > 0 {
            info!(
                frames = self.accumulator.pending(),
                fragments = self.strategy.pending_fragments(),
                "discarding incomplete output"
            );
        }
        info!(
            frames = self.next_frame,
            windows = self.accumulator.windows_completed(),
            dispatched = self.dispatched,
            "synthesis stopped"
        );
    }
}
