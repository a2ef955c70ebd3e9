//! Wires an ingest queue to a station runner and hands back a control handle.

use crate::audio::playback::AudioOutput;
use crate::config::Config;
use crate::error::{LipstreamError, Result};
use crate::pipeline::decode::FrameDecoder;
use crate::pipeline::error::{ErrorReporter, LogReporter};
use crate::pipeline::ingest::{IngestSender, ingest_queue};
use crate::pipeline::player_station::PlayerStation;
use crate::pipeline::sink::WaveformSink;
use crate::pipeline::station::{Station, StationRunner};
use crate::pipeline::synthesis_station::SynthesisStation;
use crate::synth::SynthesisStrategy;
use crate::transport::MessageHandler;
use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Handle to a running single-consumer pipeline.
///
/// The consumer thread ends when either [`stop`](Self::stop) is called or
/// every ingest sender (including the ones handed to transports) is dropped.
pub struct PipelineHandle<S: Station<Input = Vec<u8>>> {
    ingest: IngestSender<Vec<u8>>,
    output_rx: Receiver<S::Output>,
    shutdown_tx: Sender<()>,
    runner: StationRunner<S>,
}

impl<S: Station<Input = Vec<u8>>> PipelineHandle<S> {
    fn spawn(
        station: S,
        ingest: IngestSender<Vec<u8>>,
        ingest_rx: Receiver<Vec<u8>>,
        output: (Sender<S::Output>, Receiver<S::Output>),
        error_reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        let (output_tx, output_rx) = output;
        let (shutdown_tx, shutdown_rx) = bounded(1);
        let runner = StationRunner::spawn_with_shutdown(
            station,
            ingest_rx,
            output_tx,
            shutdown_rx,
            error_reporter,
        );
        info!(station = runner.name(), "pipeline started");
        Self {
            ingest,
            output_rx,
            shutdown_tx,
            runner,
        }
    }

    /// A producer for the ingest queue.
    pub fn ingest(&self) -> IngestSender<Vec<u8>> {
        self.ingest.clone()
    }

    /// The ingest queue as a transport callback.
    pub fn handler(&self) -> Arc<dyn MessageHandler> {
        Arc::new(self.ingest.clone())
    }

    /// Payloads waiting for the consumer.
    pub fn queue_depth(&self) -> usize {
        self.ingest.depth()
    }

    /// Results produced so far.
    pub fn outputs(&self) -> &Receiver<S::Output> {
        &self.output_rx
    }

    /// False once the consumer thread has exited, e.g. after a fatal error.
    pub fn is_running(&self) -> bool {
        !self.runner.is_finished()
    }

    /// Take every result produced so far without waiting.
    pub fn drain(&self) -> Vec<S::Output> {
        self.output_rx.try_iter().collect()
    }

    /// Interrupt the consumer. Queued input is abandoned.
    pub fn stop(self) -> Result<Vec<S::Output>> {
        if self.shutdown_tx.try_send(()).is_err() {
            debug!("shutdown already requested");
        }
        self.finish()
    }

    /// Close this handle's producer and wait for the queue to be consumed.
    ///
    /// Returns once every other producer has been dropped as well.
    pub fn finish(self) -> Result<Vec<S::Output>> {
        let Self {
            ingest,
            output_rx,
            shutdown_tx,
            runner,
        } = self;
        drop(ingest);

        let name = runner.name();
        runner.join().map_err(LipstreamError::Other)?;
        drop(shutdown_tx);
        info!(station = name, "pipeline stopped");
        Ok(output_rx.try_iter().collect())
    }
}

/// Frames → windows → synthesis → dispatch.
pub struct SynthesisPipeline {
    window_size: usize,
    image_size: u32,
    warm_up: bool,
    flush_partial: bool,
    ingest_capacity: Option<usize>,
    error_reporter: Arc<dyn ErrorReporter>,
}

impl SynthesisPipeline {
    pub fn from_config(config: &Config) -> Self {
        Self {
            window_size: config.synthesis.context_frames,
            image_size: config.synthesis.image_size,
            warm_up: config.synthesis.warm_up,
            flush_partial: config.pipeline.flush_partial_on_shutdown,
            ingest_capacity: config.pipeline.ingest_capacity,
            error_reporter: Arc::new(LogReporter),
        }
    }

    /// Sets a custom error reporter.
    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.error_reporter = reporter;
        self
    }

    /// Skip or force the startup warm-up inference.
    pub fn with_warm_up(mut self, warm_up: bool) -> Self {
        self.warm_up = warm_up;
        self
    }

    /// Starts the consumer thread. Warm-up, when enabled, runs first and a
    /// failure there aborts startup.
    pub fn start(
        self,
        strategy: Box<dyn SynthesisStrategy>,
        sink: Box<dyn WaveformSink>,
    ) -> Result<PipelineHandle<SynthesisStation>> {
        let (ingest_tx, ingest_rx) = ingest_queue(self.ingest_capacity);
        let (output_tx, output_rx) = unbounded();

        info!(
            strategy = strategy.name(),
            sink = sink.name(),
            window = self.window_size,
            "starting synthesis pipeline"
        );
        let mut station = SynthesisStation::new(
            FrameDecoder::new(self.image_size),
            self.window_size,
            strategy,
            sink,
        )
        .with_flush_partial(self.flush_partial)
        .with_flush_tx(output_tx.clone())
        .with_queue_probe(ingest_rx.clone());

        if self.warm_up {
            station.warm_up()?;
        }

        Ok(PipelineHandle::spawn(
            station,
            ingest_tx,
            ingest_rx,
            (output_tx, output_rx),
            self.error_reporter,
        ))
    }
}

/// Clips → staging → serial playback.
pub struct PlayerPipeline {
    staging_dir: PathBuf,
    keep_files: bool,
    ingest_capacity: Option<usize>,
    error_reporter: Arc<dyn ErrorReporter>,
}

impl PlayerPipeline {
    pub fn from_config(config: &Config) -> Self {
        Self {
            staging_dir: config.staging_dir(),
            keep_files: config.player.keep_files,
            ingest_capacity: config.pipeline.ingest_capacity,
            error_reporter: Arc::new(LogReporter),
        }
    }

    /// Sets a custom error reporter.
    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.error_reporter = reporter;
        self
    }

    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = dir.into();
        self
    }

    pub fn start(self, output: Box<dyn AudioOutput>) -> Result<PipelineHandle<PlayerStation>> {
        std::fs::create_dir_all(&self.staging_dir)?;
        info!(
            output = output.name(),
            "staging clips in {}",
            self.staging_dir.display()
        );

        let (ingest_tx, ingest_rx) = ingest_queue(self.ingest_capacity);
        let station =
            PlayerStation::new(output, self.staging_dir).with_keep_files(self.keep_files);

        Ok(PipelineHandle::spawn(
            station,
            ingest_tx,
            ingest_rx,
            unbounded(),
            self.error_reporter,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::playback::MockAudioOutput;
    use crate::audio::wav::encode_wav;
    use crate::pipeline::sink::CollectorSink;
    use crate::pipeline::types::Waveform;
    use crate::synth::{DirectStrategy, MockModel, ModelHandle, PeakNormalizer};
    use image::{ImageOutputFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use std::time::Duration;
    use tempfile::TempDir;

    fn png() -> Vec<u8> {
        let image = RgbImage::from_pixel(4, 4, Rgb([9, 9, 9]));
        let mut bytes = Cursor::new(Vec::new());
        image.write_to(&mut bytes, ImageOutputFormat::Png).unwrap();
        bytes.into_inner()
    }

    fn small_config() -> Config {
        let mut config = Config::default();
        config.synthesis.context_frames = 2;
        config.synthesis.image_size = 4;
        config
    }

    fn direct() -> Box<dyn SynthesisStrategy> {
        Box::new(DirectStrategy::new(
            ModelHandle::new(Box::new(MockModel::new())),
            PeakNormalizer::new(32767.0, 0.01),
        ))
    }

    #[test]
    fn test_finish_consumes_everything_queued() {
        let sink = CollectorSink::new();
        let handle = SynthesisPipeline::from_config(&small_config())
            .start(direct(), Box::new(sink.clone()))
            .unwrap();

        let ingest = handle.ingest();
        for _ in 0..6 {
            ingest.enqueue(png()).unwrap();
        }
        drop(ingest);

        let receipts = handle.finish().unwrap();
        assert_eq!(
            receipts.iter().map(|r| r.sequence).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(sink.collected().lock().unwrap().len(), 3);
    }

    #[test]
    fn test_stop_returns_even_with_live_producers() {
        let handle = SynthesisPipeline::from_config(&small_config())
            .with_warm_up(false)
            .start(direct(), Box::new(CollectorSink::new()))
            .unwrap();

        let producer = handle.handler();
        producer.on_message(png());
        producer.on_message(png());

        let first = handle
            .outputs()
            .recv_timeout(Duration::from_secs(5))
            .unwrap();
        assert_eq!(first.sequence, 1);

        // `producer` is still alive; stop must not wait for it
        let rest = handle.stop().unwrap();
        assert!(rest.is_empty());
        drop(producer);
    }

    #[test]
    fn test_flush_receipt_is_returned_on_stop() {
        let mut config = small_config();
        config.synthesis.context_frames = 5;
        config.pipeline.flush_partial_on_shutdown = true;

        let handle = SynthesisPipeline::from_config(&config)
            .start(direct(), Box::new(CollectorSink::new()))
            .unwrap();
        let ingest = handle.ingest();
        ingest.enqueue(png()).unwrap();
        drop(ingest);

        let receipts = handle.finish().unwrap();
        assert_eq!(receipts.len(), 1);
        assert_eq!(receipts[0].window_index, 0);
    }

    #[test]
    fn test_warm_up_failure_aborts_start() {
        let strategy = Box::new(DirectStrategy::new(
            ModelHandle::new(Box::new(MockModel::new().with_load_failure())),
            PeakNormalizer::new(32767.0, 0.01),
        ));
        let result = SynthesisPipeline::from_config(&small_config())
            .start(strategy, Box::new(CollectorSink::new()));
        assert!(result.is_err());
    }

    #[test]
    fn test_player_pipeline_plays_in_order() {
        let dir = TempDir::new().unwrap();
        let output = MockAudioOutput::new().with_delay(Duration::from_millis(5));
        let played = output.played();

        let handle = PlayerPipeline::from_config(&Config::default())
            .with_staging_dir(dir.path())
            .start(Box::new(output))
            .unwrap();

        let ingest = handle.ingest();
        for len in [3usize, 5, 7] {
            let wav = encode_wav(&Waveform::new(vec![1.0; len], 16000)).unwrap();
            ingest.enqueue(wav).unwrap();
        }
        drop(ingest);

        let reports = handle.finish().unwrap();
        assert_eq!(
            reports.iter().map(|r| r.samples).collect::<Vec<_>>(),
            vec![3, 5, 7]
        );
        assert_eq!(played.lock().unwrap().len(), 3);
    }
}
