//! Process entry points.
//!
//! Wires configuration, transport and pipelines together for the three
//! processes: synthesizer, player and frame replay.

use crate::audio::build_output;
use crate::config::{Config, OutputAction};
use crate::error::{LipstreamError, Result};
use crate::pipeline::orchestrator::{PipelineHandle, PlayerPipeline, SynthesisPipeline};
use crate::pipeline::sink::{WaveformSink, build_sink};
use crate::pipeline::station::Station;
use crate::pipeline::synthesis_station::SynthesisStation;
use crate::replay::Replayer;
use crate::synth::{SynthesisStrategy, build_model, build_strategy};
use crate::transport::{MqttLink, Publisher};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How often the main task drains results from the consumer thread.
const RESULT_DRAIN_INTERVAL: Duration = Duration::from_millis(500);

/// Run the synthesizer: frames topic → windows → synthesis → persist/forward.
pub async fn run_synthesizer(config: Config) -> Result<()> {
    config.validate()?;
    let connect_timeout = config.broker.connect_timeout();
    let connect_poll = config.broker.connect_poll();

    let model = build_model(&config.synthesis)?;
    let strategy = build_strategy(&config.synthesis, model);

    let forward = match config.output.action {
        OutputAction::Forward => {
            let link = Arc::new(MqttLink::publisher(config.audio_publisher()?));
            link.wait_connected(connect_timeout, connect_poll).await?;
            Some(link)
        }
        OutputAction::Persist => None,
    };
    let sink = build_sink(
        &config.output,
        forward.clone().map(|link| link as Arc<dyn Publisher>),
    )?;

    let handle = start_synthesis(SynthesisPipeline::from_config(&config), strategy, sink).await?;
    let subscriber = MqttLink::subscriber(config.frames_subscriber()?, handle.handler());
    if let Err(e) = subscriber.wait_connected(connect_timeout, connect_poll).await {
        subscriber.shutdown().await;
        stop_pipeline(handle).await?;
        return Err(e);
    }
    info!(
        topic = %config.frames.topic,
        strategy = ?config.synthesis.strategy,
        action = ?config.output.action,
        "synthesizer ready"
    );

    let served = serve(&handle, |receipt| {
        debug!(
            sequence = receipt.sequence,
            window = receipt.window_index,
            samples = receipt.samples,
            "dispatched to {:?}",
            receipt.destination
        );
    })
    .await;

    // Stop inbound traffic before the consumer so the flush sees a quiet queue.
    subscriber.shutdown().await;
    let receipts = stop_pipeline(handle).await?;
    info!(flushed = receipts.len(), "synthesizer stopped");

    if let Some(link) = forward {
        match Arc::try_unwrap(link) {
            Ok(link) => link.shutdown().await,
            Err(_) => warn!("audio publisher still in use at shutdown"),
        }
    }
    served
}

/// Run the player: audio topic → staging → serial playback.
pub async fn run_player(config: Config) -> Result<()> {
    config.validate()?;
    let output = build_output(&config.player)?;

    let handle = PlayerPipeline::from_config(&config).start(output)?;
    let subscriber = MqttLink::subscriber(config.audio_subscriber()?, handle.handler());
    if let Err(e) = subscriber
        .wait_connected(config.broker.connect_timeout(), config.broker.connect_poll())
        .await
    {
        subscriber.shutdown().await;
        stop_pipeline(handle).await?;
        return Err(e);
    }
    info!(topic = %config.audio.topic, "player ready");

    let served = serve(&handle, |report| {
        debug!(
            clip = report.clip,
            samples = report.samples,
            sample_rate = report.sample_rate,
            "clip finished"
        );
    })
    .await;

    subscriber.shutdown().await;
    stop_pipeline(handle).await?;
    served
}

/// Publish pre-cut frames from `source` onto the frames topic.
pub async fn run_replay(config: Config, source: PathBuf, interval: Option<Duration>) -> Result<()> {
    let link = Arc::new(MqttLink::publisher(config.frames_publisher()?));
    link.wait_connected(config.broker.connect_timeout(), config.broker.connect_poll())
        .await?;

    let replayer =
        Replayer::new(Arc::clone(&link) as Arc<dyn Publisher>).with_interval(interval);
    let cancel = replayer.cancel_flag();
    let mut task = tokio::task::spawn_blocking(move || replayer.run(&source));

    let joined = tokio::select! {
        joined = &mut task => joined,
        _ = shutdown_signal() => {
            cancel.store(true, Ordering::SeqCst);
            task.await
        }
    };
    let stats = joined.map_err(|e| LipstreamError::Other(format!("replay task failed: {}", e)))??;

    match Arc::try_unwrap(link) {
        Ok(link) => link.shutdown().await,
        Err(_) => warn!("frames publisher still in use at shutdown"),
    }
    if stats.skipped > 0 || stats.failed > 0 {
        warn!(
            skipped = stats.skipped,
            failed = stats.failed,
            "replay finished with problems"
        );
    }
    Ok(())
}

/// Drain results until a shutdown signal arrives or the consumer exits.
async fn serve<S>(handle: &PipelineHandle<S>, mut on_output: impl FnMut(S::Output)) -> Result<()>
where
    S: Station<Input = Vec<u8>>,
{
    let mut ticker = tokio::time::interval(RESULT_DRAIN_INTERVAL);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => return Ok(()),
            _ = ticker.tick() => {
                for output in handle.drain() {
                    on_output(output);
                }
                debug!(depth = handle.queue_depth(), "ingest queue");
                if !handle.is_running() {
                    return Err(LipstreamError::Other(
                        "pipeline stopped unexpectedly".to_string(),
                    ));
                }
            }
        }
    }
}

/// Start the synthesis pipeline on a blocking thread; warm-up runs a full inference.
async fn start_synthesis(
    pipeline: SynthesisPipeline,
    strategy: Box<dyn SynthesisStrategy>,
    sink: Box<dyn WaveformSink>,
) -> Result<PipelineHandle<SynthesisStation>> {
    tokio::task::spawn_blocking(move || pipeline.start(strategy, sink))
        .await
        .map_err(|e| LipstreamError::Other(format!("pipeline startup failed: {}", e)))?
}

/// Join the consumer thread without blocking the runtime.
async fn stop_pipeline<S>(handle: PipelineHandle<S>) -> Result<Vec<S::Output>>
where
    S: Station<Input = Vec<u8>>,
{
    tokio::task::spawn_blocking(move || handle.stop())
        .await
        .map_err(|e| LipstreamError::Other(format!("pipeline shutdown failed: {}", e)))?
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("cannot listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };
    let sigterm = async {
        if let Err(e) = wait_for_sigterm().await {
            warn!("{}", e);
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = sigterm => info!("received SIGTERM, shutting down"),
    }
}

/// Wait for SIGTERM signal (used by systemd).
#[cfg(unix)]
async fn wait_for_sigterm() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| LipstreamError::Other(format!("Failed to register SIGTERM handler: {}", e)))?;
    sigterm.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_sigterm() -> Result<()> {
    std::future::pending::<()>().await
}
