//! lipstream - Streaming lip-to-speech synthesis over MQTT
//!
//! Face frames arrive on one topic, are grouped into fixed-size windows,
//! synthesized to audio and either saved or forwarded to a player process
//! that plays clips in arrival order.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod pipeline;
pub mod replay;
pub mod synth;
pub mod transport;

// Composition root - needs the bus and the CLI stack
#[cfg(all(feature = "mqtt", feature = "cli"))]
pub mod app;

// Core traits (bus → window → synthesize → dispatch)
pub use audio::playback::AudioOutput;
pub use pipeline::sink::{CollectorSink, ForwardSink, PersistSink, WaveformSink};
pub use synth::{SynthesisModel, SynthesisStrategy};
pub use transport::{MessageHandler, Publisher};

// Pipeline
pub use pipeline::orchestrator::{PipelineHandle, PlayerPipeline, SynthesisPipeline};

// Error handling
pub use error::{LipstreamError, Result};

// Config
pub use config::{Config, OutputAction, StrategyKind};

// Station framework (for advanced users)
pub use pipeline::error::{ErrorReporter, StationError};
pub use pipeline::station::Station;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
