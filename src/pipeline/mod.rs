//! Streaming pipelines for frame-to-audio synthesis and clip playback.
//!
//! Each process runs one station in its own thread, fed by an ingest queue
//! that the transport callback writes into. All pipeline state lives on that
//! thread.

pub mod decode;
pub mod error;
pub mod ingest;
pub mod orchestrator;
pub mod player_station;
pub mod sink;
pub mod station;
pub mod synthesis_station;
pub mod types;
pub mod window;

pub use decode::FrameDecoder;
pub use error::{ErrorReporter, LogReporter, StationError};
pub use ingest::{IngestSender, ingest_queue};
pub use orchestrator::{PipelineHandle, PlayerPipeline, SynthesisPipeline};
pub use player_station::PlayerStation;
pub use sink::{CollectorSink, ForwardSink, PersistSink, WaveformSink, build_sink};
pub use station::{Station, StationRunner};
pub use synthesis_station::SynthesisStation;
pub use types::{
    Destination, Frame, OutputReceipt, OutputUnit, PlaybackItem, PlaybackReport, Spectrogram,
    Waveform, Window,
};
pub use window::WindowAccumulator;
