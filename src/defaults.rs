//! Default configuration constants for lipstream.
//!
//! Shared by the configuration types, the CLI and the reference model so the
//! synthesizer, player and replay processes agree on topics and shapes.

/// Default MQTT broker port.
pub const BROKER_PORT: u16 = 1883;

/// Default MQTT broker host.
pub const BROKER_HOST: &str = "localhost";

/// Default quality of service for both topics.
///
/// QoS 2 (exactly once) is what the pipeline relies on to avoid frame loss.
pub const QOS: u8 = 2;

/// Topic carrying encoded face frames.
pub const FRAMES_TOPIC: &str = "jetson/faces";

/// Topic carrying synthesized WAV clips.
pub const AUDIO_TOPIC: &str = "jetson/audio";

pub const FRAMES_SUBSCRIBER_ID: &str = "jetson-face-receiver";
pub const FRAMES_PUBLISHER_ID: &str = "jetson-face-sender";
pub const AUDIO_SUBSCRIBER_ID: &str = "jetson-audio-receiver";
pub const AUDIO_PUBLISHER_ID: &str = "jetson-audio-sender";

/// MQTT keep-alive interval in seconds.
pub const KEEP_ALIVE_SECS: u64 = 5;

/// How long startup waits for the broker before giving up.
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Poll interval while waiting for the broker, and reconnect delay after errors.
pub const CONNECT_POLL_MS: u64 = 1000;

/// Largest MQTT packet accepted or sent.
///
/// A 3 s clip at 16 kHz is ~96 KB of PCM; 8 MiB leaves room for long
/// incremental batches.
pub const MAX_PACKET_BYTES: usize = 8 * 1024 * 1024;

/// Frames per window (the model's context length, `T`).
pub const CONTEXT_FRAMES: usize = 90;

/// Square resolution frames are resized to before inference.
pub const IMAGE_SIZE: u32 = 96;

/// Frequency bins per spectrogram time step.
pub const SPECTROGRAM_BINS: usize = 80;

/// Spectrogram time steps produced per window.
pub const STEPS_PER_WINDOW: usize = 240;

/// Leading time steps trimmed from every fragment after the first.
pub const OVERLAP_STEPS: usize = 40;

/// Windows concatenated into one incremental output unit.
pub const BATCHES_PER_OUTPUT: usize = 1;

/// Audio samples per spectrogram time step.
pub const HOP_SIZE: usize = 200;

/// Output sample rate in Hz.
pub const SAMPLE_RATE: u32 = 16000;

/// Peak amplitude waveforms are normalized to (full-scale 16-bit).
pub const TARGET_PEAK: f32 = 32767.0;

/// Minimum peak used as the normalization divisor.
///
/// Keeps near-silent output from being amplified into noise and avoids a
/// division by zero on all-zero input.
pub const PEAK_FLOOR: f32 = 0.01;

/// Name of the reference model.
pub const DEFAULT_MODEL: &str = "luma";

/// External command used by the default playback backend.
pub const PLAYER_COMMAND: &[&str] = &["aplay", "-q"];

/// Directory name (under the system temp dir) for staged playback clips.
pub const STAGING_DIR_NAME: &str = "lipstream-clips";

/// Directory for persisted output when none is configured.
pub const RESULTS_ROOT: &str = "wavs";
