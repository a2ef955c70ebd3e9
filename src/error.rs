//! Error types for lipstream.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LipstreamError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Transport errors
    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Transport not connected: cannot publish to {topic}")]
    NotConnected { topic: String },

    // Ingest errors
    #[error("Malformed frame #{index}: {message}")]
    MalformedFrame { index: u64, message: String },

    // Synthesis errors
    #[error("Failed to load model {model}: {message}")]
    ModelLoad { model: String, message: String },

    #[error("Inference failed: {message}")]
    Inference { message: String },

    #[error("Synthesis failed for window {window_index}: {message}")]
    SynthesisFailed { window_index: u64, message: String },

    // Output errors
    #[error("Dispatch failed for output unit {sequence}: {message}")]
    DispatchFailed { sequence: u64, message: String },

    // Playback errors
    #[error("Playback failed for clip {clip}: {message}")]
    Playback { clip: u64, message: String },

    #[error("Audio device not found: {device}")]
    AudioDeviceNotFound { device: String },

    #[error("Audio output failed: {message}")]
    AudioOutput { message: String },

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

/// Coarse classification of [`LipstreamError`] used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Transport,
    MalformedFrame,
    SynthesisFailed,
    Dispatch,
    Playback,
    Audio,
    Io,
    Other,
}

impl LipstreamError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LipstreamError::ConfigFileNotFound { .. }
            | LipstreamError::ConfigParse { .. }
            | LipstreamError::ConfigInvalidValue { .. }
            | LipstreamError::Config(_) => ErrorKind::Config,
            LipstreamError::Transport { .. } | LipstreamError::NotConnected { .. } => {
                ErrorKind::Transport
            }
            LipstreamError::MalformedFrame { .. } => ErrorKind::MalformedFrame,
            LipstreamError::ModelLoad { .. }
            | LipstreamError::Inference { .. }
            | LipstreamError::SynthesisFailed { .. } => ErrorKind::SynthesisFailed,
            LipstreamError::DispatchFailed { .. } => ErrorKind::Dispatch,
            LipstreamError::Playback { .. } => ErrorKind::Playback,
            LipstreamError::AudioDeviceNotFound { .. }
            | LipstreamError::AudioOutput { .. }
            | LipstreamError::Wav(_) => ErrorKind::Audio,
            LipstreamError::Io(_) => ErrorKind::Io,
            LipstreamError::Other(_) => ErrorKind::Other,
        }
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, LipstreamError>;
