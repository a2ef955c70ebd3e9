//! WAV containers and playback backends.

#[cfg(feature = "cpal-audio")]
pub mod device;
pub mod playback;
pub mod wav;

#[cfg(feature = "cpal-audio")]
pub use device::CpalAudioOutput;
pub use playback::{AudioOutput, CommandAudioOutput, MockAudioOutput};
pub use wav::{DecodedClip, decode_wav, encode_wav, write_wav};

use crate::config::{PlayerBackend, PlayerConfig};
#[cfg(not(feature = "cpal-audio"))]
use crate::error::LipstreamError;
use crate::error::Result;

/// Build the playback backend selected in the configuration.
///
/// `Auto` prefers the output device when cpal support is compiled in.
pub fn build_output(config: &PlayerConfig) -> Result<Box<dyn AudioOutput>> {
    match config.backend {
        PlayerBackend::Command => Ok(Box::new(CommandAudioOutput::new(&config.command)?)),
        #[cfg(feature = "cpal-audio")]
        PlayerBackend::Cpal | PlayerBackend::Auto => Ok(Box::new(CpalAudioOutput::new(
            config.device.as_deref(),
        )?)),
        #[cfg(not(feature = "cpal-audio"))]
        PlayerBackend::Auto => Ok(Box::new(CommandAudioOutput::new(&config.command)?)),
        #[cfg(not(feature = "cpal-audio"))]
        PlayerBackend::Cpal => Err(LipstreamError::ConfigInvalidValue {
            key: "player.backend".to_string(),
            message: "cpal playback requires the 'cpal-audio' feature".to_string(),
        }),
    }
}
