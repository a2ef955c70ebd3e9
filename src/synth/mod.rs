//! Window-to-audio synthesis.
//!
//! A [`SynthesisModel`] is the inference boundary; a [`SynthesisStrategy`]
//! decides how windows map to output units (one-to-one or K-to-one).

pub mod luma;
pub mod model;
pub mod normalize;
pub mod strategy;

pub use luma::LumaModel;
pub use model::{MockModel, MockProbe, ModelHandle, SynthesisModel};
pub use normalize::PeakNormalizer;
pub use strategy::{DirectStrategy, IncrementalStrategy, SynthesisStrategy};

use crate::config::{StrategyKind, SynthesisConfig};
use crate::error::{LipstreamError, Result};

/// Names accepted by `synthesis.model`.
pub const MODEL_NAMES: &[&str] = &["luma"];

/// Instantiate the model named in the configuration. Nothing is loaded yet.
pub fn build_model(config: &SynthesisConfig) -> Result<Box<dyn SynthesisModel>> {
    match config.model.as_str() {
        "luma" => Ok(Box::new(LumaModel::new(
            config.bins,
            config.steps_per_window,
            config.hop_size,
            config.sample_rate,
        ))),
        other => Err(LipstreamError::ConfigInvalidValue {
            key: "synthesis.model".to_string(),
            message: format!(
                "unknown model '{}' (available: {})",
                other,
                MODEL_NAMES.join(", ")
            ),
        }),
    }
}

/// Wrap `model` in the configured strategy.
pub fn build_strategy(
    config: &SynthesisConfig,
    model: Box<dyn SynthesisModel>,
) -> Box<dyn SynthesisStrategy> {
    let handle = ModelHandle::new(model);
    let normalizer = PeakNormalizer::new(config.target_peak, config.peak_floor);
    match config.strategy {
        StrategyKind::Direct => Box::new(DirectStrategy::new(handle, normalizer)),
        StrategyKind::Incremental => Box::new(IncrementalStrategy::new(
            handle,
            normalizer,
            config.batches_per_output,
            config.overlap,
        )),
    }
}
