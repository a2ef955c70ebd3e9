use crate::pipeline::types::Waveform;

/// Scales a waveform so its loudest sample reaches `target_peak`.
///
/// Quiet input is only amplified up to `target_peak / floor`, so silence stays
/// silence and near-silence is not blown up into noise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakNormalizer {
    pub target_peak: f32,
    pub floor: f32,
}

impl PeakNormalizer {
    pub fn new(target_peak: f32, floor: f32) -> Self {
        Self { target_peak, floor }
    }

    /// Scale factor that would be applied to `waveform`.
    pub fn scale_for(&self, waveform: &Waveform) -> f32 {
        self.target_peak / waveform.peak().max(self.floor)
    }

    /// Normalize in place and return the applied scale.
    pub fn apply(&self, waveform: &mut Waveform) -> f32 {
        let scale = self.scale_for(waveform);
        for sample in &mut waveform.samples {
            *sample *= scale;
        }
        scale
    }
}
