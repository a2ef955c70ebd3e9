//! 16-bit PCM WAV encoding and decoding.

use crate::error::{LipstreamError, Result};
use crate::pipeline::types::Waveform;
use std::io::{Cursor, Seek, Write};

fn pcm16_spec(sample_rate: u32) -> hound::WavSpec {
    hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

/// Write `waveform` as mono 16-bit PCM to any seekable writer.
pub fn write_wav<W: Write + Seek>(writer: W, waveform: &Waveform) -> Result<()> {
    let mut wav_writer = hound::WavWriter::new(writer, pcm16_spec(waveform.sample_rate))?;
    for sample in waveform.to_pcm16() {
        wav_writer.write_sample(sample)?;
    }
    wav_writer.finalize()?;
    Ok(())
}

/// Encode `waveform` into a self-contained WAV file in memory.
pub fn encode_wav(waveform: &Waveform) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    write_wav(&mut cursor, waveform)?;
    Ok(cursor.into_inner())
}

/// Write raw 16-bit samples as a mono WAV.
pub fn write_pcm16<W: Write + Seek>(writer: W, samples: &[i16], sample_rate: u32) -> Result<()> {
    let mut wav_writer = hound::WavWriter::new(writer, pcm16_spec(sample_rate))?;
    for &sample in samples {
        wav_writer.write_sample(sample)?;
    }
    wav_writer.finalize()?;
    Ok(())
}

/// Mono 16-bit samples read back from a WAV payload.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedClip {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

/// Decode a WAV payload of any common PCM layout into mono 16-bit samples.
///
/// Multi-channel audio is averaged. Integer samples wider than 16 bits are
/// shifted down; float samples are scaled from `[-1, 1]`.
pub fn decode_wav(bytes: &[u8]) -> Result<DecodedClip> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<i16> = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Int, bits) if bits <= 16 => reader
            .samples::<i16>()
            .collect::<std::result::Result<Vec<_>, _>>()?,
        (hound::SampleFormat::Int, bits) => {
            let shift = bits.saturating_sub(16);
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| (v >> shift) as i16))
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
        (hound::SampleFormat::Float, _) => reader
            .samples::<f32>()
            .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * i16::MAX as f32) as i16))
            .collect::<std::result::Result<Vec<_>, _>>()?,
    };

    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks_exact(channels)
            .map(|frame| {
                let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                (sum / channels as i32) as i16
            })
            .collect()
    };

    if samples.is_empty() {
        return Err(LipstreamError::AudioOutput {
            message: "WAV payload contains no samples".to_string(),
        });
    }

    Ok(DecodedClip {
        samples,
        sample_rate: spec.sample_rate,
    })
}

/// Simple linear interpolation resampling.
pub fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || samples.is_empty() || to_rate == 0 {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let source_idx = (source_pos.floor() as usize).min(samples.len() - 1);
            let fraction = source_pos - source_idx as f64;

            if source_idx + 1 >= samples.len() {
                samples[source_idx]
            } else {
                let left = samples[source_idx] as f64;
                let right = samples[source_idx + 1] as f64;
                (left + (right - left) * fraction) as i16
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_wav_data(
        sample_rate: u32,
        channels: u16,
        bits: u16,
        format: hound::SampleFormat,
        write: impl FnOnce(&mut hound::WavWriter<&mut Cursor<Vec<u8>>>),
    ) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: bits,
            sample_format: format,
        };
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        write(&mut writer);
        writer.finalize().unwrap();
        cursor.into_inner()
    }

    #[test]
    fn test_encode_is_self_contained_pcm16() {
        let waveform = Waveform::new(vec![0.0, 1000.4, -32767.0, 50000.0], 16000);
        let bytes = encode_wav(&waveform).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");

        let reader = hound::WavReader::new(Cursor::new(&bytes)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(spec.sample_rate, 16000);

        let clip = decode_wav(&bytes).unwrap();
        assert_eq!(clip.samples, vec![0, 1000, -32767, i16::MAX]);
    }

    #[test]
    fn test_decode_stereo_downmixes_to_mono() {
        let bytes = make_wav_data(16000, 2, 16, hound::SampleFormat::Int, |w| {
            for s in [100i16, 200, 300, 400, 500, 600] {
                w.write_sample(s).unwrap();
            }
        });
        let clip = decode_wav(&bytes).unwrap();
        assert_eq!(clip.samples, vec![150, 350, 550]);
    }

    #[test]
    fn test_decode_float_scales_to_pcm16() {
        let bytes = make_wav_data(22050, 1, 32, hound::SampleFormat::Float, |w| {
            for s in [0.0f32, 1.0, -1.0, 0.5] {
                w.write_sample(s).unwrap();
            }
        });
        let clip = decode_wav(&bytes).unwrap();
        assert_eq!(clip.sample_rate, 22050);
        assert_eq!(clip.samples, vec![0, i16::MAX, -i16::MAX, 16383]);
    }

    #[test]
    fn test_decode_24bit_shifts_down() {
        let bytes = make_wav_data(16000, 1, 24, hound::SampleFormat::Int, |w| {
            w.write_sample(256i32 * 1000).unwrap();
        });
        let clip = decode_wav(&bytes).unwrap();
        assert_eq!(clip.samples, vec![1000]);
    }

    #[test]
    fn test_decode_rejects_garbage_and_empty() {
        assert!(decode_wav(b"definitely not a wav").is_err());

        let empty = make_wav_data(16000, 1, 16, hound::SampleFormat::Int, |_| {});
        assert!(decode_wav(&empty).is_err());
    }

    #[test]
    fn test_resample_same_rate_is_identity() {
        let samples = vec![1i16, 2, 3];
        assert_eq!(resample(&samples, 16000, 16000), samples);
    }

    #[test]
    fn test_resample_upsamples_with_interpolation() {
        let out = resample(&[0i16, 300], 8000, 16000);
        assert_eq!(out, vec![0, 150, 300, 300]);
    }
}
