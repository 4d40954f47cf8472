//! In-memory audio: engine waveforms in their native sample format and
//! assembled mono tracks.

use std::path::Path;

use hound::{SampleFormat, WavReader};

use crate::error::Result;

/// Interleaved samples in the format the engine produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Samples {
    I16(Vec<i16>),
    I32(Vec<i32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl Samples {
    pub fn len(&self) -> usize {
        match self {
            Self::I16(s) => s.len(),
            Self::I32(s) => s.len(),
            Self::F32(s) => s.len(),
            Self::F64(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Normalized to `[-1, 1]`, still interleaved.
    pub fn to_f32(&self) -> Vec<f32> {
        let clip = |x: f32| x.clamp(-1.0, 1.0);
        match self {
            Self::I16(s) => s.iter().map(|x| clip(*x as f32 / i16::MAX as f32)).collect(),
            Self::I32(s) => s
                .iter()
                .map(|x| clip((*x as f64 / i32::MAX as f64) as f32))
                .collect(),
            Self::F32(s) => s.iter().map(|x| clip(*x)).collect(),
            Self::F64(s) => s.iter().map(|x| clip(*x as f32)).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    pub samples: Samples,
    pub sample_rate: u32,
    pub channels: u16,
}

impl Waveform {
    pub fn new(samples: Samples, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels: channels.max(1),
        }
    }

    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self::new(Samples::F32(samples), sample_rate, 1)
    }

    /// Zeroed mono waveform of the given length.
    pub fn silence(secs: f32, sample_rate: u32) -> Self {
        let len = (secs.max(0.0) as f64 * sample_rate as f64).round() as usize;
        Self::mono(vec![0.0; len], sample_rate)
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Read a WAV file, keeping its sample format.
    pub fn read_wav(path: &Path) -> Result<Self> {
        let reader = WavReader::open(path)?;
        let spec = reader.spec();

        let samples = match (spec.sample_format, spec.bits_per_sample) {
            (SampleFormat::Float, _) => {
                Samples::F32(reader.into_samples::<f32>().collect::<std::result::Result<_, _>>()?)
            }
            (SampleFormat::Int, 16) => {
                Samples::I16(reader.into_samples::<i16>().collect::<std::result::Result<_, _>>()?)
            }
            (SampleFormat::Int, bits) => {
                // Widen 8/24-bit samples to the full i32 range
                let shift = 32u32.saturating_sub(bits as u32);
                let raw: Vec<i32> = reader
                    .into_samples::<i32>()
                    .collect::<std::result::Result<_, _>>()?;
                Samples::I32(raw.into_iter().map(|s| s << shift).collect())
            }
        };

        Ok(Self::new(samples, spec.sample_rate, spec.channels))
    }
}

/// Assembled mono audio, normalized to `[-1, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Track {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_to_f32_from_each_format() {
        assert_eq!(Samples::I16(vec![i16::MAX, 0]).to_f32(), vec![1.0, 0.0]);
        assert_eq!(Samples::I16(vec![i16::MIN]).to_f32(), vec![-1.0]);
        assert_eq!(Samples::I32(vec![i32::MAX]).to_f32(), vec![1.0]);
        assert_eq!(Samples::F32(vec![1.5, -0.25]).to_f32(), vec![1.0, -0.25]);
        assert_eq!(Samples::F64(vec![0.5]).to_f32(), vec![0.5]);
    }

    #[test]
    fn test_silence_and_duration() {
        let silence = Waveform::silence(0.5, 24_000);
        assert_eq!(silence.frames(), 12_000);
        assert_eq!(silence.duration_secs(), 0.5);

        let stereo = Waveform::new(Samples::I16(vec![0; 48_000]), 24_000, 2);
        assert_eq!(stereo.duration_secs(), 1.0);
    }

    #[test]
    fn test_read_wav_int16() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tone.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for s in [100i16, -100, 200, -200] {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();

        let waveform = Waveform::read_wav(&path).unwrap();
        assert_eq!(waveform.channels, 2);
        assert_eq!(waveform.sample_rate, 16_000);
        assert_eq!(waveform.samples, Samples::I16(vec![100, -100, 200, -200]));
    }

    #[test]
    fn test_read_wav_24_bit_widens() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("deep.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 24_000,
            bits_per_sample: 24,
            sample_format: SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        writer.write_sample(1i32 << 22).unwrap();
        writer.finalize().unwrap();

        let waveform = Waveform::read_wav(&path).unwrap();
        let normalized = waveform.samples.to_f32();
        assert!((normalized[0] - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_read_wav_missing_file() {
        assert!(Waveform::read_wav(Path::new("/nonexistent/a.wav")).is_err());
    }
}
