//! Per-segment signal processing on mono `f32` buffers.

use std::f64::consts::PI;

use super::waveform::Waveform;

/// Segments of this many samples or fewer skip the de-esser.
const MIN_FILTER_LEN: usize = 1000;

/// Q factors of the two biquad sections forming a 4th-order Butterworth.
const BUTTERWORTH_Q: [f64; 2] = [0.541_196_100_146_197, 1.306_562_964_876_376_8];

/// Normalize, down-mix to mono and resample to `target_rate`.
pub fn to_mono_f32(waveform: &Waveform, target_rate: u32) -> Vec<f32> {
    let interleaved = waveform.samples.to_f32();
    let channels = waveform.channels.max(1) as usize;

    let mono: Vec<f32> = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    };

    resample_linear(&mono, waveform.sample_rate, target_rate)
}

/// Linear-interpolation resampler.
pub fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || from_rate == 0 || to_rate == 0 || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = ((samples.len() as f64) / ratio).round().max(1.0) as usize;
    let last = samples.len() - 1;

    (0..out_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let idx = (pos.floor() as usize).min(last);
            let next = (idx + 1).min(last);
            let frac = (pos - idx as f64) as f32;
            samples[idx] + (samples[next] - samples[idx]) * frac
        })
        .collect()
}

/// Zero every sample quieter than `threshold`.
pub fn gate(samples: &mut [f32], threshold: f32) {
    for s in samples.iter_mut() {
        if s.abs() < threshold {
            *s = 0.0;
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl Biquad {
    fn lowpass(cutoff_hz: f64, sample_rate: f64, q: f64) -> Self {
        let w0 = 2.0 * PI * cutoff_hz / sample_rate;
        let (sin, cos) = w0.sin_cos();
        let alpha = sin / (2.0 * q);
        let a0 = 1.0 + alpha;
        Self {
            b0: (1.0 - cos) / 2.0 / a0,
            b1: (1.0 - cos) / a0,
            b2: (1.0 - cos) / 2.0 / a0,
            a1: -2.0 * cos / a0,
            a2: (1.0 - alpha) / a0,
        }
    }

    /// Transposed direct form II, in place.
    fn run(&self, samples: &mut [f64]) {
        let (mut z1, mut z2) = (0.0, 0.0);
        for x in samples.iter_mut() {
            let input = *x;
            let out = self.b0 * input + z1;
            z1 = self.b1 * input - self.a1 * out + z2;
            z2 = self.b2 * input - self.a2 * out;
            *x = out;
        }
    }
}

/// Zero-phase 4th-order Butterworth low-pass (forward then backward pass).
/// Returns `false` when the filter was skipped.
pub fn deess(samples: &mut [f32], cutoff_hz: f32, sample_rate: u32) -> bool {
    let nyquist = sample_rate as f32 / 2.0;
    if cutoff_hz <= 0.0 || cutoff_hz >= nyquist || samples.len() <= MIN_FILTER_LEN {
        return false;
    }

    let sections: Vec<Biquad> = BUTTERWORTH_Q
        .iter()
        .map(|q| Biquad::lowpass(cutoff_hz as f64, sample_rate as f64, *q))
        .collect();

    let mut buffer: Vec<f64> = samples.iter().map(|s| *s as f64).collect();
    for section in &sections {
        section.run(&mut buffer);
    }
    buffer.reverse();
    for section in &sections {
        section.run(&mut buffer);
    }
    buffer.reverse();

    for (dst, src) in samples.iter_mut().zip(buffer) {
        *dst = src as f32;
    }
    true
}

pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|s| (*s as f64) * (*s as f64)).sum();
    (sum / samples.len() as f64).sqrt() as f32
}

/// Scale toward `target_db` using the level `20·log10(rms)`, then clip.
/// Silent buffers are left alone.
pub fn normalize_loudness(samples: &mut [f32], target_db: f32) {
    let level = rms(samples);
    if level <= 0.0 {
        return;
    }
    let current_db = 20.0 * level.log10();
    let gain = 10f32.powf((target_db - current_db) / 20.0);
    for s in samples.iter_mut() {
        *s = (*s * gain).clamp(-1.0, 1.0);
    }
}

/// Scale down so the peak does not exceed `peak_dbfs`.
pub fn limit_peak(samples: &mut [f32], peak_dbfs: f32) {
    let ceiling = 10f32.powf(peak_dbfs / 20.0);
    let peak = samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    if peak > ceiling {
        let scale = ceiling / peak;
        for s in samples.iter_mut() {
            *s *= scale;
        }
    }
}

/// Linear fade-in and fade-out over `fade_samples`. Skipped when the two
/// ramps would overlap.
pub fn apply_fades(samples: &mut [f32], fade_samples: usize) {
    let len = samples.len();
    if fade_samples == 0 || fade_samples * 2 >= len {
        return;
    }
    let denom = (fade_samples - 1).max(1) as f32;
    for i in 0..fade_samples {
        let gain = i as f32 / denom;
        samples[i] *= gain;
        samples[len - 1 - i] *= gain;
    }
}

/// Sample count of a duration at a rate.
pub fn samples_for(secs: f32, sample_rate: u32) -> usize {
    (secs.max(0.0) as f64 * sample_rate as f64).round() as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::waveform::Samples;

    fn sine(freq: f32, rate: u32, len: usize, amp: f32) -> Vec<f32> {
        (0..len)
            .map(|i| amp * (2.0 * std::f32::consts::PI * freq * i as f32 / rate as f32).sin())
            .collect()
    }

    #[test]
    fn test_to_mono_downmixes_stereo() {
        let waveform = Waveform::new(Samples::F32(vec![1.0, 0.0, 0.5, 0.5]), 24_000, 2);
        assert_eq!(to_mono_f32(&waveform, 24_000), vec![0.5, 0.5]);
    }

    #[test]
    fn test_resample_doubles_length() {
        let out = resample_linear(&[0.0, 1.0, 0.0, -1.0], 12_000, 24_000);
        assert_eq!(out.len(), 8);
        assert_eq!(out[0], 0.0);
        assert!((out[1] - 0.5).abs() < 1e-6);
        assert_eq!(out[2], 1.0);
    }

    #[test]
    fn test_resample_same_rate_is_identity() {
        let input = vec![0.1, 0.2, 0.3];
        assert_eq!(resample_linear(&input, 24_000, 24_000), input);
    }

    #[test]
    fn test_gate() {
        let mut samples = vec![0.005, -0.02, 0.5, -0.009];
        gate(&mut samples, 0.01);
        assert_eq!(samples, vec![0.0, -0.02, 0.5, 0.0]);
    }

    #[test]
    fn test_deess_attenuates_high_frequencies() {
        let rate = 24_000;
        let mut high = sine(11_000.0, rate, 4800, 0.5);
        let mut low = sine(500.0, rate, 4800, 0.5);
        assert!(deess(&mut high, 8000.0, rate));
        assert!(deess(&mut low, 8000.0, rate));

        // Compare away from the edges
        let core = |s: &[f32]| rms(&s[1000..3800]);
        assert!(core(&high) < 0.1, "11 kHz should be strongly attenuated");
        assert!((core(&low) - 0.5 / 2f32.sqrt()).abs() < 0.02, "500 Hz should pass");
    }

    #[test]
    fn test_deess_skips_short_or_above_nyquist() {
        let mut short = vec![0.5; 1000];
        assert!(!deess(&mut short, 8000.0, 24_000));
        assert_eq!(short, vec![0.5; 1000]);

        let mut just_over = vec![0.5; 1001];
        assert!(deess(&mut just_over, 8000.0, 24_000));

        let mut long = vec![0.5; 2000];
        assert!(!deess(&mut long, 8000.0, 16_000));
    }

    #[test]
    fn test_normalize_loudness_hits_target() {
        let mut samples = sine(440.0, 24_000, 24_000, 0.01);
        normalize_loudness(&mut samples, -18.0);
        let level = 20.0 * rms(&samples).log10();
        assert!((level + 18.0).abs() < 0.1);

        let mut silent = vec![0.0; 100];
        normalize_loudness(&mut silent, -18.0);
        assert!(silent.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_limit_peak_only_scales_down() {
        let mut loud = vec![1.0, -0.5];
        limit_peak(&mut loud, -1.0);
        let ceiling = 10f32.powf(-1.0 / 20.0);
        assert!((loud[0] - ceiling).abs() < 1e-6);

        let mut quiet = vec![0.1, -0.2];
        limit_peak(&mut quiet, -1.0);
        assert_eq!(quiet, vec![0.1, -0.2]);
    }

    #[test]
    fn test_apply_fades() {
        let mut samples = vec![1.0; 10];
        apply_fades(&mut samples, 3);
        assert_eq!(samples[0], 0.0);
        assert_eq!(samples[9], 0.0);
        assert_eq!(samples[1], 0.5);
        assert_eq!(samples[5], 1.0);

        let mut short = vec![1.0; 6];
        apply_fades(&mut short, 3);
        assert_eq!(short, vec![1.0; 6]);
    }
}
