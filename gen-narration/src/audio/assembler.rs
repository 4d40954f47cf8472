//! Segment cleanup and concatenation into one track.

use log::debug;

use super::dsp::{
    apply_fades, deess, gate, limit_peak, normalize_loudness, samples_for, to_mono_f32,
};
use super::waveform::{Track, Waveform};
use crate::config::AudioConfig;

#[derive(Debug, Clone)]
pub struct AudioAssembler {
    config: AudioConfig,
}

impl AudioAssembler {
    pub fn new(config: AudioConfig) -> Self {
        Self { config }
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    fn fade_samples(&self) -> usize {
        samples_for(self.config.fade_ms / 1000.0, self.config.sample_rate)
    }

    /// Full cleanup chain for one synthesized segment.
    pub fn process_segment(&self, waveform: &Waveform) -> Vec<f32> {
        let rate = self.config.sample_rate;
        let mut samples = to_mono_f32(waveform, rate);

        if self.config.denoise {
            gate(&mut samples, self.config.denoise_threshold);
        }
        if self.config.deesser {
            deess(&mut samples, self.config.deesser_cutoff_hz, rate);
        }
        normalize_loudness(&mut samples, self.config.loudness_target_db);
        limit_peak(&mut samples, self.config.peak_dbfs);
        apply_fades(&mut samples, self.fade_samples());
        samples
    }

    /// Process each segment and join them in order with the chunk gap.
    pub fn assemble(&self, segments: &[Waveform]) -> Track {
        let gap = samples_for(self.config.chunk_gap_secs(), self.config.sample_rate);
        let processed: Vec<Vec<f32>> = segments.iter().map(|w| self.process_segment(w)).collect();
        debug!(
            "Assembling {} segments with {} sample gaps",
            processed.len(),
            gap
        );
        self.join(processed, gap)
    }

    /// Join finished batch artifacts. They are already normalized, so only
    /// format conversion and fades apply.
    pub fn merge_tracks(&self, tracks: &[Waveform]) -> Track {
        let gap = samples_for(self.config.batch_silence_secs, self.config.sample_rate);
        let fade = self.fade_samples();
        let processed: Vec<Vec<f32>> = tracks
            .iter()
            .map(|w| {
                let mut samples = to_mono_f32(w, self.config.sample_rate);
                apply_fades(&mut samples, fade);
                samples
            })
            .collect();
        self.join(processed, gap)
    }

    fn join(&self, parts: Vec<Vec<f32>>, gap: usize) -> Track {
        let total: usize =
            parts.iter().map(Vec::len).sum::<usize>() + gap * parts.len().saturating_sub(1);
        let mut samples = Vec::with_capacity(total);

        for (i, part) in parts.into_iter().enumerate() {
            if i > 0 {
                samples.resize(samples.len() + gap, 0.0);
            }
            samples.extend(part);
        }

        Track {
            samples,
            sample_rate: self.config.sample_rate,
        }
    }
}
