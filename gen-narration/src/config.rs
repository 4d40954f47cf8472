//! gen-narration configuration: typed sections with documented defaults.

use crate::audio::encode::OutputFormat;
use crate::batch::{BudgetUnit, PlanLimits};
use crate::error::{NarrationError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

// Segmentation and batch size defaults.
const DEFAULT_MIN_CHARS: usize = 600;
const DEFAULT_MAX_CHARS: usize = 800;
const DEFAULT_TARGET_SIZE: usize = 15_000;
const DEFAULT_MIN_BATCH: usize = 5_000;
const DEFAULT_MAX_BATCH: usize = 20_000;
const DEFAULT_SAMPLE_RATE: u32 = 24_000;

/// Named tuning profiles. Each one only adjusts knobs; there is a single
/// job runner behind all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    Quality,
    Balanced,
    Throughput,
}

impl FromStr for Profile {
    type Err = NarrationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "quality" | "high_quality" => Ok(Self::Quality),
            "balanced" => Ok(Self::Balanced),
            "throughput" | "fast" => Ok(Self::Throughput),
            other => Err(NarrationError::Config(format!(
                "unknown profile '{}' (expected quality, balanced or throughput)",
                other
            ))),
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Quality => "quality",
            Self::Balanced => "balanced",
            Self::Throughput => "throughput",
        };
        f.write_str(name)
    }
}

/// Text segmentation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentConfig {
    /// Chunks shorter than this are merged into their predecessor when possible
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,

    /// Hard upper bound handed to the synthesis engine
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,

    /// Rewrite CJK numerals to ASCII digits and tighten number/unit spacing
    #[serde(default)]
    pub normalize_numbers: bool,

    /// Ensure terminal punctuation and drop stray spaces before punctuation
    #[serde(default = "default_true")]
    pub normalize_punctuation: bool,

    /// Insert pause markers after commas and long digit runs
    #[serde(default)]
    pub rhythm_markers: bool,

    /// Marker text used when `rhythm_markers` is on
    #[serde(default = "default_pause_marker")]
    pub pause_marker: String,
}

/// Batch planning settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_target_size")]
    pub target_size: usize,

    #[serde(default = "default_min_batch")]
    pub min_size: usize,

    #[serde(default = "default_max_batch")]
    pub max_size: usize,

    /// Budget by characters or by estimated tokens
    #[serde(default = "default_unit")]
    pub unit: BudgetUnit,

    /// Batch by source pages when the extractor provides them
    #[serde(default = "default_true")]
    pub page_aware: bool,

    /// Produce one merged track after every batch is committed
    #[serde(default = "default_true")]
    pub final_merge: bool,
}

/// Synthesis dispatch settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthConfig {
    /// Concurrent engine calls
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Per-chunk wait before the call counts as failed
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Length of the silence substituted for a failed chunk
    #[serde(default = "default_placeholder_secs")]
    pub placeholder_secs: f32,

    /// Voice identifier forwarded to the engine
    #[serde(default = "default_voice")]
    pub voice: String,

    /// Build one engine per worker instead of sharing one
    #[serde(default)]
    pub isolate_engines: bool,

    /// Text-stage sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Waveform-stage sampling temperature
    #[serde(default = "default_waveform_temperature")]
    pub waveform_temperature: f32,

    /// Fixed seed for reproducible takes; `None` leaves it to the engine
    #[serde(default = "default_seed")]
    pub seed: Option<u64>,

    /// External engine argv with `{text}`, `{voice}`, `{output}` and `{seed}` placeholders
    #[serde(default)]
    pub command: Vec<String>,

    /// Extra engine parameters, forwarded untouched
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

/// Which silence separates chunks inside one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkGap {
    Segment,
    Sentence,
}

/// Audio post-processing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    #[serde(default = "default_segment_silence")]
    pub segment_silence_secs: f32,

    #[serde(default = "default_sentence_silence")]
    pub sentence_silence_secs: f32,

    #[serde(default = "default_batch_silence")]
    pub batch_silence_secs: f32,

    #[serde(default = "default_chunk_gap")]
    pub chunk_gap: ChunkGap,

    #[serde(default = "default_fade_ms")]
    pub fade_ms: f32,

    #[serde(default = "default_peak_dbfs")]
    pub peak_dbfs: f32,

    #[serde(default = "default_loudness_target")]
    pub loudness_target_db: f32,

    #[serde(default = "default_true")]
    pub denoise: bool,

    #[serde(default = "default_denoise_threshold")]
    pub denoise_threshold: f32,

    #[serde(default = "default_true")]
    pub deesser: bool,

    #[serde(default = "default_deesser_cutoff")]
    pub deesser_cutoff_hz: f32,
}

/// Encoded output format selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatKind {
    Wav,
    Mp3,
}

impl FromStr for FormatKind {
    type Err = NarrationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "wav" => Ok(Self::Wav),
            "mp3" => Ok(Self::Mp3),
            other => Err(NarrationError::Config(format!(
                "unknown output format '{}' (expected wav or mp3)",
                other
            ))),
        }
    }
}

/// Artifact and checkpoint locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,

    #[serde(default = "default_format")]
    pub format: FormatKind,

    #[serde(default = "default_bitrate")]
    pub mp3_bitrate: String,

    /// Longest source identifier kept in artifact names
    #[serde(default = "default_max_identifier_len")]
    pub max_identifier_len: usize,

    /// Where job checkpoints live. None uses the local data directory.
    #[serde(default)]
    pub checkpoint_dir: Option<PathBuf>,

    /// ffmpeg executable used for MP3 encode and non-WAV decode
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NarrationConfig {
    /// Profile applied on top of the file values when loading
    #[serde(default)]
    pub profile: Option<Profile>,

    #[serde(default)]
    pub segment: SegmentConfig,

    #[serde(default)]
    pub batch: BatchConfig,

    #[serde(default)]
    pub synthesis: SynthConfig,

    #[serde(default)]
    pub audio: AudioConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

fn default_true() -> bool {
    true
}

fn default_min_chars() -> usize {
    DEFAULT_MIN_CHARS
}

fn default_max_chars() -> usize {
    DEFAULT_MAX_CHARS
}

fn default_pause_marker() -> String {
    " -".to_string()
}

fn default_target_size() -> usize {
    DEFAULT_TARGET_SIZE
}

fn default_min_batch() -> usize {
    DEFAULT_MIN_BATCH
}

fn default_max_batch() -> usize {
    DEFAULT_MAX_BATCH
}

fn default_unit() -> BudgetUnit {
    BudgetUnit::Tokens
}

fn default_workers() -> usize {
    4
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_placeholder_secs() -> f32 {
    0.5
}

fn default_voice() -> String {
    "v2/en_speaker_0".to_string()
}

fn default_temperature() -> f32 {
    0.65
}

fn default_waveform_temperature() -> f32 {
    0.55
}

fn default_seed() -> Option<u64> {
    Some(1234)
}

fn default_sample_rate() -> u32 {
    DEFAULT_SAMPLE_RATE
}

fn default_segment_silence() -> f32 {
    0.3
}

fn default_sentence_silence() -> f32 {
    0.08
}

fn default_batch_silence() -> f32 {
    1.0
}

fn default_chunk_gap() -> ChunkGap {
    ChunkGap::Segment
}

fn default_fade_ms() -> f32 {
    6.0
}

fn default_peak_dbfs() -> f32 {
    -1.0
}

fn default_loudness_target() -> f32 {
    -18.0
}

fn default_denoise_threshold() -> f32 {
    0.01
}

fn default_deesser_cutoff() -> f32 {
    8000.0
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output").join("audio")
}

fn default_format() -> FormatKind {
    FormatKind::Mp3
}

fn default_bitrate() -> String {
    "320k".to_string()
}

fn default_max_identifier_len() -> usize {
    20
}

fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            min_chars: default_min_chars(),
            max_chars: default_max_chars(),
            normalize_numbers: false,
            normalize_punctuation: true,
            rhythm_markers: false,
            pause_marker: default_pause_marker(),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            target_size: default_target_size(),
            min_size: default_min_batch(),
            max_size: default_max_batch(),
            unit: default_unit(),
            page_aware: true,
            final_merge: true,
        }
    }
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            timeout_secs: default_timeout_secs(),
            placeholder_secs: default_placeholder_secs(),
            voice: default_voice(),
            isolate_engines: false,
            temperature: default_temperature(),
            waveform_temperature: default_waveform_temperature(),
            seed: default_seed(),
            command: Vec::new(),
            extra: BTreeMap::new(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            segment_silence_secs: default_segment_silence(),
            sentence_silence_secs: default_sentence_silence(),
            batch_silence_secs: default_batch_silence(),
            chunk_gap: default_chunk_gap(),
            fade_ms: default_fade_ms(),
            peak_dbfs: default_peak_dbfs(),
            loudness_target_db: default_loudness_target(),
            denoise: true,
            denoise_threshold: default_denoise_threshold(),
            deesser: true,
            deesser_cutoff_hz: default_deesser_cutoff(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            format: default_format(),
            mp3_bitrate: default_bitrate(),
            max_identifier_len: default_max_identifier_len(),
            checkpoint_dir: None,
            ffmpeg: default_ffmpeg(),
        }
    }
}

impl BatchConfig {
    pub fn limits(&self) -> PlanLimits {
        PlanLimits {
            target_size: self.target_size,
            min_size: self.min_size,
            max_size: self.max_size,
            unit: self.unit,
        }
    }
}

impl AudioConfig {
    /// Silence between chunks of one batch.
    pub fn chunk_gap_secs(&self) -> f32 {
        match self.chunk_gap {
            ChunkGap::Segment => self.segment_silence_secs,
            ChunkGap::Sentence => self.sentence_silence_secs,
        }
    }
}

impl OutputConfig {
    pub fn output_format(&self) -> OutputFormat {
        match self.format {
            FormatKind::Wav => OutputFormat::Wav,
            FormatKind::Mp3 => OutputFormat::Mp3 {
                bitrate: self.mp3_bitrate.clone(),
            },
        }
    }
}

impl NarrationConfig {
    /// Get the config file path: ~/.config/cli-programs/gen-narration.toml
    pub fn config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .map_err(|_| NarrationError::Config("HOME is not set".to_string()))?;
        Ok(PathBuf::from(home)
            .join(".config")
            .join("cli-programs")
            .join("gen-narration.toml"))
    }

    /// Load config from the default path, returning defaults if the file doesn't exist
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load, apply the file's profile (if any) and validate.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let mut config: NarrationConfig = toml::from_str(&content)
            .map_err(|e| NarrationError::Config(format!("{}: {}", path.display(), e)))?;
        if let Some(profile) = config.profile {
            config.apply_profile(profile);
        }
        config.validate()?;
        Ok(config)
    }

    /// Save config to the default path
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| NarrationError::Config(e.to_string()))?;
        fs::write(&path, content)?;
        Ok(path)
    }

    /// Adjust worker count, temperatures and cleanup passes for a profile.
    pub fn apply_profile(&mut self, profile: Profile) {
        self.profile = Some(profile);
        let synth = &mut self.synthesis;
        match profile {
            Profile::Quality => {
                synth.workers = 2;
                synth.temperature = 0.60;
                synth.waveform_temperature = 0.50;
                self.audio.denoise = true;
                self.audio.deesser = true;
            }
            Profile::Balanced => {
                synth.workers = default_workers();
                synth.temperature = default_temperature();
                synth.waveform_temperature = default_waveform_temperature();
            }
            Profile::Throughput => {
                synth.workers = 8;
                synth.temperature = 0.70;
                synth.waveform_temperature = 0.60;
                self.audio.deesser = false;
            }
        }
    }

    /// Reject settings that would break segmentation, planning or audio math.
    pub fn validate(&self) -> Result<()> {
        let seg = &self.segment;
        if seg.max_chars == 0 {
            return Err(NarrationError::Config("segment.max_chars must be > 0".into()));
        }
        if seg.min_chars > seg.max_chars {
            return Err(NarrationError::Config(format!(
                "segment.min_chars ({}) exceeds segment.max_chars ({})",
                seg.min_chars, seg.max_chars
            )));
        }

        let batch = &self.batch;
        if batch.target_size == 0 || batch.max_size == 0 {
            return Err(NarrationError::Config(
                "batch.target_size and batch.max_size must be > 0".into(),
            ));
        }
        if batch.min_size > batch.max_size || batch.target_size > batch.max_size {
            return Err(NarrationError::Config(format!(
                "batch sizes must satisfy min_size <= max_size and target_size <= max_size \
                 (min {}, target {}, max {})",
                batch.min_size, batch.target_size, batch.max_size
            )));
        }

        let synth = &self.synthesis;
        if synth.workers == 0 {
            return Err(NarrationError::Config("synthesis.workers must be > 0".into()));
        }
        if synth.timeout_secs == 0 {
            return Err(NarrationError::Config(
                "synthesis.timeout_secs must be > 0".into(),
            ));
        }
        if synth.placeholder_secs < 0.0 {
            return Err(NarrationError::Config(
                "synthesis.placeholder_secs must not be negative".into(),
            ));
        }
        if !synth.command.is_empty() && !synth.command.iter().any(|a| a.contains("{output}")) {
            return Err(NarrationError::Config(
                "synthesis.command must contain an {output} placeholder".into(),
            ));
        }

        let audio = &self.audio;
        if audio.sample_rate == 0 {
            return Err(NarrationError::Config("audio.sample_rate must be > 0".into()));
        }
        if audio.peak_dbfs > 0.0 {
            return Err(NarrationError::Config(format!(
                "audio.peak_dbfs must be <= 0 dBFS, got {}",
                audio.peak_dbfs
            )));
        }
        let gaps = [
            audio.segment_silence_secs,
            audio.sentence_silence_secs,
            audio.batch_silence_secs,
            audio.fade_ms,
        ];
        if gaps.iter().any(|v| *v < 0.0) {
            return Err(NarrationError::Config(
                "audio silences and fade_ms must not be negative".into(),
            ));
        }

        if self.output.max_identifier_len == 0 {
            return Err(NarrationError::Config(
                "output.max_identifier_len must be > 0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = NarrationConfig::default();
        assert_eq!(config.segment.min_chars, 600);
        assert_eq!(config.segment.max_chars, 800);
        assert_eq!(config.batch.target_size, 15_000);
        assert_eq!(config.batch.unit, BudgetUnit::Tokens);
        assert_eq!(config.synthesis.seed, Some(1234));
        assert_eq!(config.audio.sample_rate, 24_000);
        assert_eq!(config.audio.peak_dbfs, -1.0);
        assert_eq!(config.output.format, FormatKind::Mp3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_path() {
        let path = NarrationConfig::config_path();
        assert!(path.is_ok());
        assert!(path.unwrap().ends_with("cli-programs/gen-narration.toml"));
    }

    #[test]
    fn test_parse_config() {
        let toml_str = r#"
[segment]
min_chars = 100
max_chars = 200

[batch]
target_size = 2500
max_size = 3000
min_size = 500
unit = "chars"

[synthesis]
workers = 3
voice = "v2/zh_speaker_1"
command = ["tts", "--out", "{output}", "{text}"]

[audio]
chunk_gap = "sentence"
deesser = false

[output]
format = "wav"
"#;
        let config: NarrationConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.segment.max_chars, 200);
        assert_eq!(config.batch.unit, BudgetUnit::Chars);
        assert_eq!(config.synthesis.workers, 3);
        assert_eq!(config.synthesis.timeout_secs, 300);
        assert_eq!(config.audio.chunk_gap_secs(), 0.08);
        assert!(!config.audio.deesser);
        assert_eq!(config.output.output_format(), OutputFormat::Wav);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_empty_config() {
        let config: NarrationConfig = toml::from_str("").unwrap();
        assert_eq!(config, NarrationConfig::default());
    }

    #[test]
    fn test_load_from_applies_profile() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("narration.toml");
        fs::write(&path, "profile = \"throughput\"\n").unwrap();

        let config = NarrationConfig::load_from(&path).unwrap();
        assert_eq!(config.profile, Some(Profile::Throughput));
        assert_eq!(config.synthesis.workers, 8);
        assert!(!config.audio.deesser);
    }

    #[test]
    fn test_validate_rejects_inverted_bounds() {
        let mut config = NarrationConfig::default();
        config.segment.min_chars = 900;
        assert!(matches!(config.validate(), Err(NarrationError::Config(_))));

        let mut config = NarrationConfig::default();
        config.batch.target_size = 30_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_audio_and_workers() {
        let mut config = NarrationConfig::default();
        config.synthesis.workers = 0;
        assert!(config.validate().is_err());

        let mut config = NarrationConfig::default();
        config.audio.peak_dbfs = 3.0;
        assert!(config.validate().is_err());

        let mut config = NarrationConfig::default();
        config.synthesis.command = vec!["tts".into(), "{text}".into()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_profiles() {
        let mut config = NarrationConfig::default();
        config.apply_profile(Profile::Quality);
        assert_eq!(config.synthesis.workers, 2);
        assert_eq!(config.synthesis.temperature, 0.60);

        config.apply_profile(Profile::Balanced);
        assert_eq!(config.synthesis.workers, 4);
        assert_eq!(config.profile, Some(Profile::Balanced));

        assert_eq!("fast".parse::<Profile>().unwrap(), Profile::Throughput);
        assert!("turbo".parse::<Profile>().is_err());
    }
}
