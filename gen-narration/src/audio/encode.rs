//! Track encoding (WAV via hound, MP3 via FFmpeg) and file decoding.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, warn};

use super::waveform::{Track, Waveform};
use crate::error::{NarrationError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputFormat {
    Wav,
    Mp3 { bitrate: String },
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Mp3 { .. } => "mp3",
        }
    }
}

/// What actually landed on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedArtifact {
    pub path: PathBuf,
    pub extension: String,
    pub duration_secs: f64,
    /// MP3 encoding failed and a WAV was written instead
    pub fell_back: bool,
}

#[derive(Debug, Clone)]
pub struct Encoder {
    ffmpeg: PathBuf,
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl Encoder {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }

    fn ffmpeg_command(&self) -> Command {
        Command::new(&self.ffmpeg)
    }

    /// Check if the configured ffmpeg runs.
    pub fn is_ffmpeg_available(&self) -> bool {
        self.ffmpeg_command()
            .arg("-version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Encode `track` to `path`. Output goes to a `.partial` sibling first and
    /// is renamed into place. A failed MP3 encode falls back to a WAV next to
    /// `path`; only a failed WAV write is an error.
    pub fn write_track(
        &self,
        track: &Track,
        path: &Path,
        format: &OutputFormat,
    ) -> Result<EncodedArtifact> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        if let OutputFormat::Mp3 { bitrate } = format {
            match self.encode_mp3(track, path, bitrate) {
                Ok(()) => return Ok(artifact(track, path, "mp3", false)),
                Err(e) => warn!("{}; writing WAV instead", e),
            }
            let wav_path = path.with_extension("wav");
            commit_wav(track, &wav_path)?;
            return Ok(artifact(track, &wav_path, "wav", true));
        }

        commit_wav(track, path)?;
        Ok(artifact(track, path, "wav", false))
    }

    fn encode_mp3(&self, track: &Track, path: &Path, bitrate: &str) -> Result<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let source = tempfile::Builder::new()
            .prefix(".encode-")
            .suffix(".wav")
            .tempfile_in(dir)
            .map_err(|e| NarrationError::encode("mp3", e))?;
        write_wav(track, source.path())?;

        let partial = partial_path(path);
        let output = self
            .ffmpeg_command()
            .args(["-y", "-loglevel", "error", "-i"])
            .arg(source.path())
            .args(["-codec:a", "libmp3lame", "-b:a", bitrate, "-f", "mp3"])
            .arg(&partial)
            .output()
            .map_err(|e| NarrationError::encode("mp3", format!("failed to run ffmpeg: {}", e)))?;

        if !output.status.success() {
            let _ = fs::remove_file(&partial);
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(NarrationError::encode("mp3", stderr.trim()));
        }

        fs::rename(&partial, path).map_err(|e| {
            let _ = fs::remove_file(&partial);
            NarrationError::encode("mp3", e)
        })?;
        debug!("Encoded {} at {}", path.display(), bitrate);
        Ok(())
    }

    /// Read any audio file. WAV is read directly, other formats are
    /// converted through ffmpeg first.
    pub fn decode_file(&self, path: &Path) -> Result<Waveform> {
        let is_wav = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("wav"))
            .unwrap_or(false);
        if is_wav {
            return Waveform::read_wav(path);
        }

        let converted = tempfile::Builder::new()
            .prefix(".decode-")
            .suffix(".wav")
            .tempfile()?;
        let output = self
            .ffmpeg_command()
            .args(["-y", "-loglevel", "error", "-i"])
            .arg(path)
            .args(["-f", "wav", "-acodec", "pcm_s16le"])
            .arg(converted.path())
            .output()
            .map_err(|e| NarrationError::Decode(format!("failed to run ffmpeg: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(NarrationError::Decode(format!(
                "ffmpeg could not decode {}: {}",
                path.display(),
                stderr.trim()
            )));
        }
        Waveform::read_wav(converted.path())
    }
}

/// Encode with the system ffmpeg.
pub fn write_track(track: &Track, path: &Path, format: &OutputFormat) -> Result<EncodedArtifact> {
    Encoder::default().write_track(track, path, format)
}

/// 16-bit mono PCM.
pub fn write_wav(track: &Track, path: &Path) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: track.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)?;
    for sample in &track.samples {
        let clamped = sample.clamp(-1.0, 1.0);
        writer.write_sample((clamped * i16::MAX as f32) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}

fn commit_wav(track: &Track, path: &Path) -> Result<()> {
    let partial = partial_path(path);
    if let Err(e) = write_wav(track, &partial) {
        let _ = fs::remove_file(&partial);
        return Err(e);
    }
    fs::rename(&partial, path)?;
    Ok(())
}

/// `name.ext` becomes `name.ext.partial`.
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".partial");
    PathBuf::from(name)
}

fn artifact(track: &Track, path: &Path, extension: &str, fell_back: bool) -> EncodedArtifact {
    EncodedArtifact {
        path: path.to_path_buf(),
        extension: extension.to_string(),
        duration_secs: track.duration_secs(),
        fell_back,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::waveform::Samples;
    use tempfile::TempDir;

    fn track() -> Track {
        Track {
            samples: vec![0.0, 0.5, -0.5, 1.0],
            sample_rate: 8000,
        }
    }

    #[test]
    fn test_write_wav_and_read_back() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out.wav");

        let encoded = write_track(&track(), &path, &OutputFormat::Wav).unwrap();
        assert_eq!(encoded.path, path);
        assert!(!encoded.fell_back);
        assert_eq!(encoded.duration_secs, 4.0 / 8000.0);
        assert!(!partial_path(&path).exists());

        let waveform = Waveform::read_wav(&path).unwrap();
        assert_eq!(waveform.sample_rate, 8000);
        assert_eq!(waveform.samples, Samples::I16(vec![0, 16383, -16383, i16::MAX]));
    }

    #[test]
    fn test_mp3_falls_back_to_wav_without_ffmpeg() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("batch_001.mp3");
        let encoder = Encoder::new("/nonexistent/ffmpeg");
        assert!(!encoder.is_ffmpeg_available());

        let format = OutputFormat::Mp3 {
            bitrate: "320k".into(),
        };
        let encoded = encoder.write_track(&track(), &path, &format).unwrap();

        assert!(encoded.fell_back);
        assert_eq!(encoded.extension, "wav");
        assert_eq!(encoded.path, temp_dir.path().join("batch_001.wav"));
        assert!(encoded.path.exists());
        assert!(!path.exists());

        // Only the fallback WAV is left behind
        let entries: Vec<_> = fs::read_dir(temp_dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_decode_non_wav_without_ffmpeg() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.mp3");
        fs::write(&path, b"junk").unwrap();
        let err = Encoder::new("/nonexistent/ffmpeg").decode_file(&path).unwrap_err();
        assert!(matches!(err, NarrationError::Decode(_)));
    }

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("/out/book_001.mp3")),
            PathBuf::from("/out/book_001.mp3.partial")
        );
        assert_eq!(OutputFormat::Wav.extension(), "wav");
    }
}
