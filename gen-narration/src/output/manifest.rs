//! Job manifest (`batch_info.json`) and playlist (`playlist.m3u`).

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::checkpoint::JobState;
use crate::error::Result;

pub const MANIFEST_FILE: &str = "batch_info.json";
pub const PLAYLIST_FILE: &str = "playlist.m3u";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchEntry {
    pub number: usize,
    pub file: String,
    /// `first-last`, 1-based
    pub page_range: Option<String>,
    /// `first-last`, 1-based
    pub paragraph_range: String,
    pub chars: usize,
    pub tokens: usize,
    pub chunks: usize,
    pub failed_chunks: usize,
    pub duration_secs: f64,
    pub fell_back: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub source_id: String,
    pub date_stamp: String,
    pub total_batches: usize,
    pub total_duration_secs: f64,
    pub final_file: Option<String>,
    pub batches: Vec<BatchEntry>,
}

impl Manifest {
    /// Describe every committed batch of `state`, in batch order.
    pub fn from_state(state: &JobState, final_file: Option<&Path>) -> Self {
        let batches: Vec<BatchEntry> = state
            .batches
            .iter()
            .filter_map(|batch| {
                let record = state.artifacts.get(&batch.index)?;
                Some(BatchEntry {
                    number: batch.number(),
                    file: file_name(&record.path),
                    page_range: batch
                        .page_range
                        .map(|(first, last)| format!("{}-{}", first, last)),
                    paragraph_range: format!(
                        "{}-{}",
                        batch.paragraph_range.0 + 1,
                        batch.paragraph_range.1 + 1
                    ),
                    chars: batch.char_count,
                    tokens: batch.token_estimate,
                    chunks: record.chunk_count,
                    failed_chunks: record.failed_chunks,
                    duration_secs: record.duration_secs,
                    fell_back: record.fell_back,
                })
            })
            .collect();

        Self {
            source_id: state.source_id.clone(),
            date_stamp: state.date_stamp.clone(),
            total_batches: state.total_batches,
            total_duration_secs: batches.iter().map(|b| b.duration_secs).sum(),
            final_file: final_file.map(file_name),
            batches,
        }
    }

    /// Write `batch_info.json` into `dir`.
    pub fn write_json(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(MANIFEST_FILE);
        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content)?;
        Ok(path)
    }

    /// Write `playlist.m3u` into `dir`, one entry per batch file.
    pub fn write_playlist(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(PLAYLIST_FILE);
        let mut file = BufWriter::new(File::create(&path)?);

        writeln!(file, "#EXTM3U")?;
        for entry in &self.batches {
            writeln!(
                file,
                "#EXTINF:{},{} - batch {}",
                entry.duration_secs.round() as u64,
                self.source_id,
                entry.number
            )?;
            writeln!(file, "{}", entry.file)?;
        }
        file.flush()?;
        Ok(path)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
