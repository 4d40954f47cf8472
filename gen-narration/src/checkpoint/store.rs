//! Checkpoint persistence: one pretty JSON file per job, replaced atomically.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;

use log::debug;
use tempfile::NamedTempFile;

use super::types::JobState;
use crate::error::{NarrationError, Result};

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `<local data dir>/gen-narration/checkpoints`
    pub fn default_dir() -> Result<PathBuf> {
        dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .map(|d| d.join("gen-narration").join("checkpoints"))
            .ok_or_else(|| NarrationError::Config("could not determine data directory".into()))
    }

    pub fn path_for(&self, job_key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", job_key))
    }

    pub fn exists(&self, job_key: &str) -> bool {
        self.path_for(job_key).exists()
    }

    /// Load a job's state, `None` when no checkpoint exists.
    pub fn load(&self, job_key: &str) -> Result<Option<JobState>> {
        let path = self.path_for(job_key);
        if !path.exists() {
            return Ok(None);
        }

        let file = File::open(&path).map_err(|e| NarrationError::checkpoint(&path, e))?;
        let state: JobState = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| NarrationError::checkpoint(&path, format!("corrupt checkpoint: {}", e)))?;
        debug!(
            "Loaded checkpoint {} ({} of {} batches done)",
            path.display(),
            state.completed_batch_indices.len(),
            state.total_batches
        );
        Ok(Some(state))
    }

    /// Write to a temp file in the same directory, sync, then rename over
    /// the previous checkpoint.
    pub fn save(&self, state: &JobState) -> Result<()> {
        let path = self.path_for(&state.job_key);
        fs::create_dir_all(&self.dir).map_err(|e| NarrationError::checkpoint(&self.dir, e))?;

        let mut tmp =
            NamedTempFile::new_in(&self.dir).map_err(|e| NarrationError::checkpoint(&path, e))?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer_pretty(&mut writer, state)
                .map_err(|e| NarrationError::checkpoint(&path, e))?;
            writer
                .flush()
                .map_err(|e| NarrationError::checkpoint(&path, e))?;
        }
        tmp.as_file()
            .sync_all()
            .map_err(|e| NarrationError::checkpoint(&path, e))?;
        tmp.persist(&path)
            .map_err(|e| NarrationError::checkpoint(&path, e.error))?;
        Ok(())
    }

    pub fn remove(&self, job_key: &str) -> Result<()> {
        let path = self.path_for(job_key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(NarrationError::checkpoint(&path, e)),
        }
    }
}
