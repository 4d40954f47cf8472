//! Job checkpoint data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::batch::Batch;
use crate::error::{NarrationError, Result};
use crate::output::naming::sanitize;

/// Bumped whenever the on-disk layout changes.
pub const CHECKPOINT_VERSION: u32 = 1;

/// A committed batch artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub batch_index: usize,
    pub path: PathBuf,
    /// Extension actually written (`wav` after an MP3 fallback)
    pub format: String,
    pub duration_secs: f64,
    pub chunk_count: usize,
    pub failed_chunks: usize,
    #[serde(default)]
    pub fell_back: bool,
}

/// Persistent state of one narration job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobState {
    pub version: u32,
    pub job_key: String,
    pub source_id: String,
    /// SHA-256 prefix of the source text
    pub source_fingerprint: String,
    /// SHA-256 prefix of the serialized batch list
    pub plan_fingerprint: String,
    /// Frozen batch plan
    pub batches: Vec<Batch>,
    pub total_batches: usize,
    pub completed_batch_indices: BTreeSet<usize>,
    pub artifacts: BTreeMap<usize, ArtifactRecord>,
    /// yymmdd stamp used in every artifact name of this job
    pub date_stamp: String,
    pub started_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
}

impl JobState {
    /// Fresh state for a newly planned job.
    pub fn new(
        job_key: String,
        source_id: String,
        source_text: &str,
        batches: Vec<Batch>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            job_key,
            source_id,
            source_fingerprint: fingerprint_text(source_text),
            plan_fingerprint: fingerprint_plan(&batches),
            total_batches: batches.len(),
            batches,
            completed_batch_indices: BTreeSet::new(),
            artifacts: BTreeMap::new(),
            date_stamp: now.format("%y%m%d").to_string(),
            started_at: now,
            last_update: now,
        }
    }

    /// Batch indices still to run, ascending.
    pub fn pending_indices(&self) -> Vec<usize> {
        (0..self.total_batches)
            .filter(|i| !self.completed_batch_indices.contains(i))
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.completed_batch_indices.len() == self.total_batches
    }

    /// Record a committed batch.
    pub fn mark_complete(&mut self, record: ArtifactRecord) {
        self.completed_batch_indices.insert(record.batch_index);
        self.artifacts.insert(record.batch_index, record);
        self.last_update = Utc::now();
    }

    /// Progress as (completed, total, percentage).
    pub fn progress(&self) -> (usize, usize, f64) {
        let completed = self.completed_batch_indices.len();
        let total = self.total_batches;
        let percentage = if total > 0 {
            completed as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        (completed, total, percentage)
    }

    /// Check a reloaded state against the current input before resuming.
    pub fn verify(&self, source_text: &str) -> Result<()> {
        let mismatch = |reason: &str| NarrationError::PlanMismatch {
            key: self.job_key.clone(),
            reason: reason.to_string(),
        };

        if self.version != CHECKPOINT_VERSION {
            return Err(mismatch(&format!(
                "unsupported checkpoint version {}",
                self.version
            )));
        }
        if self.source_fingerprint != fingerprint_text(source_text) {
            return Err(mismatch("source text changed"));
        }
        if self.plan_fingerprint != fingerprint_plan(&self.batches) {
            return Err(mismatch("stored batch plan was modified"));
        }
        let indices_in_order = self.batches.iter().enumerate().all(|(i, b)| b.index == i);
        let completed_in_range = self
            .completed_batch_indices
            .iter()
            .all(|i| *i < self.total_batches);
        let artifacts_committed = self
            .artifacts
            .keys()
            .all(|i| self.completed_batch_indices.contains(i));
        if self.total_batches != self.batches.len()
            || !indices_in_order
            || !completed_in_range
            || !artifacts_committed
        {
            return Err(mismatch("inconsistent batch indices"));
        }
        Ok(())
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// First 16 hex characters of the SHA-256 of the text.
pub fn fingerprint_text(text: &str) -> String {
    sha256_hex(text.as_bytes())[..16].to_string()
}

/// First 16 hex characters of the SHA-256 of the serialized plan.
pub fn fingerprint_plan(batches: &[Batch]) -> String {
    let serialized = serde_json::to_vec(batches).unwrap_or_default();
    sha256_hex(&serialized)[..16].to_string()
}

/// Key for an input file: its sanitized stem plus a hash of its absolute
/// path.
pub fn job_key(source_id: &str, input: &Path) -> String {
    let resolved = input
        .canonicalize()
        .unwrap_or_else(|_| input.to_path_buf());
    let path_hash = sha256_hex(resolved.to_string_lossy().as_bytes());
    format!("{}_{}", sanitize(source_id), &path_hash[..8])
}
