//! Resumable job state.

mod store;
mod types;

pub use store::CheckpointStore;
pub use types::{
    ArtifactRecord, CHECKPOINT_VERSION, JobState, fingerprint_plan, fingerprint_text, job_key,
};
