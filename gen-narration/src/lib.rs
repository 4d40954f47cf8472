//! gen-narration - turn long documents into narrated audio, one resumable
//! batch at a time.

pub mod audio;
pub mod batch;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod extract;
pub mod output;
pub mod runner;
pub mod synth;
pub mod text;

pub use config::{NarrationConfig, Profile};
pub use error::{NarrationError, Result};
pub use runner::{JobOutcome, JobPhase, JobRunner, JobSummary, RunProgress, StopHandle};
