//! Output artifacts: file naming and the job manifest.

pub mod manifest;
pub mod naming;

pub use manifest::{BatchEntry, Manifest};
pub use naming::{artifact_base, batch_file_name, final_file_name, sanitize};
