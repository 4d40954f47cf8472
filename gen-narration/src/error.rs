use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NarrationError {
    #[error("Text extraction failed for {path}: {message}")]
    Extraction { path: PathBuf, message: String },

    #[error("Synthesis failed for chunk {chunk}: {message}")]
    Synthesis { chunk: usize, message: String },

    #[error("Encoding to {format} failed: {message}")]
    Encode { format: String, message: String },

    #[error("Checkpoint error at {path}: {message}")]
    Checkpoint { path: PathBuf, message: String },

    #[error("Checkpoint {key} does not match the current input: {reason}")]
    PlanMismatch { key: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Audio decode error: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl NarrationError {
    pub fn extraction(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Extraction {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn checkpoint(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Checkpoint {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn encode(format: impl Into<String>, message: impl ToString) -> Self {
        Self::Encode {
            format: format.into(),
            message: message.to_string(),
        }
    }
}

impl From<hound::Error> for NarrationError {
    fn from(err: hound::Error) -> Self {
        match err {
            hound::Error::IoError(e) => Self::Io(e),
            other => Self::Decode(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, NarrationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = NarrationError::PlanMismatch {
            key: "book_abcd".into(),
            reason: "source text changed".into(),
        };
        assert_eq!(
            err.to_string(),
            "Checkpoint book_abcd does not match the current input: source text changed"
        );
    }
}
