use std::path::PathBuf;
use thiserror::Error;

use crate::store::RecordingId;

/// Failures surfaced by the annotation core. Every variant is recoverable:
/// batch operations record it against the offending item and move on.
#[derive(Debug, Error)]
pub enum TailmarkError {
    #[error("could not parse tail angles from {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },
    #[error("could not open video {}: {reason}", path.display())]
    VideoOpen { path: PathBuf, reason: String },
    #[error("video decode failed: {reason}")]
    Decode { reason: String },
    #[error("could not write {}: {reason}", path.display())]
    Write { path: PathBuf, reason: String },
    #[error("invalid configuration {}: {reason}", path.display())]
    Config { path: PathBuf, reason: String },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("{} is already loaded", .0.display())]
    DuplicateSource(PathBuf),
    #[error("no recording with id {0}")]
    UnknownRecording(RecordingId),
}

impl TailmarkError {
    pub fn parse(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Self::Parse {
            path: path.into(),
            reason: err.to_string(),
        }
    }

    pub fn video_open(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Self::VideoOpen {
            path: path.into(),
            reason: err.to_string(),
        }
    }

    pub fn decode(err: impl std::fmt::Display) -> Self {
        Self::Decode {
            reason: err.to_string(),
        }
    }

    pub fn write(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Self::Write {
            path: path.into(),
            reason: err.to_string(),
        }
    }
}

pub type Result<T, E = TailmarkError> = std::result::Result<T, E>;
