pub mod naming;
pub mod results;
pub mod tail_angles;

use std::path::PathBuf;

use crate::error::TailmarkError;
use crate::store::RecordingId;

/// Outcome of a batch tail-angle import. Failed files never block the rest.
#[derive(Debug, Default)]
pub struct ImportReport {
    pub imported: Vec<RecordingId>,
    pub failures: Vec<(PathBuf, TailmarkError)>,
}

impl ImportReport {
    pub fn summary(&self) -> String {
        match self.failures.len() {
            0 => format!("Imported {} recording(s)", self.imported.len()),
            n => format!(
                "Imported {} recording(s), {} file(s) failed",
                self.imported.len(),
                n
            ),
        }
    }
}

/// Outcome of matching videos from a folder against loaded recordings.
#[derive(Debug, Default)]
pub struct VideoMatchReport {
    pub attached: Vec<(RecordingId, PathBuf)>,
    /// Recordings without a recognised suffix or without the expected file.
    pub unmatched: Vec<RecordingId>,
    pub failures: Vec<(PathBuf, TailmarkError)>,
}

impl VideoMatchReport {
    pub fn summary(&self) -> String {
        let mut line = format!("Attached {} video(s)", self.attached.len());
        if !self.failures.is_empty() {
            line.push_str(&format!(", {} failed to open", self.failures.len()));
        }
        line
    }
}

/// Outcome of writing one results file per recording.
#[derive(Debug, Default)]
pub struct ExportReport {
    pub written: Vec<PathBuf>,
    pub failures: Vec<(PathBuf, TailmarkError)>,
}

impl ExportReport {
    pub fn summary(&self) -> String {
        match self.failures.len() {
            0 => format!("Saved {} results file(s)", self.written.len()),
            n => format!(
                "Saved {} results file(s), {} could not be written",
                self.written.len(),
                n
            ),
        }
    }
}
