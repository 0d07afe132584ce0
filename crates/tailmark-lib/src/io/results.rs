use anyhow::Context;
use csv::WriterBuilder;
use std::path::Path;

use super::naming::results_file_name;
use super::ExportReport;
use crate::config::AnnotatorConfig;
use crate::error::{Result, TailmarkError};
use crate::store::{Recording, RecordingStore};

pub const RESULTS_HEADER: [&str; 3] = ["Behavior", "Start Time (s)", "End Time (s)"];

/// Shortest round-trip decimal form that always carries a fractional part
/// (`1.0`, `2.5`, `3.2`).
pub fn decimal_string(value: f64) -> String {
    format!("{value:?}")
}

/// Write one recording's intervals, in insertion order, to `path`.
pub fn write_results(path: &Path, recording: &Recording, config: &AnnotatorConfig) -> Result<()> {
    write_rows(path, recording, config).map_err(|err| TailmarkError::write(path, format!("{err:#}")))
}

fn write_rows(path: &Path, recording: &Recording, config: &AnnotatorConfig) -> anyhow::Result<()> {
    let mut writer = WriterBuilder::new()
        .from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    writer.write_record(RESULTS_HEADER)?;
    for interval in &recording.intervals {
        writer.write_record([
            config.behavior_name(interval.label).to_string(),
            decimal_string(interval.start),
            decimal_string(interval.end),
        ])?;
    }
    writer.flush().context("flushing results")?;
    Ok(())
}

/// One results file per recording inside `dir`. A file that cannot be
/// written is reported and the rest are still attempted.
pub fn export_results(
    store: &RecordingStore,
    config: &AnnotatorConfig,
    dir: &Path,
) -> ExportReport {
    let mut report = ExportReport::default();
    for recording in store.iter() {
        let name = results_file_name(
            recording.source_path(),
            &config.tail_suffix,
            &config.results_suffix,
        );
        let path = dir.join(name);
        match write_results(&path, recording, config) {
            Ok(()) => {
                log::info!(
                    "wrote {} interval(s) to {}",
                    recording.intervals.len(),
                    path.display()
                );
                report.written.push(path);
            }
            Err(err) => {
                log::warn!("{err}");
                report.failures.push((path, err));
            }
        }
    }
    report
}
