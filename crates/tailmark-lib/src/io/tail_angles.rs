use anyhow::{bail, Context};
use csv::{ReaderBuilder, Trim};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use super::ImportReport;
use crate::error::{Result, TailmarkError};
use crate::signal::TailAngles;
use crate::store::RecordingStore;

/// Parse `index, angle_1, ..., angle_k` rows. Column 0 is a row label and is
/// dropped; empty cells become NaN; anything else non-numeric fails the file.
pub fn parse_tail_angles<R: Read>(reader: R) -> anyhow::Result<TailAngles> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);
    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("reading row {}", idx + 1))?;
        let mut row = Vec::with_capacity(record.len().saturating_sub(1));
        for (col, field) in record.iter().enumerate().skip(1) {
            let value = if field.is_empty() {
                f64::NAN
            } else {
                field.parse::<f64>().with_context(|| {
                    format!("row {} column {} is not numeric: {}", idx + 1, col + 1, field)
                })?
            };
            row.push(value);
        }
        if let Some(first) = rows.first().map(Vec::len) {
            if row.len() != first {
                bail!(
                    "row {} has {} angle columns, expected {}",
                    idx + 1,
                    row.len(),
                    first
                );
            }
        }
        rows.push(row);
    }
    if rows.is_empty() {
        bail!("no rows found");
    }
    TailAngles::from_rows(rows).context("rows carry no angle columns")
}

pub fn read_tail_angles(path: &Path) -> Result<TailAngles> {
    let file = fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))
        .map_err(|err| TailmarkError::parse(path, format!("{err:#}")))?;
    parse_tail_angles(file).map_err(|err| TailmarkError::parse(path, format!("{err:#}")))
}

/// `.csv` files directly inside `dir`, sorted by name.
pub fn list_csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("failed to list {}", dir.display()))
        .map_err(|err| TailmarkError::parse(dir, format!("{err:#}")))?;
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
        })
        .collect();
    paths.sort();
    Ok(paths)
}

/// Load every file into the store; each failure is logged and recorded
/// without stopping the batch.
pub fn import_files<I, P>(store: &mut RecordingStore, paths: I) -> ImportReport
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let mut report = ImportReport::default();
    for path in paths {
        let path = path.as_ref();
        let added = read_tail_angles(path).and_then(|angles| {
            let frames = angles.frames();
            let id = store.add_recording(angles, path)?;
            Ok((id, frames))
        });
        match added {
            Ok((id, frames)) => {
                log::info!("loaded {} ({} frames)", path.display(), frames);
                report.imported.push(id);
            }
            Err(err) => {
                log::warn!("skipping {}: {}", path.display(), err);
                report.failures.push((path.to_path_buf(), err));
            }
        }
    }
    report
}

pub fn import_folder(store: &mut RecordingStore, dir: &Path) -> Result<ImportReport> {
    let paths = list_csv_files(dir)?;
    log::info!("importing {} csv file(s) from {}", paths.len(), dir.display());
    Ok(import_files(store, paths))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn drops_index_column() {
        let text = "0,1.0,2.0,3.0\n1,4.0,5.0,6.0\n";
        let angles = parse_tail_angles(text.as_bytes()).unwrap();
        assert_eq!(angles.frames(), 2);
        assert_eq!(angles.joints(), 3);
        assert_eq!(angles.frame(1), Some(&[4.0, 5.0, 6.0][..]));
    }

    #[test]
    fn empty_cells_are_nan() {
        let angles = parse_tail_angles("0,1.0,,3.0\n".as_bytes()).unwrap();
        assert!(angles.frame(0).unwrap()[1].is_nan());
    }

    #[test]
    fn non_numeric_cell_fails_whole_file() {
        let err = parse_tail_angles("0,1.0,2.0\n1,abc,3.0\n".as_bytes()).unwrap_err();
        assert!(format!("{err:#}").contains("row 2 column 2"));
    }

    #[test]
    fn header_row_is_malformed() {
        assert!(parse_tail_angles("frame,a,b\n0,1.0,2.0\n".as_bytes()).is_err());
    }

    #[test]
    fn ragged_and_empty_inputs_fail() {
        assert!(parse_tail_angles("0,1.0,2.0\n1,3.0\n".as_bytes()).is_err());
        assert!(parse_tail_angles("".as_bytes()).is_err());
        assert!(parse_tail_angles("0\n1\n".as_bytes()).is_err());
    }

    #[test]
    fn read_reports_parse_error_with_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        fs::write(&path, "x,y\n").unwrap();
        match read_tail_angles(&path) {
            Err(TailmarkError::Parse { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn lists_only_csv_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.csv"), "0,1\n").unwrap();
        fs::write(dir.path().join("a.CSV"), "0,1\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "hi").unwrap();
        fs::create_dir(dir.path().join("nested.csv")).unwrap();
        let names: Vec<String> = list_csv_files(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.CSV", "b.csv"]);
    }
}
