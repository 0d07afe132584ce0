//! File naming conventions shared by video matching and export.
//!
//! A tracking run produces `<video>_tail_angles.csv` next to `<video>.avi`;
//! results go to `<video>_behaviors.csv`.

use std::path::Path;

fn file_name(source: &Path) -> Option<&str> {
    source.file_name().and_then(|name| name.to_str())
}

/// Video base name when the source follows `<base><suffix>.csv`.
pub fn tracked_base_name<'a>(source: &'a Path, tail_suffix: &str) -> Option<&'a str> {
    let name = file_name(source)?;
    let stem = name.strip_suffix(".csv")?;
    stem.strip_suffix(tail_suffix)
}

/// Base name for results: the tracked video name, or the bare file stem
/// when the suffix is absent.
pub fn results_base_name(source: &Path, tail_suffix: &str) -> String {
    if let Some(base) = tracked_base_name(source, tail_suffix) {
        return base.to_string();
    }
    source
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub fn results_file_name(source: &Path, tail_suffix: &str, results_suffix: &str) -> String {
    format!("{}{}.csv", results_base_name(source, tail_suffix), results_suffix)
}

/// Expected video file for a tail-angle file, if it follows the convention.
pub fn expected_video_name(source: &Path, tail_suffix: &str, extension: &str) -> Option<String> {
    tracked_base_name(source, tail_suffix).map(|base| format!("{base}.{extension}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tracking_suffix() {
        let source = Path::new("/data/run3/fish1_tail_angles.csv");
        assert_eq!(tracked_base_name(source, "_tail_angles"), Some("fish1"));
        assert_eq!(
            results_file_name(source, "_tail_angles", "_behaviors"),
            "fish1_behaviors.csv"
        );
        assert_eq!(
            expected_video_name(source, "_tail_angles", "avi").as_deref(),
            Some("fish1.avi")
        );
    }

    #[test]
    fn falls_back_to_bare_stem() {
        let source = Path::new("/data/larva_07.csv");
        assert_eq!(tracked_base_name(source, "_tail_angles"), None);
        assert_eq!(
            results_file_name(source, "_tail_angles", "_behaviors"),
            "larva_07_behaviors.csv"
        );
        assert!(expected_video_name(source, "_tail_angles", "avi").is_none());
    }
}
