use anyhow::Context;
use dirs_next::config_dir;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, TailmarkError};
use crate::plot::Color;

pub const CONFIG_ENV: &str = "TAILMARK_CONFIG";

/// Index into the behavior catalog. The catalog is fixed once the config is
/// loaded, so an index stays meaningful for the whole session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Behavior(pub usize);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BehaviorSpec {
    pub name: String,
    pub color: Color,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotatorConfig {
    /// Camera frame rate in Hz, shared by the tail-angle rows and the video.
    pub frame_rate: f64,
    pub tail_suffix: String,
    pub results_suffix: String,
    pub video_extension: String,
    /// Number of trailing angle columns averaged into the plotted trace.
    pub trace_channels: usize,
    /// Label height as a fraction of the trace maximum.
    pub label_height: f64,
    pub behaviors: Vec<BehaviorSpec>,
}

impl Default for AnnotatorConfig {
    fn default() -> Self {
        Self {
            frame_rate: 349.0,
            tail_suffix: "_tail_angles".into(),
            results_suffix: "_behaviors".into(),
            video_extension: "avi".into(),
            trace_channels: 3,
            label_height: 0.9,
            behaviors: vec![
                BehaviorSpec {
                    name: "J-Turn".into(),
                    color: Color(0xFF6400),
                },
                BehaviorSpec {
                    name: "C-Bend".into(),
                    color: Color(0x0064FF),
                },
                BehaviorSpec {
                    name: "Swim".into(),
                    color: Color(0x6400FF),
                },
            ],
        }
    }
}

impl AnnotatorConfig {
    /// Resolve the config file: `$TAILMARK_CONFIG`, then the platform config
    /// dir, then built-in defaults when neither file exists.
    pub fn load() -> Result<Self> {
        match Self::locate() {
            Some(path) => Self::from_path(&path),
            None => Ok(Self::default()),
        }
    }

    fn locate() -> Option<PathBuf> {
        if let Ok(path) = env::var(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }
        let candidate = config_dir()?.join("tailmark/config.toml");
        candidate.exists().then_some(candidate)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))
            .map_err(|err| config_error(path, format!("{err:#}")))?;
        let config = Self::from_toml(&contents).map_err(|reason| config_error(path, reason))?;
        log::info!("loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self, String> {
        let config: Self = toml::from_str(contents).map_err(|err| err.to_string())?;
        config.check()?;
        Ok(config)
    }

    /// Reject catalogs and rates a session cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.check().map_err(TailmarkError::InvalidConfig)
    }

    fn check(&self) -> Result<(), String> {
        if self.behaviors.is_empty() {
            return Err("at least one behavior is required".into());
        }
        if !(self.frame_rate.is_finite() && self.frame_rate > 0.0) {
            return Err(format!("frame_rate must be positive, got {}", self.frame_rate));
        }
        if self.trace_channels == 0 {
            return Err("trace_channels must be at least 1".into());
        }
        Ok(())
    }

    pub fn behavior(&self, behavior: Behavior) -> &BehaviorSpec {
        // Behavior indices are only minted from this catalog, which a
        // validated config never leaves empty.
        &self.behaviors[behavior.0.min(self.behaviors.len().saturating_sub(1))]
    }

    pub fn behavior_name(&self, behavior: Behavior) -> &str {
        &self.behavior(behavior).name
    }

    pub fn behavior_color(&self, behavior: Behavior) -> Color {
        self.behavior(behavior).color
    }

    pub fn default_behavior(&self) -> Behavior {
        Behavior(0)
    }

    pub fn all_behaviors(&self) -> impl Iterator<Item = Behavior> {
        (0..self.behaviors.len()).map(Behavior)
    }
}

fn config_error(path: &Path, reason: String) -> TailmarkError {
    TailmarkError::Config {
        path: path.to_path_buf(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_match_lab_conventions() {
        let config = AnnotatorConfig::default();
        assert_eq!(config.frame_rate, 349.0);
        assert_eq!(config.behavior_name(Behavior(0)), "J-Turn");
        assert_eq!(config.behavior_name(Behavior(2)), "Swim");
        assert_eq!(config.behavior_color(Behavior(1)), Color(0x0064FF));
        assert_eq!(config.all_behaviors().count(), 3);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = AnnotatorConfig::from_toml("frame_rate = 200.0\n").unwrap();
        assert_eq!(config.frame_rate, 200.0);
        assert_eq!(config.tail_suffix, "_tail_angles");
        assert_eq!(config.behaviors.len(), 3);
    }

    #[test]
    fn custom_behaviors_replace_catalog() {
        let text = r#"
            [[behaviors]]
            name = "Struggle"
            color = 0x00FF00

            [[behaviors]]
            name = "Rest"
            color = 0x808080
        "#;
        let config = AnnotatorConfig::from_toml(text).unwrap();
        assert_eq!(config.behaviors.len(), 2);
        assert_eq!(config.behavior_name(config.default_behavior()), "Struggle");
    }

    #[test]
    fn rejects_empty_catalog_and_bad_rate() {
        assert!(AnnotatorConfig::from_toml("behaviors = []").is_err());
        assert!(AnnotatorConfig::from_toml("frame_rate = 0.0").is_err());
        assert!(AnnotatorConfig::from_toml("trace_channels = 0").is_err());
    }

    #[test]
    fn validate_rejects_hand_built_configs() {
        let empty = AnnotatorConfig {
            behaviors: Vec::new(),
            ..AnnotatorConfig::default()
        };
        assert!(matches!(empty.validate(), Err(TailmarkError::InvalidConfig(_))));
        let stalled = AnnotatorConfig {
            frame_rate: f64::NAN,
            ..AnnotatorConfig::default()
        };
        assert!(matches!(stalled.validate(), Err(TailmarkError::InvalidConfig(_))));
        assert!(AnnotatorConfig::default().validate().is_ok());
    }

    #[test]
    fn from_path_reports_config_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "frame_rate = \"fast\"").unwrap();
        match AnnotatorConfig::from_path(&path) {
            Err(TailmarkError::Config { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("expected config error, got {other:?}"),
        }
    }
}
