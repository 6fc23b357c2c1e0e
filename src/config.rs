use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Settings for one detection run over an experiment folder.
///
/// Every value has a reference default, so a TOML file only needs the keys
/// it wants to change.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DetectConfig {
    /// Root directory holding one folder per experiment
    pub base_path: PathBuf,
    /// Experiment folder name under `base_path`
    pub experiment_folder: String,
    /// File pattern matched inside the experiment folder
    pub glob_pattern: String,
    /// Scale applied to annotated frames before they are shown
    pub display_scale: f32,
    /// Number of recent frames the background model remembers
    pub history: u32,
    /// Lowest brightness ratio against the background still counted as shadow
    pub shadow_threshold: f32,
    /// Smallest region area (pixels) reported as a detection
    pub min_area: f64,
    /// Label darkened background as shadow rather than foreground
    pub detect_shadows: bool,
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("."),
            experiment_folder: String::new(),
            glob_pattern: "*.mp4".to_string(),
            display_scale: 0.3,
            history: 100,
            shadow_threshold: 0.75,
            min_area: 100.0,
            detect_shadows: true,
        }
    }
}

impl DetectConfig {
    /// Load a config from a TOML file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        tracing::info!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// Reject values the background model or display cannot work with.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.history > 0, "history must be at least 1 frame");
        ensure!(
            (0.0..=1.0).contains(&self.shadow_threshold),
            "shadow_threshold must lie in [0, 1], got {}",
            self.shadow_threshold
        );
        ensure!(
            self.display_scale > 0.0,
            "display_scale must be positive, got {}",
            self.display_scale
        );
        ensure!(self.min_area >= 0.0, "min_area must not be negative");
        Ok(())
    }

    /// Full glob pattern for the videos of this experiment.
    pub fn video_pattern(&self) -> PathBuf {
        self.base_path
            .join(&self.experiment_folder)
            .join(&self.glob_pattern)
    }
}
