mod image_sequence;
mod video_file;

pub use image_sequence::ImageSequenceCapture;
pub use video_file::VideoFileCapture;

use crate::config::DetectConfig;
use anyhow::{Context, Result};
use image::RgbImage;
use std::path::{Path, PathBuf};

/// Trait for frame sources
pub trait CaptureSource {
    /// Decode the next frame, or `None` once the source is exhausted
    fn next_frame(&mut self) -> Result<Option<RgbImage>>;

    /// Get the resolution of decoded frames
    fn resolution(&self) -> (u32, u32);
}

/// Open a video file, or a directory of still frames, as a frame source
pub fn open_source(path: &Path) -> Result<Box<dyn CaptureSource>> {
    if path.is_dir() {
        Ok(Box::new(ImageSequenceCapture::new(path)?))
    } else {
        Ok(Box::new(VideoFileCapture::new(path)?))
    }
}

/// List the experiment's videos matching the configured pattern, sorted
pub fn discover_videos(config: &DetectConfig) -> Result<Vec<PathBuf>> {
    let pattern = config.video_pattern();
    let pattern = pattern
        .to_str()
        .with_context(|| format!("Video pattern {} is not valid UTF-8", pattern.display()))?;

    let mut videos: Vec<PathBuf> = glob::glob(pattern)
        .with_context(|| format!("Invalid video pattern {}", pattern))?
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable path");
                None
            }
        })
        .collect();
    videos.sort();

    if videos.is_empty() {
        tracing::warn!("No videos match {}", pattern);
    } else {
        tracing::info!("Found {} videos matching {}", videos.len(), pattern);
    }

    Ok(videos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn discovers_sorted_matches_only() {
        let tmp = TempDir::new().unwrap();
        let folder = tmp.path().join("exp1");
        std::fs::create_dir(&folder).unwrap();
        for name in ["fly_b.mp4", "fly_a.mp4", "notes.txt", "fly_c.avi"] {
            std::fs::write(folder.join(name), b"").unwrap();
        }

        let config = DetectConfig {
            base_path: tmp.path().to_path_buf(),
            experiment_folder: "exp1".to_string(),
            ..DetectConfig::default()
        };
        let videos = discover_videos(&config).unwrap();
        assert_eq!(
            videos,
            vec![folder.join("fly_a.mp4"), folder.join("fly_b.mp4")]
        );
    }

    #[test]
    fn missing_folder_yields_no_videos() {
        let tmp = TempDir::new().unwrap();
        let config = DetectConfig {
            base_path: tmp.path().to_path_buf(),
            experiment_folder: "does_not_exist".to_string(),
            ..DetectConfig::default()
        };
        assert!(discover_videos(&config).unwrap().is_empty());
    }
}
