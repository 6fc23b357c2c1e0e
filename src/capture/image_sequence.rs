use super::CaptureSource;
use anyhow::{ensure, Context, Result};
use image::RgbImage;
use std::path::{Path, PathBuf};

const FRAME_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// A directory of still frames played back in file-name order
pub struct ImageSequenceCapture {
    frames: Vec<PathBuf>,
    next: usize,
    width: u32,
    height: u32,
}

impl ImageSequenceCapture {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let mut frames = Vec::new();
        for entry in std::fs::read_dir(dir)
            .with_context(|| format!("Failed to list frames in {}", dir.display()))?
        {
            let path = entry?.path();
            let is_frame = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| FRAME_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
            if is_frame {
                frames.push(path);
            }
        }
        frames.sort();
        ensure!(!frames.is_empty(), "No frames found in {}", dir.display());

        let (width, height) = image::image_dimensions(&frames[0])
            .with_context(|| format!("Failed to read {}", frames[0].display()))?;

        tracing::info!(
            "Opening image sequence {} ({} frames, {}x{})",
            dir.display(),
            frames.len(),
            width,
            height
        );

        Ok(Self {
            frames,
            next: 0,
            width,
            height,
        })
    }
}

impl CaptureSource for ImageSequenceCapture {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        let Some(path) = self.frames.get(self.next) else {
            return Ok(None);
        };
        self.next += 1;

        let frame = image::open(path)
            .with_context(|| format!("Failed to decode {}", path.display()))?
            .to_rgb8();
        Ok(Some(frame))
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
