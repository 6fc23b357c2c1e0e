use super::OutputSink;
use anyhow::{Context, Result};
use image::RgbImage;
use std::path::{Path, PathBuf};

/// Writes every frame as a numbered PNG into a directory
pub struct FrameDirOutput {
    dir: PathBuf,
    width: u32,
    height: u32,
    written: u64,
}

impl FrameDirOutput {
    pub fn new<P: AsRef<Path>>(dir: P, width: u32, height: u32) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create frame directory {}", dir.display()))?;
        tracing::info!("Writing annotated frames to {}", dir.display());

        Ok(Self {
            dir: dir.to_path_buf(),
            width,
            height,
            written: 0,
        })
    }
}

impl OutputSink for FrameDirOutput {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        let path = self.dir.join(format!("frame_{:06}.png", self.written));
        frame
            .save(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        self.written += 1;
        Ok(())
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
