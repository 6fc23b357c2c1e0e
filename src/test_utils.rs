//! Synthetic frames and an in-memory frame source for unit tests.

use crate::capture::CaptureSource;
use anyhow::Result;
use image::{Rgb, RgbImage};
use std::collections::VecDeque;

pub(crate) fn solid_frame(width: u32, height: u32, color: [u8; 3]) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb(color))
}

/// Paint a `w`x`h` rectangle with its top-left corner at (`x`, `y`), clipped to the frame.
pub(crate) fn fill_rect(frame: &mut RgbImage, x: u32, y: u32, w: u32, h: u32, color: [u8; 3]) {
    let (width, height) = frame.dimensions();
    for py in y..(y + h).min(height) {
        for px in x..(x + w).min(width) {
            frame.put_pixel(px, py, Rgb(color));
        }
    }
}

/// A 20x20 bright square moving right by `step` pixels per frame over a dark,
/// static background.
pub(crate) fn moving_square_video(frames: u32, step: u32) -> Vec<RgbImage> {
    let width = 20 + step * frames + 10;
    let height = 40;
    (0..frames)
        .map(|t| {
            let mut frame = solid_frame(width, height, [30, 30, 30]);
            fill_rect(&mut frame, t * step, 10, 20, 20, [230, 230, 230]);
            frame
        })
        .collect()
}

pub(crate) fn static_video(frames: u32) -> Vec<RgbImage> {
    let mut frame = solid_frame(64, 48, [90, 110, 100]);
    fill_rect(&mut frame, 30, 20, 8, 8, [200, 40, 40]);
    vec![frame; frames as usize]
}

/// Frame source backed by a list of frames
pub(crate) struct MemoryCapture {
    frames: VecDeque<RgbImage>,
    resolution: (u32, u32),
}

impl MemoryCapture {
    pub(crate) fn new(frames: Vec<RgbImage>) -> Self {
        let resolution = frames.first().map(|f| f.dimensions()).unwrap_or((0, 0));
        Self {
            frames: frames.into(),
            resolution,
        }
    }
}

impl CaptureSource for MemoryCapture {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        Ok(self.frames.pop_front())
    }

    fn resolution(&self) -> (u32, u32) {
        self.resolution
    }
}
