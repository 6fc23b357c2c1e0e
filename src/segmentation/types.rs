use anyhow::Result;
use image::{GrayImage, RgbImage};
use imageproc::point::Point;

/// Per-pixel class labels, same dimensions as the input frame
///
/// Each pixel holds one of [`BACKGROUND`], [`SHADOW`] or [`FOREGROUND`].
pub type LabelMask = GrayImage;

pub const BACKGROUND: u8 = 0;
pub const SHADOW: u8 = 127;
pub const FOREGROUND: u8 = 255;

/// Trait for adaptive background models
/// Allows swapping the statistical model behind the detector
pub trait BackgroundModel {
    /// Update the model with a frame and label every pixel of it
    ///
    /// # Arguments
    /// * `frame` - Input RGB frame
    ///
    /// # Returns
    /// * Label mask with values [`BACKGROUND`], [`SHADOW`] or [`FOREGROUND`]
    fn apply(&mut self, frame: &RgbImage) -> Result<LabelMask>;

    /// Forget everything learned so far
    ///
    /// Call this when starting a new video.
    fn reset_state(&mut self);

    /// Frames absorbed since creation or the last reset
    fn frames_seen(&self) -> u64;
}

/// A connected region cut out of one class mask
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    /// Outer boundary pixels in tracing order
    pub contour: Vec<Point<i32>>,
    /// Pixels enclosed by the boundary, boundary included
    pub area: f64,
}

impl Region {
    /// Inclusive bounding box as (min_x, min_y, max_x, max_y)
    pub fn bounding_box(&self) -> (i32, i32, i32, i32) {
        let mut bounds = (i32::MAX, i32::MAX, i32::MIN, i32::MIN);
        for p in &self.contour {
            bounds.0 = bounds.0.min(p.x);
            bounds.1 = bounds.1.min(p.y);
            bounds.2 = bounds.2.max(p.x);
            bounds.3 = bounds.3.max(p.y);
        }
        bounds
    }

    /// Centre of the bounding box
    pub fn center(&self) -> (f32, f32) {
        let (x0, y0, x1, y1) = self.bounding_box();
        ((x0 + x1) as f32 / 2.0, (y0 + y1) as f32 / 2.0)
    }
}

/// Selected regions for one frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameDetection {
    pub fly: Option<Region>,
    pub shadow: Option<Region>,
}

impl FrameDetection {
    pub fn is_empty(&self) -> bool {
        self.fly.is_none() && self.shadow.is_none()
    }
}
