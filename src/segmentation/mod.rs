mod detector;
mod mog2;
pub mod regions;
pub mod types;

pub use detector::FrameDetector;
pub use mog2::GaussianMixtureModel;
pub use types::{BackgroundModel, FrameDetection, Region};

use crate::config::DetectConfig;
use anyhow::Result;

/// Create a detector backed by the default background model (Gaussian mixture)
pub fn create_default_detector(config: &DetectConfig) -> Result<FrameDetector<GaussianMixtureModel>> {
    let mut model = GaussianMixtureModel::new(config.history, config.shadow_threshold)?;
    if !config.detect_shadows {
        model = model.without_shadows();
    }
    Ok(FrameDetector::new(model, config.min_area))
}
