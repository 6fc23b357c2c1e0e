use super::types::{BackgroundModel, LabelMask, BACKGROUND, FOREGROUND, SHADOW};
use anyhow::{ensure, Result};
use image::{GrayImage, Luma, RgbImage};
use ndarray::{Array2, Array3, ArrayViewMut1, Axis};

const MAX_MODES: usize = 5;
// weight, variance, mean r, mean g, mean b
const MODE_STRIDE: usize = 5;

/// Squared Mahalanobis distance under which a mode explains a pixel as background
const VAR_THRESHOLD: f32 = 16.0;
/// Squared distance under which a pixel updates an existing mode instead of spawning one
const VAR_THRESHOLD_GEN: f32 = 9.0;
/// Share of total weight that counts as background
const BACKGROUND_RATIO: f32 = 0.9;
const VAR_INIT: f32 = 15.0;
const VAR_MIN: f32 = 4.0;
const VAR_MAX: f32 = 5.0 * VAR_INIT;
/// Weight decay prior that prunes rarely seen modes
const COMPLEXITY_PRIOR: f32 = 0.05;

#[derive(Debug, Clone, Copy, Default)]
struct Mode {
    weight: f32,
    variance: f32,
    mean: [f32; 3],
}

/// Mixture state for every pixel of the current frame size
struct PixelState {
    // Shape (height, width, MAX_MODES * MODE_STRIDE), modes sorted by weight
    modes: Array3<f32>,
    used: Array2<u8>,
}

impl PixelState {
    /// One mode per pixel centred on the seed frame
    fn seed(frame: &RgbImage) -> Self {
        let (width, height) = frame.dimensions();
        let mut modes = Array3::<f32>::zeros((
            height as usize,
            width as usize,
            MAX_MODES * MODE_STRIDE,
        ));
        for (mut lane, pixel) in modes.lanes_mut(Axis(2)).into_iter().zip(frame.pixels()) {
            lane[0] = 1.0;
            lane[1] = VAR_INIT;
            for c in 0..3 {
                lane[2 + c] = pixel[c] as f32;
            }
        }

        Self {
            modes,
            used: Array2::ones((height as usize, width as usize)),
        }
    }

    fn dimensions(&self) -> (u32, u32) {
        let (height, width) = self.used.dim();
        (width as u32, height as u32)
    }
}

/// Adaptive Gaussian-mixture background model with shadow labelling
///
/// Every pixel carries up to five RGB Gaussians. Modes that together hold
/// most of the weight describe the background; a pixel none of them explain
/// is foreground, unless it looks like a darkened copy of a background mode,
/// in which case it is shadow.
///
/// The first frame after creation or reset seeds the model and is labelled
/// entirely background. A frame of a different size resets the model.
pub struct GaussianMixtureModel {
    history: u32,
    shadow_threshold: f32,
    detect_shadows: bool,
    state: Option<PixelState>,
    frames: u64,
}

impl GaussianMixtureModel {
    /// Create a model
    ///
    /// # Arguments
    /// * `history` - Frames after which old observations have faded out
    /// * `shadow_threshold` - Lowest brightness ratio, in [0, 1], still labelled shadow
    pub fn new(history: u32, shadow_threshold: f32) -> Result<Self> {
        ensure!(history > 0, "history must be at least 1 frame");
        ensure!(
            (0.0..=1.0).contains(&shadow_threshold),
            "shadow threshold {} outside [0, 1]",
            shadow_threshold
        );

        Ok(Self {
            history,
            shadow_threshold,
            detect_shadows: true,
            state: None,
            frames: 0,
        })
    }

    /// Label would-be shadow pixels as foreground instead
    pub fn without_shadows(mut self) -> Self {
        self.detect_shadows = false;
        self
    }

    fn learning_rate(&self) -> f32 {
        1.0 / (2 * self.frames).min(self.history as u64) as f32
    }
}

impl BackgroundModel for GaussianMixtureModel {
    fn apply(&mut self, frame: &RgbImage) -> Result<LabelMask> {
        let _span = tracing::debug_span!("gmm_apply").entered();

        let (width, height) = frame.dimensions();
        ensure!(width > 0 && height > 0, "cannot model an empty frame");

        if let Some(state) = &self.state {
            if state.dimensions() != (width, height) {
                tracing::debug!(
                    "Frame size changed from {:?} to {}x{}, resetting model",
                    state.dimensions(),
                    width,
                    height
                );
                self.reset_state();
            }
        }

        self.frames += 1;
        let alpha = self.learning_rate();
        let shadow_threshold = self.detect_shadows.then_some(self.shadow_threshold);

        let state = match self.state.as_mut() {
            Some(state) => state,
            None => {
                self.state = Some(PixelState::seed(frame));
                return Ok(GrayImage::from_pixel(width, height, Luma([BACKGROUND])));
            }
        };

        let mut mask = GrayImage::new(width, height);
        let pixels = state
            .modes
            .lanes_mut(Axis(2))
            .into_iter()
            .zip(state.used.iter_mut())
            .zip(frame.pixels())
            .zip(mask.pixels_mut());

        for (((lane, used), pixel), label) in pixels {
            let sample = [pixel[0] as f32, pixel[1] as f32, pixel[2] as f32];
            label[0] = update_pixel(lane, used, sample, alpha, shadow_threshold);
        }

        Ok(mask)
    }

    fn reset_state(&mut self) {
        tracing::debug!("Resetting background model");
        self.state = None;
        self.frames = 0;
    }

    fn frames_seen(&self) -> u64 {
        self.frames
    }
}

fn update_pixel(
    mut lane: ArrayViewMut1<f32>,
    used: &mut u8,
    sample: [f32; 3],
    alpha: f32,
    shadow_threshold: Option<f32>,
) -> u8 {
    let mut modes = [Mode::default(); MAX_MODES];
    let mut count = *used as usize;
    for (m, mode) in modes.iter_mut().enumerate().take(count) {
        let base = m * MODE_STRIDE;
        mode.weight = lane[base];
        mode.variance = lane[base + 1];
        mode.mean = [lane[base + 2], lane[base + 3], lane[base + 4]];
    }

    let background = learn(&mut modes, &mut count, sample, alpha);

    for (m, mode) in modes.iter().enumerate().take(count) {
        let base = m * MODE_STRIDE;
        lane[base] = mode.weight;
        lane[base + 1] = mode.variance;
        for c in 0..3 {
            lane[base + 2 + c] = mode.mean[c];
        }
    }
    *used = count as u8;

    if background {
        BACKGROUND
    } else if shadow_threshold.is_some_and(|tau| is_shadow(&modes[..count], sample, tau)) {
        SHADOW
    } else {
        FOREGROUND
    }
}

/// Fold one sample into a pixel's mixture. Returns whether the sample is background.
fn learn(modes: &mut [Mode; MAX_MODES], count: &mut usize, sample: [f32; 3], alpha: f32) -> bool {
    let prune = -alpha * COMPLEXITY_PRIOR;
    let keep = 1.0 - alpha;

    let mut background = false;
    let mut fits = false;
    let mut total_weight = 0.0;

    for mode in 0..*count {
        let mut weight = keep * modes[mode].weight + prune;
        let mut slot = mode;

        if !fits {
            let variance = modes[mode].variance;
            let diff = [
                modes[mode].mean[0] - sample[0],
                modes[mode].mean[1] - sample[1],
                modes[mode].mean[2] - sample[2],
            ];
            let dist2: f32 = diff.iter().map(|d| d * d).sum();

            if total_weight < BACKGROUND_RATIO && dist2 < VAR_THRESHOLD * variance {
                background = true;
            }

            if dist2 < VAR_THRESHOLD_GEN * variance {
                fits = true;
                weight += alpha;
                let k = alpha / weight;
                for (mean, d) in modes[mode].mean.iter_mut().zip(diff) {
                    *mean -= k * d;
                }
                modes[mode].variance = (variance + k * (dist2 - variance)).clamp(VAR_MIN, VAR_MAX);

                // Keep modes sorted by weight, heaviest first
                while slot > 0 && weight >= modes[slot - 1].weight {
                    modes.swap(slot, slot - 1);
                    slot -= 1;
                }
            }
        }

        if weight < -prune {
            weight = 0.0;
        }
        modes[slot].weight = weight;
        total_weight += weight;
    }

    // Drop pruned modes, preserving order
    let mut kept = 0;
    for m in 0..*count {
        if modes[m].weight > 0.0 {
            modes[kept] = modes[m];
            kept += 1;
        }
    }
    if total_weight > 0.0 {
        for mode in modes.iter_mut().take(kept) {
            mode.weight /= total_weight;
        }
    }

    if !fits && alpha > 0.0 {
        let slot = if kept == MAX_MODES {
            MAX_MODES - 1
        } else {
            kept += 1;
            kept - 1
        };

        if kept == 1 {
            modes[slot].weight = 1.0;
        } else {
            modes[slot].weight = alpha;
            for mode in modes.iter_mut().take(kept - 1) {
                mode.weight *= keep;
            }
        }
        modes[slot].mean = sample;
        modes[slot].variance = VAR_INIT;

        let mut i = slot;
        while i > 0 && alpha >= modes[i - 1].weight {
            modes.swap(i, i - 1);
            i -= 1;
        }
    }

    *count = kept;
    background
}

/// A pixel is shadow when it is a uniformly darkened copy of a background
/// mode, darkened by no more than `shadow_threshold`.
fn is_shadow(modes: &[Mode], sample: [f32; 3], shadow_threshold: f32) -> bool {
    let mut total_weight = 0.0;
    for mode in modes {
        let numerator: f32 = mode.mean.iter().zip(sample).map(|(m, s)| m * s).sum();
        let denominator: f32 = mode.mean.iter().map(|m| m * m).sum();
        if denominator == 0.0 {
            return false;
        }

        if numerator <= denominator && numerator >= shadow_threshold * denominator {
            let a = numerator / denominator;
            let dist2: f32 = mode
                .mean
                .iter()
                .zip(sample)
                .map(|(m, s)| (a * m - s).powi(2))
                .sum();
            if dist2 < VAR_THRESHOLD * mode.variance * a * a {
                return true;
            }
        }

        total_weight += mode.weight;
        if total_weight > BACKGROUND_RATIO {
            return false;
        }
    }
    false
}
