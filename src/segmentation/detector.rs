use super::regions::{largest_region, split_mask};
use super::types::{BackgroundModel, FrameDetection};
use anyhow::Result;
use image::RgbImage;

/// Finds the fly and its shadow in successive frames of one video
///
/// Owns the background model, so a detector must not be shared between
/// videos. Create a fresh one per video.
pub struct FrameDetector<M: BackgroundModel> {
    model: M,
    min_area: f64,
}

impl<M: BackgroundModel> FrameDetector<M> {
    pub fn new(model: M, min_area: f64) -> Self {
        Self { model, min_area }
    }

    /// Update the background with `frame` and pick the largest fly and
    /// shadow regions, each dropped when smaller than the minimum area
    pub fn classify(&mut self, frame: &RgbImage) -> Result<FrameDetection> {
        let _span = tracing::debug_span!("classify").entered();

        let labels = self.model.apply(frame)?;
        let (shadow_mask, fly_mask) = split_mask(&labels);

        Ok(FrameDetection {
            fly: largest_region(&fly_mask, self.min_area),
            shadow: largest_region(&shadow_mask, self.min_area),
        })
    }

    pub fn frames_seen(&self) -> u64 {
        self.model.frames_seen()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmentation::mog2::GaussianMixtureModel;
    use crate::segmentation::types::{LabelMask, FOREGROUND, SHADOW};
    use crate::test_utils::{fill_rect, moving_square_video, solid_frame, static_video};
    use image::{GrayImage, Luma};

    fn reference_detector() -> FrameDetector<GaussianMixtureModel> {
        FrameDetector::new(GaussianMixtureModel::new(100, 0.75).unwrap(), 100.0)
    }

    /// Replays canned label masks
    struct ScriptedModel {
        masks: Vec<LabelMask>,
        frames: u64,
    }

    impl BackgroundModel for ScriptedModel {
        fn apply(&mut self, _frame: &RgbImage) -> Result<LabelMask> {
            let mask = self.masks[self.frames as usize].clone();
            self.frames += 1;
            Ok(mask)
        }

        fn reset_state(&mut self) {
            self.frames = 0;
        }

        fn frames_seen(&self) -> u64 {
            self.frames
        }
    }

    fn labels_with(rects: &[(u32, u32, u32, u32, u8)]) -> LabelMask {
        let mut mask = GrayImage::new(80, 80);
        for &(x, y, w, h, value) in rects {
            for py in y..y + h {
                for px in x..x + w {
                    mask.put_pixel(px, py, Luma([value]));
                }
            }
        }
        mask
    }

    #[test]
    fn fly_on_left_edge_is_detected() {
        let model = ScriptedModel {
            masks: vec![labels_with(&[(0, 30, 20, 20, FOREGROUND), (0, 0, 15, 15, SHADOW)])],
            frames: 0,
        };
        let mut detector = FrameDetector::new(model, 100.0);

        let found = detector.classify(&solid_frame(80, 80, [0, 0, 0])).unwrap();
        let fly = found.fly.unwrap();
        assert_eq!(fly.area, 400.0);
        assert_eq!(fly.bounding_box(), (0, 30, 19, 49));
        assert_eq!(found.shadow.map(|r| r.area), Some(225.0));
    }

    #[test]
    fn classes_are_judged_independently() {
        let model = ScriptedModel {
            masks: vec![
                labels_with(&[(0, 0, 20, 20, FOREGROUND), (40, 40, 5, 5, SHADOW)]),
                labels_with(&[(0, 0, 5, 5, FOREGROUND), (40, 40, 15, 15, SHADOW)]),
                labels_with(&[]),
            ],
            frames: 0,
        };
        let mut detector = FrameDetector::new(model, 100.0);
        let frame = solid_frame(80, 80, [0, 0, 0]);

        let first = detector.classify(&frame).unwrap();
        assert_eq!(first.fly.map(|r| r.area), Some(400.0));
        assert!(first.shadow.is_none());

        let second = detector.classify(&frame).unwrap();
        assert!(second.fly.is_none());
        assert_eq!(second.shadow.map(|r| r.area), Some(225.0));

        let third = detector.classify(&frame).unwrap();
        assert!(third.is_empty());
        assert_eq!(detector.frames_seen(), 3);
    }

    #[test]
    fn moving_square_is_tracked_after_warmup() {
        let mut detector = reference_detector();
        let frames = moving_square_video(150, 5);

        for (index, frame) in frames.iter().enumerate() {
            let detection = detector.classify(frame).unwrap();
            if index < 100 {
                continue;
            }

            let fly = detection
                .fly
                .unwrap_or_else(|| panic!("no fly in frame {index}"));
            assert!(
                (fly.area - 400.0).abs() <= 40.0,
                "frame {index}: fly area {}",
                fly.area
            );
            let (x0, _, _, _) = fly.bounding_box();
            assert_eq!(x0 as usize, index * 5);
            assert!(detection.shadow.is_none(), "shadow in frame {index}");
        }
    }

    #[test]
    fn static_video_reports_nothing() {
        let mut detector = reference_detector();
        for frame in static_video(50) {
            assert!(detector.classify(&frame).unwrap().is_empty());
        }
    }

    #[test]
    fn runs_are_deterministic() {
        let frames = moving_square_video(120, 5);
        let mut a = reference_detector();
        let mut b = reference_detector();
        for frame in &frames {
            assert_eq!(a.classify(frame).unwrap(), b.classify(frame).unwrap());
        }
    }

    #[test]
    fn fresh_detector_ignores_previous_video() {
        let video_a = moving_square_video(60, 5);
        let mut video_b = static_video(40);
        for frame in video_b.iter_mut().skip(20) {
            fill_rect(frame, 2, 2, 12, 12, [250, 250, 250]);
        }

        let mut baseline = reference_detector();
        let expected: Vec<_> = video_b
            .iter()
            .map(|f| baseline.classify(f).unwrap())
            .collect();

        let mut first = reference_detector();
        for frame in &video_a {
            first.classify(frame).unwrap();
        }
        let mut second = reference_detector();
        let actual: Vec<_> = video_b
            .iter()
            .map(|f| second.classify(f).unwrap())
            .collect();

        assert_eq!(actual, expected);
        assert!(expected[21].fly.is_some());
    }

    #[test]
    fn reset_matches_fresh_detector() {
        let video = static_video(10);
        let mut fresh = reference_detector();
        let mut reused = reference_detector();
        for frame in moving_square_video(30, 5) {
            reused.classify(&frame).unwrap();
        }
        reused.model.reset_state();

        for frame in &video {
            assert_eq!(
                reused.classify(frame).unwrap(),
                fresh.classify(frame).unwrap()
            );
        }
    }
}
