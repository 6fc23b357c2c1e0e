use crate::segmentation::FrameDetection;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_line_segment_mut;
use imageproc::point::Point;

pub const FLY_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const SHADOW_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Copy of `frame` with the shadow and fly outlines drawn on top
pub fn draw_detection(frame: &RgbImage, detection: &FrameDetection) -> RgbImage {
    let _span = tracing::debug_span!("annotate").entered();

    let mut canvas = frame.clone();
    if let Some(shadow) = &detection.shadow {
        draw_contour(&mut canvas, &shadow.contour, SHADOW_COLOR);
    }
    if let Some(fly) = &detection.fly {
        draw_contour(&mut canvas, &fly.contour, FLY_COLOR);
    }
    canvas
}

fn draw_contour(canvas: &mut RgbImage, contour: &[Point<i32>], color: Rgb<u8>) {
    match contour {
        [] => {}
        [p] => {
            if p.x >= 0 && p.y >= 0 && (p.x as u32) < canvas.width() && (p.y as u32) < canvas.height()
            {
                canvas.put_pixel(p.x as u32, p.y as u32, color);
            }
        }
        _ => {
            for (a, b) in contour.iter().zip(contour.iter().cycle().skip(1)) {
                draw_line_segment_mut(
                    canvas,
                    (a.x as f32, a.y as f32),
                    (b.x as f32, b.y as f32),
                    color,
                );
            }
        }
    }
}

/// Output size for a frame of `resolution` shown at `scale`, at least 1x1
pub fn display_size(resolution: (u32, u32), scale: f32) -> (u32, u32) {
    let scaled = |v: u32| ((v as f32 * scale).round() as u32).max(1);
    (scaled(resolution.0), scaled(resolution.1))
}

/// Resize a frame for display
pub fn scale_for_display(frame: &RgbImage, scale: f32) -> RgbImage {
    let (width, height) = display_size(frame.dimensions(), scale);
    if (width, height) == frame.dimensions() {
        return frame.clone();
    }
    imageops::resize(frame, width, height, FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmentation::Region;
    use crate::test_utils::solid_frame;

    fn square_region(x: i32, y: i32, size: i32) -> Region {
        let mut contour = Vec::new();
        for i in 0..size {
            contour.push(Point::new(x + i, y));
        }
        for i in 1..size {
            contour.push(Point::new(x + size - 1, y + i));
        }
        for i in (0..size - 1).rev() {
            contour.push(Point::new(x + i, y + size - 1));
        }
        for i in (1..size - 1).rev() {
            contour.push(Point::new(x, y + i));
        }
        Region {
            area: (size * size) as f64,
            contour,
        }
    }

    #[test]
    fn outlines_use_class_colors() {
        let frame = solid_frame(50, 50, [0, 0, 0]);
        let detection = FrameDetection {
            fly: Some(square_region(5, 5, 10)),
            shadow: Some(square_region(30, 30, 10)),
        };

        let canvas = draw_detection(&frame, &detection);
        assert_eq!(*canvas.get_pixel(5, 5), FLY_COLOR);
        assert_eq!(*canvas.get_pixel(14, 10), FLY_COLOR);
        assert_eq!(*canvas.get_pixel(30, 39), SHADOW_COLOR);
        // Interior untouched
        assert_eq!(canvas.get_pixel(10, 10).0, [0, 0, 0]);
        // Source frame untouched
        assert_eq!(frame.get_pixel(5, 5).0, [0, 0, 0]);
    }

    #[test]
    fn empty_detection_leaves_frame_unchanged() {
        let frame = solid_frame(20, 10, [7, 8, 9]);
        assert_eq!(draw_detection(&frame, &FrameDetection::default()), frame);
    }

    #[test]
    fn scaling_matches_display_factor() {
        let frame = solid_frame(1280, 720, [1, 2, 3]);
        let scaled = scale_for_display(&frame, 0.3);
        assert_eq!(scaled.dimensions(), (384, 216));
        assert_eq!(scale_for_display(&frame, 1.0).dimensions(), (1280, 720));
        assert_eq!(display_size((2, 2), 0.1), (1, 1));
    }
}
