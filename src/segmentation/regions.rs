use super::types::{LabelMask, Region, FOREGROUND, SHADOW};
use image::{imageops, GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType};
use imageproc::point::Point;

/// Split a label mask into binary (0 / 255) shadow and foreground masks
pub fn split_mask(mask: &LabelMask) -> (GrayImage, GrayImage) {
    (class_mask(mask, SHADOW), class_mask(mask, FOREGROUND))
}

fn class_mask(mask: &LabelMask, class: u8) -> GrayImage {
    let (width, height) = mask.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        if mask.get_pixel(x, y)[0] == class {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// Outer boundaries of every top-level region in a binary mask
///
/// Regions nested inside another region's hole are skipped, as are the
/// hole borders themselves.
pub fn external_contours(binary: &GrayImage) -> Vec<Vec<Point<i32>>> {
    // The tracer misreads regions touching column 0 as holes, so trace on a
    // copy with a one pixel empty border and shift the points back
    let (width, height) = binary.dimensions();
    let mut padded = GrayImage::new(width + 2, height + 2);
    imageops::replace(&mut padded, binary, 1, 1);

    find_contours::<i32>(&padded)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .map(|c| {
            c.points
                .into_iter()
                .map(|p| Point::new(p.x - 1, p.y - 1))
                .collect()
        })
        .collect()
}

/// Number of pixels enclosed by a traced boundary, boundary pixels included
///
/// Uses Pick's theorem: the shoelace area of the boundary polygon plus half
/// the boundary steps plus one.
pub fn contour_area(contour: &[Point<i32>]) -> f64 {
    if contour.len() <= 1 {
        return contour.len() as f64;
    }

    let twice_area: i64 = contour
        .iter()
        .zip(contour.iter().cycle().skip(1))
        .map(|(a, b)| a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64)
        .sum();

    twice_area.abs() as f64 / 2.0 + contour.len() as f64 / 2.0 + 1.0
}

/// Largest top-level region of a binary mask, if it reaches `min_area`
///
/// On equal areas the region traced first (raster order) wins.
pub fn largest_region(binary: &GrayImage, min_area: f64) -> Option<Region> {
    let mut best: Option<Region> = None;
    for contour in external_contours(binary) {
        let area = contour_area(&contour);
        if best.as_ref().map_or(true, |b| area > b.area) {
            best = Some(Region { contour, area });
        }
    }
    best.filter(|region| region.area >= min_area)
}
