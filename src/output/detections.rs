use crate::segmentation::{FrameDetection, Region};
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::path::Path;

#[derive(Debug, Serialize)]
struct DetectionRow<'a> {
    video: &'a str,
    frame: u64,
    fly_area: Option<f64>,
    fly_x: Option<f32>,
    fly_y: Option<f32>,
    shadow_area: Option<f64>,
    shadow_x: Option<f32>,
    shadow_y: Option<f32>,
}

/// Per-frame detection table, one row per frame, absent regions left blank
pub struct DetectionWriter {
    writer: csv::Writer<File>,
}

impl DetectionWriter {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let writer = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create detection file {}", path.display()))?;
        tracing::info!("Writing detections to {}", path.display());
        Ok(Self { writer })
    }

    pub fn record(&mut self, video: &str, frame: u64, detection: &FrameDetection) -> Result<()> {
        let summary = |region: &Option<Region>| match region {
            Some(r) => {
                let (x, y) = r.center();
                (Some(r.area), Some(x), Some(y))
            }
            None => (None, None, None),
        };
        let (fly_area, fly_x, fly_y) = summary(&detection.fly);
        let (shadow_area, shadow_x, shadow_y) = summary(&detection.shadow);

        self.writer
            .serialize(DetectionRow {
                video,
                frame,
                fly_area,
                fly_x,
                fly_y,
                shadow_area,
                shadow_x,
                shadow_y,
            })
            .context("Failed to write detection row")
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().context("Failed to flush detections")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imageproc::point::Point;
    use tempfile::TempDir;

    #[test]
    fn writes_header_and_blank_cells() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("out").join("detections.csv");
        let mut writer = DetectionWriter::create(&path).unwrap();

        let fly = Region {
            contour: vec![Point::new(10, 20), Point::new(30, 20), Point::new(30, 40)],
            area: 150.0,
        };
        writer
            .record(
                "a.mp4",
                0,
                &FrameDetection {
                    fly: Some(fly),
                    shadow: None,
                },
            )
            .unwrap();
        writer.record("a.mp4", 1, &FrameDetection::default()).unwrap();
        writer.flush().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "video,frame,fly_area,fly_x,fly_y,shadow_area,shadow_x,shadow_y",
                "a.mp4,0,150.0,20.0,30.0,,,",
                "a.mp4,1,,,,,,",
            ]
        );
    }
}
