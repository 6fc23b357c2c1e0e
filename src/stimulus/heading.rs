use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Screen position to heading calibration, measured on the rig
const BUILTIN_TABLE: [(f64, f64); 9] = [
    (0.0, 2.3513283485530456),
    (80.0, 1.2179812647799937),
    (160.0, 0.5031545295746856),
    (240.0, -0.3078141744904855),
    (320.0, -0.8746949393526915),
    (400.0, -1.5019022477483523),
    (480.0, -2.185375561680841),
    (560.0, -3.0123437340031307),
    (640.0, 2.3513283485530456),
];

#[derive(Debug, Deserialize)]
struct TableRow {
    screen: f64,
    heading: f64,
}

/// One calibration point, heading stored as its unit vector
#[derive(Debug, Clone, Copy, PartialEq)]
struct Knot {
    screen: f64,
    cos: f64,
    sin: f64,
}

/// Maps a stimulus screen position to a heading angle in radians
///
/// Headings wrap at +-pi, so the table is interpolated through unit vectors
/// and the result recombined with atan2. Positions outside the table are
/// extrapolated from the nearest segment.
#[derive(Debug, Clone)]
pub struct HeadingTable {
    knots: Vec<Knot>,
}

impl Default for HeadingTable {
    fn default() -> Self {
        Self {
            knots: sorted_knots(BUILTIN_TABLE.iter().copied()),
        }
    }
}

fn sorted_knots(points: impl IntoIterator<Item = (f64, f64)>) -> Vec<Knot> {
    let mut knots: Vec<Knot> = points
        .into_iter()
        .map(|(screen, heading)| Knot {
            screen,
            cos: heading.cos(),
            sin: heading.sin(),
        })
        .collect();
    knots.sort_by(|a, b| a.screen.total_cmp(&b.screen));
    knots
}

impl HeadingTable {
    pub fn from_points(points: impl IntoIterator<Item = (f64, f64)>) -> Result<Self> {
        let knots = sorted_knots(points);
        if knots.len() < 2 {
            bail!("Heading table needs at least two points, got {}", knots.len());
        }
        if knots.iter().any(|k| !k.screen.is_finite()) {
            bail!("Heading table contains a non-finite screen position");
        }
        Ok(Self { knots })
    }

    /// Load a `screen,heading` CSV table
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("Failed to open heading table {}", path.display()))?;
        let rows = reader
            .deserialize::<TableRow>()
            .map(|row| row.map(|r| (r.screen, r.heading)))
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("Failed to parse heading table {}", path.display()))?;
        tracing::info!("Loaded {} heading points from {}", rows.len(), path.display());
        Self::from_points(rows)
    }

    pub fn heading(&self, screen: f64) -> f64 {
        // Segment containing `screen`, or the end segment to extrapolate from
        let upper = self
            .knots
            .partition_point(|k| k.screen < screen)
            .clamp(1, self.knots.len() - 1);
        let a = self.knots[upper - 1];
        let b = self.knots[upper];

        let span = b.screen - a.screen;
        let t = if span == 0.0 { 0.0 } else { (screen - a.screen) / span };
        let x = a.cos + t * (b.cos - a.cos);
        let y = a.sin + t * (b.sin - a.sin);
        y.atan2(x)
    }
}
