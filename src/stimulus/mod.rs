//! Per-object stimulus headings from tracking archives.

mod braidz;
mod heading;

pub use braidz::process_braidz;
pub use heading::HeadingTable;

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

const ARCHIVE_EXTENSION: &str = "braidz";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StimulusReport {
    pub written: Vec<PathBuf>,
    pub skipped: usize,
    pub failed: usize,
}

/// Archives to process: the file itself, or those inside a directory
pub fn find_archives(input: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        if input.extension().is_some_and(|ext| ext == ARCHIVE_EXTENSION) {
            return Ok(vec![input.to_path_buf()]);
        }
        bail!("{} is not a .{} file", input.display(), ARCHIVE_EXTENSION);
    }
    if !input.is_dir() {
        bail!("{} is not a valid archive or directory", input.display());
    }

    let prefix = input
        .to_str()
        .with_context(|| format!("Path {} is not valid UTF-8", input.display()))?;
    let prefix = glob::Pattern::escape(prefix);
    let pattern = if recursive {
        format!("{}/**/*.{}", prefix, ARCHIVE_EXTENSION)
    } else {
        format!("{}/*.{}", prefix, ARCHIVE_EXTENSION)
    };

    let mut archives: Vec<PathBuf> = glob::glob(&pattern)
        .with_context(|| format!("Invalid archive pattern {}", pattern))?
        .filter_map(|entry| entry.ok())
        .filter(|path| path.is_file())
        .collect();
    archives.sort();
    Ok(archives)
}

/// Convert every archive found at `input` into `out_dir`
///
/// An archive that cannot be read is logged and skipped; the rest continue.
pub fn process_path(input: &Path, out_dir: &Path, recursive: bool, table: &HeadingTable) -> Result<StimulusReport> {
    let archives = find_archives(input, recursive)?;
    if archives.is_empty() {
        tracing::warn!("No .{} files found in {}", ARCHIVE_EXTENSION, input.display());
        return Ok(StimulusReport::default());
    }

    if !out_dir.exists() {
        std::fs::create_dir_all(out_dir)
            .with_context(|| format!("Failed to create output directory {}", out_dir.display()))?;
        tracing::info!("Created output directory: {}", out_dir.display());
    }

    let mut report = StimulusReport::default();
    for archive in &archives {
        match process_braidz(archive, out_dir, table) {
            Ok(Some(path)) => report.written.push(path),
            Ok(None) => report.skipped += 1,
            Err(e) => {
                tracing::error!("Error reading {}: {:#}", archive.display(), e);
                report.failed += 1;
            }
        }
    }

    tracing::info!(
        "Processing complete: {} written, {} without stimulus, {} failed",
        report.written.len(),
        report.skipped,
        report.failed
    );
    Ok(report)
}
