//! Pose-tracking project conversion, one source subdirectory per array task.
//!
//! The source root holds one subdirectory per recording session. Array task
//! `i` converts every project file under the `i`-th subdirectory (sorted by
//! name) into a CSV at the mirrored location under the destination root.

mod converter;
mod queue;

pub use converter::{Converter, ExternalConverter, DEFAULT_ARGS, DEFAULT_PROGRAM};
pub use queue::{run_queue, QueueReport};

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("task index {index} is outside the {count} discovered directories")]
    TaskOutOfRange { index: usize, count: usize },

    #[error("cannot list source root {path}")]
    SourceRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start converter {program}")]
    ConverterSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("converter failed on {input} ({status}): {stderr}")]
    ConverterFailed {
        input: PathBuf,
        status: String,
        stderr: String,
    },
}

/// Layout of one conversion job
#[derive(Debug, Clone)]
pub struct ConvertJob {
    pub source_root: PathBuf,
    pub dest_root: PathBuf,
    /// Number of array tasks the job was submitted with
    pub array_size: usize,
    /// Extension of project files, without the dot
    pub extension: String,
}

impl ConvertJob {
    /// Mirror of `input` (found under `subdir`) below the destination root
    pub fn output_path(&self, subdir: &Path, input: &Path) -> PathBuf {
        let name = subdir.file_name().unwrap_or(subdir.as_os_str());
        let relative = input.strip_prefix(subdir).unwrap_or(input);
        self.dest_root
            .join(name)
            .join(relative)
            .with_extension("csv")
    }

    /// Warn when the discovered directories do not match the array size.
    /// Returns whether it warned.
    fn warn_on_count_mismatch(&self, found: usize) -> bool {
        let mismatch = found != self.array_size;
        if mismatch {
            tracing::warn!(
                source_root = %self.source_root.display(),
                "found {} directories but the job is configured for {}",
                found,
                self.array_size
            );
        }
        mismatch
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    pub directory: PathBuf,
    pub converted: usize,
    pub failed: usize,
}

/// Immediate subdirectories of `root`, sorted by name
pub fn list_subdirs(root: &Path) -> Result<Vec<PathBuf>, ConvertError> {
    let source_root_error = |source| ConvertError::SourceRoot {
        path: root.to_path_buf(),
        source,
    };

    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(root).map_err(source_root_error)? {
        let path = entry.map_err(source_root_error)?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Project files anywhere below `dir`, sorted. A missing directory has none.
pub fn find_inputs(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        tracing::warn!(path = %dir.display(), "input directory is missing, skipping");
        return Ok(Vec::new());
    }

    let prefix = dir
        .to_str()
        .with_context(|| format!("Path {} is not valid UTF-8", dir.display()))?;
    // Directory names may contain glob metacharacters
    let pattern = format!("{}/**/*.{}", glob::Pattern::escape(prefix), extension);

    let mut inputs: Vec<PathBuf> = glob::glob(&pattern)
        .with_context(|| format!("Invalid input pattern {}", pattern))?
        .filter_map(|entry| entry.ok())
        .filter(|path| path.is_file())
        .collect();
    inputs.sort();
    Ok(inputs)
}

/// Convert one file, creating its destination directory. Returns success.
fn convert_file(converter: &dyn Converter, input: &Path, output: &Path) -> bool {
    if let Some(parent) = output.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!(path = %parent.display(), error = %e, "cannot create output directory");
            return false;
        }
    }

    match converter.convert(input, output) {
        Ok(()) => {
            tracing::info!("Converted {} to {}", input.display(), output.display());
            true
        }
        Err(e) => {
            tracing::warn!(input = %input.display(), error = %e, "conversion failed");
            false
        }
    }
}

/// Convert every project file of one source subdirectory
pub fn convert_directory(job: &ConvertJob, subdir: &Path, converter: &dyn Converter) -> Result<TaskReport> {
    let inputs = find_inputs(subdir, &job.extension)?;
    if inputs.is_empty() {
        tracing::info!("No .{} files in {}", job.extension, subdir.display());
    }

    let mut report = TaskReport {
        directory: subdir.to_path_buf(),
        converted: 0,
        failed: 0,
    };
    for input in &inputs {
        if convert_file(converter, input, &job.output_path(subdir, input)) {
            report.converted += 1;
        } else {
            report.failed += 1;
        }
    }
    Ok(report)
}

/// Run array task `index`: convert the `index`-th source subdirectory
///
/// An index past the discovered directories fails with
/// [`ConvertError::TaskOutOfRange`] before any work is done.
pub fn run_array_task(job: &ConvertJob, index: usize, converter: &dyn Converter) -> Result<TaskReport> {
    let dirs = list_subdirs(&job.source_root)?;
    job.warn_on_count_mismatch(dirs.len());

    let subdir = dirs.get(index).ok_or(ConvertError::TaskOutOfRange {
        index,
        count: dirs.len(),
    })?;
    tracing::info!("Task {} processing {}", index, subdir.display());

    convert_directory(job, subdir, converter)
}
