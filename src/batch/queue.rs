use super::{convert_file, find_inputs, list_subdirs, ConvertJob, Converter};
use anyhow::{Context, Result};
use rayon::prelude::*;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueReport {
    pub directories: usize,
    pub converted: usize,
    pub failed: usize,
}

/// Convert every source subdirectory in one process with a worker pool
///
/// Used instead of array tasks when no scheduler is available. Files are
/// independent: a failed conversion is counted and the rest continue.
pub fn run_queue(job: &ConvertJob, workers: usize, converter: &dyn Converter) -> Result<QueueReport> {
    let dirs = list_subdirs(&job.source_root)?;
    job.warn_on_count_mismatch(dirs.len());

    let mut work: Vec<(PathBuf, PathBuf)> = Vec::new();
    for dir in &dirs {
        for input in find_inputs(dir, &job.extension)? {
            let output = job.output_path(dir, &input);
            work.push((input, output));
        }
    }
    tracing::info!(
        "Converting {} files from {} directories with {} workers",
        work.len(),
        dirs.len(),
        workers
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .context("Failed to build conversion worker pool")?;
    let converted = pool.install(|| {
        work.par_iter()
            .filter(|(input, output)| convert_file(converter, input, output))
            .count()
    });

    Ok(QueueReport {
        directories: dirs.len(),
        converted,
        failed: work.len() - converted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::tests::{three_sessions, FakeConverter};
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[test]
    fn converts_all_directories() {
        let tmp = TempDir::new().unwrap();
        let job = three_sessions(&tmp);
        let converter = FakeConverter::new();

        let report = run_queue(&job, 2, &converter).unwrap();
        assert_eq!(
            report,
            QueueReport {
                directories: 3,
                converted: 4,
                failed: 0,
            }
        );
        assert!(job.dest_root.join("session_a/nested/deep.csv").exists());
        assert!(job.dest_root.join("session_b/fly1.csv").exists());
        assert!(!job.dest_root.join("session_c").exists());
    }

    #[test]
    fn failures_are_counted_not_fatal() {
        let tmp = TempDir::new().unwrap();
        let job = three_sessions(&tmp);
        let converter = FakeConverter {
            calls: Mutex::new(Vec::new()),
            fail_on: Some("fly1.slp"),
        };

        let report = run_queue(&job, 3, &converter).unwrap();
        assert_eq!(report.converted, 2);
        assert_eq!(report.failed, 2);
        assert_eq!(converter.calls.lock().unwrap().len(), 4);
    }
}
