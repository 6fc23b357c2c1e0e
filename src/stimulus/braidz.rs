use super::HeadingTable;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Stimulus tables looked up in an archive, first match wins
const STIMULUS_TABLES: [&str; 2] = ["stim.csv", "opto.csv"];

#[derive(Debug, Deserialize)]
struct StimulusRow {
    obj_id: u32,
    frame: u64,
    #[serde(default)]
    stim_position_screen: Option<f64>,
    #[serde(default)]
    heading: Option<f64>,
}

#[derive(Debug, Serialize)]
struct HeadingRow {
    obj_id: u32,
    frame: u64,
    stim_heading: Option<f64>,
}

/// `<name up to the first dot>.csv`
pub fn output_name(archive: &Path) -> String {
    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();
    let stem = name.split('.').next().unwrap_or_default();
    format!("{}.csv", stem)
}

/// Raw bytes of the first stimulus table present in the archive
fn read_stimulus_table(archive_path: &Path) -> Result<Option<(&'static str, Vec<u8>)>> {
    let file = File::open(archive_path)
        .with_context(|| format!("Failed to open {}", archive_path.display()))?;
    let mut archive = zip::ZipArchive::new(file)
        .with_context(|| format!("{} is not a readable archive", archive_path.display()))?;

    for name in STIMULUS_TABLES {
        let mut entry = match archive.by_name(name) {
            Ok(entry) => entry,
            Err(zip::result::ZipError::FileNotFound) => continue,
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read {} from {}", name, archive_path.display())
                })
            }
        };
        let mut data = Vec::new();
        entry
            .read_to_end(&mut data)
            .with_context(|| format!("Failed to read {} from {}", name, archive_path.display()))?;
        return Ok(Some((name, data)));
    }
    Ok(None)
}

/// Write per-object stimulus headings for one tracking archive
///
/// Returns the written file, or `None` when the archive holds no stimulus
/// table. Rows are mapped through `table` from their screen position, or
/// from the `heading` column when the table has no screen position.
pub fn process_braidz(archive_path: &Path, out_dir: &Path, table: &HeadingTable) -> Result<Option<PathBuf>> {
    let Some((name, data)) = read_stimulus_table(archive_path)? else {
        tracing::warn!("No stim or opto data found in {}", archive_path.display());
        return Ok(None);
    };
    tracing::debug!("Using {} from {}", name, archive_path.display());

    let mut reader = csv::Reader::from_reader(data.as_slice());
    let has_screen_position = reader
        .headers()
        .with_context(|| format!("Failed to read {} header", name))?
        .iter()
        .any(|h| h == "stim_position_screen");

    let output_path = out_dir.join(output_name(archive_path));
    let mut writer = csv::Writer::from_path(&output_path)
        .with_context(|| format!("Failed to create {}", output_path.display()))?;

    let mut rows = 0usize;
    for row in reader.deserialize::<StimulusRow>() {
        let row = row.with_context(|| format!("Malformed row in {} of {}", name, archive_path.display()))?;
        let position = if has_screen_position {
            row.stim_position_screen
        } else {
            row.heading
        };
        let stim_heading = position.map(|value| table.heading(value));
        writer.serialize(HeadingRow {
            obj_id: row.obj_id,
            frame: row.frame,
            stim_heading,
        })?;
        rows += 1;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to write {}", output_path.display()))?;

    tracing::info!(
        "Interpolated {} to {} ({} rows)",
        archive_path.display(),
        output_path.display(),
        rows
    );
    Ok(Some(output_path))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    pub(crate) fn write_archive(path: &Path, entries: &[(&str, &str)]) {
        let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
        for (name, contents) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(contents.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    fn read_rows(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn output_name_stops_at_first_dot() {
        assert_eq!(
            output_name(Path::new("/data/20240101_120000.braidz")),
            "20240101_120000.csv"
        );
        assert_eq!(output_name(Path::new("exp.v2.braidz")), "exp.csv");
    }

    #[test]
    fn maps_screen_position_through_table() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("exp1.braidz");
        write_archive(
            &archive,
            &[
                ("kalman_estimates.csv.gz", "ignored"),
                (
                    "stim.csv",
                    "obj_id,frame,stim_position_screen,extra\n3,100,0,x\n3,101,80,y\n",
                ),
            ],
        );

        let out = process_braidz(&archive, tmp.path(), &HeadingTable::default())
            .unwrap()
            .unwrap();
        assert_eq!(out, tmp.path().join("exp1.csv"));

        let rows = read_rows(&out);
        assert_eq!(rows[0], "obj_id,frame,stim_heading");
        assert_eq!(rows.len(), 3);
        let fields: Vec<&str> = rows[2].split(',').collect();
        assert_eq!(&fields[..2], &["3", "101"]);
        let heading: f64 = fields[2].parse().unwrap();
        assert!((heading - 1.2179812647799937).abs() < 1e-9);
    }

    #[test]
    fn falls_back_to_opto_table_and_heading_column() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("opto_run.braidz");
        write_archive(
            &archive,
            &[("opto.csv", "obj_id,frame,heading\n7,5,0.25\n7,6,\n")],
        );

        let out = process_braidz(&archive, tmp.path(), &HeadingTable::default())
            .unwrap()
            .unwrap();
        let rows = read_rows(&out);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2], "7,6,");

        let fields: Vec<&str> = rows[1].split(',').collect();
        assert_eq!(&fields[..2], &["7", "5"]);
        let heading: f64 = fields[2].parse().unwrap();
        assert!((heading - 2.3484925134028436).abs() < 1e-9);
    }

    #[test]
    fn archive_without_stimulus_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("plain.braidz");
        write_archive(&archive, &[("README.md", "no stimulus here")]);

        let out = process_braidz(&archive, tmp.path(), &HeadingTable::default()).unwrap();
        assert!(out.is_none());
        assert!(!tmp.path().join("plain.csv").exists());
    }

    #[test]
    fn corrupt_archive_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("broken.braidz");
        std::fs::write(&archive, b"definitely not a zip").unwrap();
        assert!(process_braidz(&archive, tmp.path(), &HeadingTable::default()).is_err());
    }
}
