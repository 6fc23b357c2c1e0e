mod batch;
mod capture;
mod config;
mod output;
mod pipeline;
mod segmentation;
mod stimulus;
#[cfg(test)]
mod test_utils;

use anyhow::{bail, Context, Result};
use batch::{ConvertError, ConvertJob, ExternalConverter};
use clap::{Args, Parser, Subcommand};
use config::DetectConfig;
use output::annotate::display_size;
use output::{DetectionWriter, FrameDirOutput, OutputSink, V4L2Output};
use pipeline::{CancelToken, PipelineOptions, StopReason};
use std::path::{Path, PathBuf};
use stimulus::HeadingTable;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Detect the fly and its shadow in every video of an experiment
    Detect(DetectArgs),
    /// Convert pose-tracking projects to CSV, one directory per array task
    Convert(ConvertArgs),
    /// Extract per-object stimulus headings from tracking archives
    StimHeading(StimHeadingArgs),
}

#[derive(Args, Debug)]
struct DetectArgs {
    /// Videos or frame directories to process instead of the configured pattern
    inputs: Vec<PathBuf>,

    /// TOML file with detection settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Root directory holding the experiment folders
    #[arg(long)]
    base_path: Option<PathBuf>,

    /// Experiment folder under the base path
    #[arg(short, long)]
    experiment: Option<String>,

    /// Video file pattern inside the experiment folder
    #[arg(long)]
    glob: Option<String>,

    /// Scale of the annotated view
    #[arg(long)]
    display_scale: Option<f32>,

    /// Background model history in frames
    #[arg(long)]
    history: Option<u32>,

    /// Lowest brightness ratio still counted as shadow
    #[arg(long)]
    shadow_threshold: Option<f32>,

    /// Smallest region area reported, in pixels
    #[arg(long)]
    min_area: Option<f64>,

    /// Report shadow pixels as foreground
    #[arg(long)]
    no_shadows: bool,

    /// Show annotated frames on a v4l2loopback device
    #[arg(short, long, conflicts_with = "frames_dir")]
    output_device: Option<PathBuf>,

    /// Write annotated frames as PNGs, one subdirectory per video
    #[arg(long)]
    frames_dir: Option<PathBuf>,

    /// Write per-frame detections to this CSV file
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Pace the annotated view to this many frames per second
    #[arg(long)]
    fps: Option<u32>,
}

impl DetectArgs {
    /// Config file (or defaults) with explicit flags applied on top
    fn resolve_config(&self) -> Result<DetectConfig> {
        let mut config = match &self.config {
            Some(path) => DetectConfig::load(path)?,
            None => DetectConfig::default(),
        };

        if let Some(base_path) = &self.base_path {
            config.base_path = base_path.clone();
        }
        if let Some(experiment) = &self.experiment {
            config.experiment_folder = experiment.clone();
        }
        if let Some(glob) = &self.glob {
            config.glob_pattern = glob.clone();
        }
        if let Some(scale) = self.display_scale {
            config.display_scale = scale;
        }
        if let Some(history) = self.history {
            config.history = history;
        }
        if let Some(threshold) = self.shadow_threshold {
            config.shadow_threshold = threshold;
        }
        if let Some(min_area) = self.min_area {
            config.min_area = min_area;
        }
        if self.no_shadows {
            config.detect_shadows = false;
        }

        config.validate().context("Invalid detection settings")?;
        Ok(config)
    }

    fn open_sink(&self, video: &Path, resolution: (u32, u32), scale: f32) -> Result<Option<Box<dyn OutputSink>>> {
        let (width, height) = display_size(resolution, scale);
        if let Some(device) = &self.output_device {
            let sink = V4L2Output::new(device, width, height)
                .context("Failed to initialize v4l2loopback output")?;
            return Ok(Some(Box::new(sink)));
        }
        if let Some(frames_dir) = &self.frames_dir {
            let name = video.file_stem().unwrap_or(video.as_os_str());
            let sink = FrameDirOutput::new(frames_dir.join(name), width, height)?;
            return Ok(Some(Box::new(sink)));
        }
        Ok(None)
    }
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// Directory with one subdirectory per session
    source_root: PathBuf,

    /// Directory receiving the mirrored CSV tree
    dest_root: PathBuf,

    /// Array task index selecting the subdirectory to convert
    #[arg(long, env = "SLURM_ARRAY_TASK_ID")]
    task_index: Option<usize>,

    /// Number of array tasks the job was submitted with
    #[arg(long, default_value_t = 36)]
    array_size: usize,

    /// Convert every subdirectory in this process, ignoring any task index
    #[arg(long)]
    all: bool,

    /// Worker threads for --all (0 = one per CPU)
    #[arg(long, default_value_t = 0)]
    workers: usize,

    /// Conversion program
    #[arg(long, default_value = batch::DEFAULT_PROGRAM)]
    converter: String,

    /// Conversion arguments, with {input} and {output} placeholders
    #[arg(long, default_value = batch::DEFAULT_ARGS, allow_hyphen_values = true)]
    converter_args: String,

    /// Extension of the project files to convert
    #[arg(long, default_value = "slp")]
    extension: String,
}

#[derive(Args, Debug)]
struct StimHeadingArgs {
    /// Tracking archive, or a directory of archives
    input: PathBuf,

    /// Directory where heading CSVs are written
    output: PathBuf,

    /// CSV with `screen,heading` columns replacing the built-in table
    #[arg(long, alias = "screen2heading-path")]
    heading_table: Option<PathBuf>,

    /// Also search subdirectories for archives
    #[arg(long)]
    recursive: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    match cli.command {
        Command::Detect(args) => detect(args),
        Command::Convert(args) => convert(args),
        Command::StimHeading(args) => stim_heading(args),
    }
}

fn detect(args: DetectArgs) -> Result<()> {
    let config = args.resolve_config()?;
    tracing::info!("Flyscope detection starting");
    tracing::info!(
        "History: {} frames, shadow threshold: {}, min area: {}",
        config.history,
        config.shadow_threshold,
        config.min_area
    );

    let videos = if args.inputs.is_empty() {
        capture::discover_videos(&config)?
    } else {
        args.inputs.clone()
    };
    if videos.is_empty() {
        return Ok(());
    }

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        tracing::info!("Stop requested, finishing current frame");
        handler_token.cancel();
    })
    .context("Failed to install Ctrl+C handler")?;
    tracing::info!("Press Ctrl+C to stop");

    let mut writer = args.csv.as_deref().map(DetectionWriter::create).transpose()?;
    let options = PipelineOptions {
        display_scale: config.display_scale,
        fps: args.fps,
    };

    let mut failed = 0usize;
    for video in &videos {
        let name = video.display().to_string();
        match detect_video(&args, &config, video, &name, writer.as_mut(), &options, &cancel) {
            Ok(StopReason::EndOfStream) => {}
            Ok(StopReason::Cancelled) => {
                tracing::info!("Stopped during {}", name);
                break;
            }
            Err(e) => {
                tracing::error!("Failed to process {}: {:#}", name, e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} videos failed", failed, videos.len());
    }
    Ok(())
}

/// One video in isolation: its own source, model and sink
fn detect_video(
    args: &DetectArgs,
    config: &DetectConfig,
    video: &Path,
    name: &str,
    writer: Option<&mut DetectionWriter>,
    options: &PipelineOptions,
    cancel: &CancelToken,
) -> Result<StopReason> {
    let mut source = capture::open_source(video)?;
    let mut detector = segmentation::create_default_detector(config)?;
    let mut sink = args.open_sink(video, source.resolution(), config.display_scale)?;

    let summary = pipeline::run_video(
        name,
        source.as_mut(),
        &mut detector,
        sink.as_deref_mut(),
        writer,
        options,
        cancel,
    )?;
    tracing::debug!("Background model absorbed {} frames", detector.frames_seen());
    Ok(summary.stop)
}

fn convert(args: ConvertArgs) -> Result<()> {
    let job = ConvertJob {
        source_root: args.source_root,
        dest_root: args.dest_root,
        array_size: args.array_size,
        extension: args.extension,
    };
    let converter = ExternalConverter::from_template(args.converter, &args.converter_args);
    tracing::info!(
        "Converting {} to {} with {}",
        job.source_root.display(),
        job.dest_root.display(),
        converter.program()
    );

    let failed = if args.all {
        let report = batch::run_queue(&job, args.workers, &converter)?;
        tracing::info!(
            "Finished {} directories: {} converted, {} failed",
            report.directories,
            report.converted,
            report.failed
        );
        report.failed
    } else {
        let Some(index) = args.task_index else {
            bail!("No task index: pass --task-index, set SLURM_ARRAY_TASK_ID, or use --all");
        };
        match batch::run_array_task(&job, index, &converter) {
            Ok(report) => {
                tracing::info!(
                    "Finished {}: {} converted, {} failed",
                    report.directory.display(),
                    report.converted,
                    report.failed
                );
                report.failed
            }
            Err(e) => {
                if let Some(ConvertError::TaskOutOfRange { index, count }) = e.downcast_ref::<ConvertError>() {
                    tracing::error!("Task index {} is out of range, only {} directories found", index, count);
                }
                return Err(e);
            }
        }
    };

    if failed > 0 {
        bail!("{} files failed to convert", failed);
    }
    Ok(())
}

fn stim_heading(args: StimHeadingArgs) -> Result<()> {
    let table = match &args.heading_table {
        Some(path) => HeadingTable::load(path)?,
        None => HeadingTable::default(),
    };
    let report = stimulus::process_path(&args.input, &args.output, args.recursive, &table)?;
    if report.written.is_empty() && report.failed > 0 {
        bail!("No archive could be read");
    }
    Ok(())
}
