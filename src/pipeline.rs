use crate::capture::CaptureSource;
use crate::output::annotate::{draw_detection, scale_for_display};
use crate::output::{DetectionWriter, OutputSink};
use crate::segmentation::{BackgroundModel, FrameDetection, FrameDetector};
use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Why a video's frame loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndOfStream,
    Cancelled,
}

/// What one frame produced
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    Detected(FrameDetection),
    Absent,
}

impl From<FrameDetection> for FrameOutcome {
    fn from(detection: FrameDetection) -> Self {
        if detection.is_empty() {
            FrameOutcome::Absent
        } else {
            FrameOutcome::Detected(detection)
        }
    }
}

/// Cooperative stop flag shared with a signal handler
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub display_scale: f32,
    /// Pace output to this rate, for live viewing
    pub fps: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoSummary {
    pub frames: u64,
    pub fly_frames: u64,
    pub shadow_frames: u64,
    pub stop: StopReason,
}

/// Run the detector over every frame of one video
///
/// Frames are handled strictly one at a time. The loop ends when the source
/// runs dry or `cancel` is set; the token is checked before each frame.
pub fn run_video<C, M, O>(
    video: &str,
    capture: &mut C,
    detector: &mut FrameDetector<M>,
    mut output: Option<&mut O>,
    mut detections: Option<&mut DetectionWriter>,
    options: &PipelineOptions,
    cancel: &CancelToken,
) -> Result<VideoSummary>
where
    C: CaptureSource + ?Sized,
    M: BackgroundModel,
    O: OutputSink + ?Sized,
{
    let frame_duration = options
        .fps
        .filter(|fps| *fps > 0)
        .map(|fps| Duration::from_secs_f32(1.0 / fps as f32));

    let mut frame_count = 0u64;
    let mut fly_frames = 0u64;
    let mut shadow_frames = 0u64;
    let mut total_decode_time = Duration::ZERO;
    let mut total_detect_time = Duration::ZERO;
    let mut total_output_time = Duration::ZERO;

    tracing::info!("Processing {}", video);

    let stop = loop {
        if cancel.is_cancelled() {
            break StopReason::Cancelled;
        }
        let loop_start = Instant::now();

        // Decode frame
        let decode_start = Instant::now();
        let Some(frame) = capture
            .next_frame()
            .with_context(|| format!("Failed to decode frame {} of {}", frame_count, video))?
        else {
            break StopReason::EndOfStream;
        };
        total_decode_time += decode_start.elapsed();

        // Detection
        let detect_start = Instant::now();
        let detection = detector
            .classify(&frame)
            .with_context(|| format!("Failed to classify frame {} of {}", frame_count, video))?;
        total_detect_time += detect_start.elapsed();

        if let Some(writer) = detections.as_deref_mut() {
            writer.record(video, frame_count, &detection)?;
        }

        // Display
        if let Some(sink) = output.as_deref_mut() {
            let output_start = Instant::now();
            let annotated =
                scale_for_display(&draw_detection(&frame, &detection), options.display_scale);
            sink.write_frame(&annotated)
                .context("Failed to write frame")?;
            total_output_time += output_start.elapsed();
        }

        if let FrameOutcome::Detected(found) = FrameOutcome::from(detection) {
            fly_frames += found.fly.is_some() as u64;
            shadow_frames += found.shadow.is_some() as u64;
        }
        frame_count += 1;

        // Log stats every 30 frames
        if frame_count % 30 == 0 {
            let avg_decode_ms = total_decode_time.as_secs_f64() * 1000.0 / frame_count as f64;
            let avg_detect_ms = total_detect_time.as_secs_f64() * 1000.0 / frame_count as f64;
            let avg_output_ms = total_output_time.as_secs_f64() * 1000.0 / frame_count as f64;
            let total_ms = avg_decode_ms + avg_detect_ms + avg_output_ms;

            tracing::info!(
                "Frame {}: decode={:.1}ms, detect={:.1}ms, output={:.1}ms, total={:.1}ms, fps={:.1}, fly in {} frames",
                frame_count,
                avg_decode_ms,
                avg_detect_ms,
                avg_output_ms,
                total_ms,
                1000.0 / total_ms.max(f64::EPSILON),
                fly_frames
            );
        }

        // Frame rate limiting
        if let Some(frame_duration) = frame_duration {
            let elapsed = loop_start.elapsed();
            if elapsed < frame_duration {
                std::thread::sleep(frame_duration - elapsed);
            }
        }
    };

    if let Some(writer) = detections {
        writer.flush()?;
    }

    let summary = VideoSummary {
        frames: frame_count,
        fly_frames,
        shadow_frames,
        stop,
    };
    tracing::info!(
        "Finished {}: {} frames, fly in {}, shadow in {}, {:?}",
        video,
        summary.frames,
        summary.fly_frames,
        summary.shadow_frames,
        summary.stop
    );
    Ok(summary)
}
