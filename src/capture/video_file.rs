use super::CaptureSource;
use anyhow::{Context, Result};
use image::RgbImage;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("failed to start {program}")]
    Spawn {
        program: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read video stream of {path}: {reason}")]
    Probe { path: PathBuf, reason: String },
}

/// Decodes a video file through an `ffmpeg` child process
///
/// Frames arrive on the child's stdout as raw RGB24, one exact
/// `width * height * 3` read per frame.
pub struct VideoFileCapture {
    child: Child,
    stdout: Option<ChildStdout>,
    path: PathBuf,
    width: u32,
    height: u32,
    frames_read: u64,
}

impl VideoFileCapture {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let (width, height) = probe_dimensions(path)?;

        tracing::info!(
            "Opening video {} ({}x{})",
            path.display(),
            width,
            height
        );

        let mut child = Command::new("ffmpeg")
            .args(["-v", "error", "-nostdin", "-i"])
            .arg(path)
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| DecodeError::Spawn {
                program: "ffmpeg",
                source,
            })?;
        let stdout = child.stdout.take();

        Ok(Self {
            child,
            stdout,
            path: path.to_path_buf(),
            width,
            height,
            frames_read: 0,
        })
    }

    fn finish(&mut self) {
        self.stdout = None;
        match self.child.wait() {
            Ok(status) if !status.success() => tracing::warn!(
                path = %self.path.display(),
                "decoder exited with {} after {} frames",
                status,
                self.frames_read
            ),
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "failed to reap decoder"),
        }
    }
}

impl CaptureSource for VideoFileCapture {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        let _span = tracing::debug_span!("decode").entered();

        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(None);
        };

        let frame_len = self.width as usize * self.height as usize * 3;
        let mut buffer = vec![0u8; frame_len];
        let mut filled = 0;
        while filled < frame_len {
            match stdout.read(&mut buffer[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Failed to read frame from {}", self.path.display())
                    })
                }
            }
        }

        if filled < frame_len {
            if filled > 0 {
                tracing::warn!(
                    path = %self.path.display(),
                    "dropping truncated trailing frame ({} of {} bytes)",
                    filled,
                    frame_len
                );
            }
            self.finish();
            return Ok(None);
        }

        self.frames_read += 1;
        let frame = RgbImage::from_raw(self.width, self.height, buffer)
            .context("Decoded buffer does not match frame size")?;
        Ok(Some(frame))
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl Drop for VideoFileCapture {
    fn drop(&mut self) {
        if self.stdout.is_some() {
            self.stdout = None;
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

fn probe_dimensions(path: &Path) -> Result<(u32, u32), DecodeError> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height",
            "-of",
            "csv=s=x:p=0",
        ])
        .arg(path)
        .output()
        .map_err(|source| DecodeError::Spawn {
            program: "ffprobe",
            source,
        })?;

    if !output.status.success() {
        return Err(DecodeError::Probe {
            path: path.to_path_buf(),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let text = String::from_utf8_lossy(&output.stdout);
    parse_dimensions(&text).ok_or_else(|| DecodeError::Probe {
        path: path.to_path_buf(),
        reason: format!("unexpected probe output {:?}", text.trim()),
    })
}

/// Parse `ffprobe` csv output such as `1920x1080`
fn parse_dimensions(text: &str) -> Option<(u32, u32)> {
    let line = text.lines().find(|l| !l.trim().is_empty())?;
    let mut parts = line.trim().split('x');
    let width: u32 = parts.next()?.trim().parse().ok()?;
    let height: u32 = parts.next()?.trim().parse().ok()?;
    (width > 0 && height > 0).then_some((width, height))
}
