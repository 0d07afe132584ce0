//! Frame source backed by the ffmpeg command-line tools.
//!
//! `ffprobe` reads the stream geometry when the video is opened. Frames are
//! read from an `ffmpeg` child that pipes raw `rgb24` frames from the last
//! seek position; sequential reads keep consuming the same pipe and a seek
//! restarts the child at the new timestamp.

use anyhow::{anyhow, bail, Context};
use serde::Deserialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};

use super::{FrameSource, VideoBackend, VideoFrame};
use crate::error::{Result, TailmarkError};

#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Default for FfmpegBackend {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".into(),
            ffprobe: "ffprobe".into(),
        }
    }
}

impl VideoBackend for FfmpegBackend {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>> {
        Ok(Box::new(FfmpegSource::open(self, path)?))
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: usize,
    height: usize,
    #[serde(default)]
    avg_frame_rate: Option<String>,
    #[serde(default)]
    r_frame_rate: Option<String>,
    #[serde(default)]
    nb_frames: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
struct StreamInfo {
    width: usize,
    height: usize,
    fps: f64,
    frame_count: Option<usize>,
}

fn parse_probe(json: &str) -> anyhow::Result<StreamInfo> {
    let output: ProbeOutput = serde_json::from_str(json).context("parsing ffprobe output")?;
    let stream = output
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("no video stream found"))?;
    if stream.width == 0 || stream.height == 0 {
        bail!("video stream has no frame size");
    }
    let fps = [stream.avg_frame_rate, stream.r_frame_rate]
        .iter()
        .flatten()
        .find_map(|rate| parse_rate(rate))
        .ok_or_else(|| anyhow!("video stream has no frame rate"))?;
    let frame_count = stream.nb_frames.and_then(|n| n.parse().ok());
    Ok(StreamInfo {
        width: stream.width,
        height: stream.height,
        fps,
        frame_count,
    })
}

/// Parse ffprobe's `num/den` rate notation.
fn parse_rate(rate: &str) -> Option<f64> {
    let (num, den) = match rate.split_once('/') {
        Some((num, den)) => (num.trim().parse::<f64>().ok()?, den.trim().parse::<f64>().ok()?),
        None => (rate.trim().parse::<f64>().ok()?, 1.0),
    };
    let fps = num / den;
    (fps.is_finite() && fps > 0.0).then_some(fps)
}

struct FrameStream {
    child: Child,
    stdout: ChildStdout,
}

impl Drop for FrameStream {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub struct FfmpegSource {
    path: PathBuf,
    ffmpeg: PathBuf,
    info: StreamInfo,
    stream: Option<FrameStream>,
    position: usize,
}

impl FfmpegSource {
    pub fn open(backend: &FfmpegBackend, path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(TailmarkError::video_open(path, "file does not exist"));
        }
        let info = probe(&backend.ffprobe, path)
            .map_err(|err| TailmarkError::video_open(path, format!("{err:#}")))?;
        log::info!(
            "opened video {}: {}x{} @ {:.2} fps, {} frames",
            path.display(),
            info.width,
            info.height,
            info.fps,
            info.frame_count
                .map(|n| n.to_string())
                .unwrap_or_else(|| "unknown".into())
        );
        Ok(Self {
            path: path.to_path_buf(),
            ffmpeg: backend.ffmpeg.clone(),
            info,
            stream: None,
            position: 0,
        })
    }

    pub fn width(&self) -> usize {
        self.info.width
    }

    pub fn height(&self) -> usize {
        self.info.height
    }

    pub fn fps(&self) -> f64 {
        self.info.fps
    }

    fn spawn_stream(&self, index: usize) -> anyhow::Result<FrameStream> {
        let seconds = index as f64 / self.info.fps;
        let mut child = Command::new(&self.ffmpeg)
            .args(["-v", "error", "-ss", &format!("{seconds:.6}"), "-i"])
            .arg(&self.path)
            .args(["-an", "-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("spawning {}", self.ffmpeg.display()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("ffmpeg stdout unavailable"))?;
        Ok(FrameStream { child, stdout })
    }
}

fn probe(ffprobe: &Path, path: &Path) -> anyhow::Result<StreamInfo> {
    let output = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,avg_frame_rate,r_frame_rate,nb_frames",
            "-of",
            "json",
        ])
        .arg(path)
        .output()
        .with_context(|| format!("running {}", ffprobe.display()))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "ffprobe failed: {}",
            stderr.lines().last().unwrap_or("unknown error")
        );
    }
    parse_probe(&String::from_utf8_lossy(&output.stdout))
}

impl FrameSource for FfmpegSource {
    fn frame_count(&self) -> Option<usize> {
        self.info.frame_count
    }

    fn seek(&mut self, index: usize) -> Result<()> {
        self.stream = None;
        let stream = self
            .spawn_stream(index)
            .map_err(|err| TailmarkError::decode(format!("{err:#}")))?;
        self.stream = Some(stream);
        self.position = index;
        Ok(())
    }

    fn read_next(&mut self) -> Result<VideoFrame> {
        if self.stream.is_none() {
            self.seek(self.position)?;
        }
        let len = self.info.width * self.info.height * 3;
        let mut buf = vec![0u8; len];
        let read = match self.stream.as_mut() {
            Some(stream) => stream.stdout.read_exact(&mut buf),
            None => return Err(TailmarkError::decode("ffmpeg stream not running")),
        };
        if let Err(err) = read {
            self.stream = None;
            return Err(TailmarkError::decode(format!(
                "frame {} of {}: {}",
                self.position,
                self.path.display(),
                err
            )));
        }
        let index = self.position;
        self.position += 1;
        Ok(VideoFrame {
            index,
            width: self.info.width,
            height: self.info.height,
            rgb: buf.into(),
        })
    }
}
