//! In-memory frame sources for exercising the preview without ffmpeg.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{FrameSource, VideoBackend, VideoFrame};
use crate::error::{Result, TailmarkError};

#[derive(Debug, Default)]
struct ProbeState {
    seeks: Vec<usize>,
    reads: Vec<usize>,
    fail_at: Option<usize>,
    released: bool,
}

/// Shared view into what a `ScriptedSource` was asked to do.
#[derive(Debug, Clone, Default)]
pub struct SourceProbe {
    state: Arc<Mutex<ProbeState>>,
}

impl SourceProbe {
    fn lock(&self) -> MutexGuard<'_, ProbeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn seeks(&self) -> Vec<usize> {
        self.lock().seeks.clone()
    }

    pub fn reads(&self) -> Vec<usize> {
        self.lock().reads.clone()
    }

    pub fn is_released(&self) -> bool {
        self.lock().released
    }

    pub fn fail_reads_at(&self, index: usize) {
        self.lock().fail_at = Some(index);
    }
}

/// Produces 2×2 frames whose bytes all equal `index % 256`.
pub struct ScriptedSource {
    frames: usize,
    position: usize,
    probe: SourceProbe,
}

impl ScriptedSource {
    pub fn new(frames: usize) -> (Self, SourceProbe) {
        let probe = SourceProbe::default();
        let source = Self {
            frames,
            position: 0,
            probe: probe.clone(),
        };
        (source, probe)
    }
}

impl FrameSource for ScriptedSource {
    fn frame_count(&self) -> Option<usize> {
        Some(self.frames)
    }

    fn seek(&mut self, index: usize) -> Result<()> {
        if index >= self.frames {
            return Err(TailmarkError::decode(format!("seek past end: {index}")));
        }
        self.probe.lock().seeks.push(index);
        self.position = index;
        Ok(())
    }

    fn read_next(&mut self) -> Result<VideoFrame> {
        let index = self.position;
        let mut state = self.probe.lock();
        if index >= self.frames || state.fail_at == Some(index) {
            return Err(TailmarkError::decode(format!("no frame {index}")));
        }
        state.reads.push(index);
        self.position += 1;
        let value = (index % 256) as u8;
        Ok(VideoFrame {
            index,
            width: 2,
            height: 2,
            rgb: vec![value; 12].into(),
        })
    }
}

impl Drop for ScriptedSource {
    fn drop(&mut self) {
        self.probe.lock().released = true;
    }
}

/// Opens a `ScriptedSource` for any path that exists on disk and has not
/// been marked unreadable.
#[derive(Debug, Clone)]
pub struct ScriptedBackend {
    frames: usize,
    opened: Arc<Mutex<Vec<(PathBuf, SourceProbe)>>>,
    rejected: Arc<Mutex<Vec<PathBuf>>>,
}

impl ScriptedBackend {
    pub fn new(frames: usize) -> Self {
        Self {
            frames,
            opened: Arc::default(),
            rejected: Arc::default(),
        }
    }

    /// Fail every later `open` of `path` as if the container were corrupt.
    pub fn reject(&self, path: impl Into<PathBuf>) {
        self.rejected
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(path.into());
    }

    fn is_rejected(&self, path: &Path) -> bool {
        self.rejected
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .any(|rejected| rejected == path)
    }

    /// Probe for the most recent source opened from `path`.
    pub fn probe(&self, path: &Path) -> Option<SourceProbe> {
        self.opened
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .rev()
            .find(|(opened, _)| opened == path)
            .map(|(_, probe)| probe.clone())
    }

    pub fn opened_paths(&self) -> Vec<PathBuf> {
        self.opened
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(|(path, _)| path.clone())
            .collect()
    }
}

impl VideoBackend for ScriptedBackend {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>> {
        if !path.is_file() {
            return Err(TailmarkError::video_open(path, "file does not exist"));
        }
        if self.is_rejected(path) {
            return Err(TailmarkError::video_open(path, "unreadable container"));
        }
        let (source, probe) = ScriptedSource::new(self.frames);
        self.opened
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((path.to_path_buf(), probe));
        Ok(Box::new(source))
    }
}
