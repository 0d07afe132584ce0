//! Frame preview for the selected recording.
//!
//! Each attached video owns one decode thread. The UI thread issues
//! ticketed frame requests; the worker coalesces to the newest queued
//! request, seeks only when the target is not the next sequential frame,
//! and sends the decoded frame back. The handle never replaces a frame with
//! one from an older ticket.

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::error::Result;

pub mod ffmpeg;
pub mod testing;

pub use ffmpeg::{FfmpegBackend, FfmpegSource};

/// One decoded frame as packed RGB rows.
#[derive(Clone, PartialEq)]
pub struct VideoFrame {
    pub index: usize,
    pub width: usize,
    pub height: usize,
    pub rgb: Arc<[u8]>,
}

impl fmt::Debug for VideoFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoFrame")
            .field("index", &self.index)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

/// A seekable stream of frames. `read_next` yields the frame at the current
/// position and advances by one.
pub trait FrameSource: Send {
    fn frame_count(&self) -> Option<usize>;
    fn seek(&mut self, index: usize) -> Result<()>;
    fn read_next(&mut self) -> Result<VideoFrame>;
}

/// Opens frame sources; fails with `VideoOpen` when the path is unreadable.
pub trait VideoBackend {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>>;
}

enum DecodeCommand {
    Show { ticket: u64, frame: usize },
    Shutdown,
}

struct Decoded {
    ticket: u64,
    result: Result<VideoFrame>,
}

/// Exclusive owner of a decoder thread. Dropping the handle stops the
/// thread and releases the underlying source.
pub struct VideoHandle {
    path: PathBuf,
    frame_count: Option<usize>,
    command_tx: Sender<DecodeCommand>,
    frame_rx: Receiver<Decoded>,
    worker: Option<JoinHandle<()>>,
    issued: u64,
    received: u64,
    shown: u64,
    requested: Option<usize>,
    current: Option<VideoFrame>,
}

impl fmt::Debug for VideoHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoHandle")
            .field("path", &self.path)
            .field("frame_count", &self.frame_count)
            .field("requested", &self.requested)
            .finish()
    }
}

impl VideoHandle {
    pub fn spawn(path: impl Into<PathBuf>, source: Box<dyn FrameSource>) -> Self {
        let (command_tx, command_rx) = unbounded();
        let (frame_tx, frame_rx) = unbounded();
        let frame_count = source.frame_count();
        let worker = std::thread::spawn(move || DecodeWorker::new(source, command_rx, frame_tx).run());
        Self {
            path: path.into(),
            frame_count,
            command_tx,
            frame_rx,
            worker: Some(worker),
            issued: 0,
            received: 0,
            shown: 0,
            requested: None,
            current: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frame_count(&self) -> Option<usize> {
        self.frame_count
    }

    /// Ask for `frame`. Returns false when it is already the requested frame
    /// or lies past the end of the video.
    pub fn request(&mut self, frame: usize) -> bool {
        if self.requested == Some(frame) {
            return false;
        }
        if self.frame_count.is_some_and(|count| frame >= count) {
            return false;
        }
        let ticket = self.issued + 1;
        if self
            .command_tx
            .send(DecodeCommand::Show { ticket, frame })
            .is_err()
        {
            log::warn!("decoder for {} is gone", self.path.display());
            return false;
        }
        self.issued = ticket;
        self.requested = Some(frame);
        true
    }

    /// Forget the last request so the next `request` always goes out, e.g.
    /// when the recording is re-selected and frame 0 should be redrawn.
    pub fn rewind(&mut self) {
        self.requested = None;
    }

    /// Drain finished decodes; returns true when the displayed frame changed.
    pub fn poll(&mut self) -> bool {
        let mut updated = false;
        while let Ok(decoded) = self.frame_rx.try_recv() {
            updated |= self.accept(decoded);
        }
        updated
    }

    /// Block until the newest request has been answered or `timeout` passes.
    pub fn wait_for_latest(&mut self, timeout: Duration) -> Option<&VideoFrame> {
        let deadline = Instant::now() + timeout;
        while self.received < self.issued {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.frame_rx.recv_timeout(remaining) {
                Ok(decoded) => {
                    self.accept(decoded);
                }
                Err(_) => break,
            }
        }
        self.current.as_ref()
    }

    pub fn is_pending(&self) -> bool {
        self.received < self.issued
    }

    pub fn current(&self) -> Option<&VideoFrame> {
        self.current.as_ref()
    }

    fn accept(&mut self, decoded: Decoded) -> bool {
        self.received = self.received.max(decoded.ticket);
        if decoded.ticket <= self.shown {
            return false;
        }
        match decoded.result {
            Ok(frame) => {
                self.shown = decoded.ticket;
                self.current = Some(frame);
                true
            }
            Err(err) => {
                log::warn!("{}: {}", self.path.display(), err);
                false
            }
        }
    }
}

impl Drop for VideoHandle {
    fn drop(&mut self) {
        let _ = self.command_tx.send(DecodeCommand::Shutdown);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

struct DecodeWorker {
    source: Box<dyn FrameSource>,
    commands: Receiver<DecodeCommand>,
    frames: Sender<Decoded>,
    next: Option<usize>,
}

impl DecodeWorker {
    fn new(
        source: Box<dyn FrameSource>,
        commands: Receiver<DecodeCommand>,
        frames: Sender<Decoded>,
    ) -> Self {
        Self {
            source,
            commands,
            frames,
            next: None,
        }
    }

    fn run(mut self) {
        while let Ok(command) = self.commands.recv() {
            let (mut ticket, mut frame) = match command {
                DecodeCommand::Show { ticket, frame } => (ticket, frame),
                DecodeCommand::Shutdown => return,
            };
            // Requests queued behind this one supersede it.
            loop {
                match self.commands.try_recv() {
                    Ok(DecodeCommand::Show {
                        ticket: newer,
                        frame: target,
                    }) => {
                        ticket = newer;
                        frame = target;
                    }
                    Ok(DecodeCommand::Shutdown) => return,
                    Err(_) => break,
                }
            }
            let result = self.decode(frame);
            if self.frames.send(Decoded { ticket, result }).is_err() {
                return;
            }
        }
    }

    fn decode(&mut self, index: usize) -> Result<VideoFrame> {
        if self.next != Some(index) {
            log::debug!("seeking to frame {index}");
            if let Err(err) = self.source.seek(index) {
                self.next = None;
                return Err(err);
            }
        }
        match self.source.read_next() {
            Ok(frame) => {
                self.next = Some(index + 1);
                Ok(frame)
            }
            Err(err) => {
                self.next = None;
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedSource;
    use super::*;

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn sequential_frames_skip_seek() {
        let (source, probe) = ScriptedSource::new(10);
        let mut handle = VideoHandle::spawn("fish.avi", Box::new(source));
        assert!(handle.request(0));
        assert_eq!(handle.wait_for_latest(WAIT).map(|f| f.index), Some(0));
        assert!(handle.request(1));
        assert_eq!(handle.wait_for_latest(WAIT).map(|f| f.index), Some(1));
        assert!(handle.request(5));
        assert_eq!(handle.wait_for_latest(WAIT).map(|f| f.index), Some(5));
        assert_eq!(probe.seeks(), vec![0, 5]);
        assert_eq!(probe.reads(), vec![0, 1, 5]);
    }

    #[test]
    fn repeated_and_out_of_range_requests_are_ignored() {
        let (source, probe) = ScriptedSource::new(3);
        let mut handle = VideoHandle::spawn("fish.avi", Box::new(source));
        assert!(handle.request(2));
        assert!(!handle.request(2));
        assert!(!handle.request(3));
        handle.wait_for_latest(WAIT);
        assert_eq!(probe.reads(), vec![2]);
    }

    #[test]
    fn newest_request_wins() {
        let (source, _probe) = ScriptedSource::new(100);
        let mut handle = VideoHandle::spawn("fish.avi", Box::new(source));
        for frame in [10, 40, 70, 20] {
            handle.request(frame);
        }
        let shown = handle.wait_for_latest(WAIT).map(|f| f.index);
        assert_eq!(shown, Some(20));
        assert!(!handle.is_pending());
        assert!(!handle.poll());
        assert_eq!(handle.current().map(|f| f.index), Some(20));
    }

    #[test]
    fn decode_failure_keeps_previous_frame() {
        let (source, probe) = ScriptedSource::new(5);
        probe.fail_reads_at(3);
        let mut handle = VideoHandle::spawn("fish.avi", Box::new(source));
        handle.request(1);
        handle.wait_for_latest(WAIT);
        handle.request(3);
        assert_eq!(handle.wait_for_latest(WAIT).map(|f| f.index), Some(1));
    }

    #[test]
    fn rewind_allows_redrawing_same_frame() {
        let (source, probe) = ScriptedSource::new(5);
        let mut handle = VideoHandle::spawn("fish.avi", Box::new(source));
        handle.request(0);
        handle.wait_for_latest(WAIT);
        handle.rewind();
        assert!(handle.request(0));
        handle.wait_for_latest(WAIT);
        assert_eq!(probe.seeks(), vec![0, 0]);
    }

    #[test]
    fn drop_releases_source() {
        let (source, probe) = ScriptedSource::new(5);
        let handle = VideoHandle::spawn("fish.avi", Box::new(source));
        assert!(!probe.is_released());
        drop(handle);
        assert!(probe.is_released());
    }
}
