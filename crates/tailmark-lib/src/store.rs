use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::Behavior;
use crate::error::{Result, TailmarkError};
use crate::signal::{TailAngles, TimeSeries};
use crate::video::VideoHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RecordingId(u64);

impl fmt::Display for RecordingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Stable interval identity. Overlays point back at intervals through this,
/// never through list position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct IntervalId(u64);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Interval {
    pub id: IntervalId,
    pub label: Behavior,
    pub start: f64,
    pub end: f64,
}

impl Interval {
    /// Closed-range containment.
    pub fn contains(&self, x: f64) -> bool {
        self.start <= x && x <= self.end
    }

    pub fn midpoint(&self) -> f64 {
        (self.start + self.end) / 2.0
    }

    pub fn bounds(&self) -> (f64, f64) {
        (self.start.min(self.end), self.start.max(self.end))
    }

    /// Restore `start <= end`; returns true when the endpoints were swapped.
    pub fn normalize(&mut self) -> bool {
        if self.end < self.start {
            std::mem::swap(&mut self.start, &mut self.end);
            true
        } else {
            false
        }
    }
}

pub struct Recording {
    id: RecordingId,
    source_path: PathBuf,
    angles: TailAngles,
    trace: TimeSeries,
    video_path: Option<PathBuf>,
    video: Option<VideoHandle>,
    pub intervals: Vec<Interval>,
}

impl fmt::Debug for Recording {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recording")
            .field("id", &self.id)
            .field("source_path", &self.source_path)
            .field("frames", &self.angles.frames())
            .field("video_path", &self.video_path)
            .field("intervals", &self.intervals)
            .finish()
    }
}

impl Recording {
    pub fn id(&self) -> RecordingId {
        self.id
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn angles(&self) -> &TailAngles {
        &self.angles
    }

    pub fn trace(&self) -> &TimeSeries {
        &self.trace
    }

    pub fn duration(&self) -> f64 {
        self.trace.duration()
    }

    pub fn video_path(&self) -> Option<&Path> {
        self.video_path.as_deref()
    }

    pub fn video(&self) -> Option<&VideoHandle> {
        self.video.as_ref()
    }

    pub fn video_mut(&mut self) -> Option<&mut VideoHandle> {
        self.video.as_mut()
    }

    pub fn has_video(&self) -> bool {
        self.video.is_some()
    }

    /// First interval, in insertion order, whose closed range holds `x`.
    pub fn interval_at(&self, x: f64) -> Option<&Interval> {
        self.intervals.iter().find(|interval| interval.contains(x))
    }

    pub fn interval(&self, id: IntervalId) -> Option<&Interval> {
        self.intervals.iter().find(|interval| interval.id == id)
    }

    pub fn interval_mut(&mut self, id: IntervalId) -> Option<&mut Interval> {
        self.intervals.iter_mut().find(|interval| interval.id == id)
    }

    pub fn remove_interval(&mut self, id: IntervalId) -> Option<Interval> {
        let index = self.intervals.iter().position(|interval| interval.id == id)?;
        Some(self.intervals.remove(index))
    }

    fn release_video(&mut self) {
        if let Some(handle) = self.video.take() {
            log::debug!(
                "releasing video {} for {}",
                handle.path().display(),
                self.source_path.display()
            );
            drop(handle);
        }
        self.video_path = None;
    }
}

/// Source of interval ids, unique across every recording in a store.
#[derive(Debug, Default)]
pub struct IntervalIds {
    next: u64,
}

impl IntervalIds {
    pub fn allocate(&mut self) -> IntervalId {
        let id = IntervalId(self.next);
        self.next += 1;
        id
    }
}

/// All loaded recordings, in list order.
pub struct RecordingStore {
    recordings: Vec<Recording>,
    frame_rate: f64,
    trace_channels: usize,
    next_recording: u64,
    interval_ids: IntervalIds,
}

impl RecordingStore {
    pub fn new(frame_rate: f64, trace_channels: usize) -> Self {
        Self {
            recordings: Vec::new(),
            frame_rate,
            trace_channels,
            next_recording: 0,
            interval_ids: IntervalIds::default(),
        }
    }

    pub fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    pub fn add_recording(
        &mut self,
        angles: TailAngles,
        source_path: impl Into<PathBuf>,
    ) -> Result<RecordingId> {
        let source_path = source_path.into();
        if self.find_by_source(&source_path).is_some() {
            return Err(TailmarkError::DuplicateSource(source_path));
        }
        let trace = TimeSeries {
            fs: self.frame_rate,
            data: angles.tail_trace(self.trace_channels),
        };
        let id = RecordingId(self.next_recording);
        self.next_recording += 1;
        self.recordings.push(Recording {
            id,
            source_path,
            angles,
            trace,
            video_path: None,
            video: None,
            intervals: Vec::new(),
        });
        Ok(id)
    }

    /// Bind a decoder to a recording. A previously attached decoder is
    /// released before the slot is reused.
    pub fn attach_video(
        &mut self,
        id: RecordingId,
        path: impl Into<PathBuf>,
        handle: VideoHandle,
    ) -> Result<()> {
        let recording = self
            .get_mut(id)
            .ok_or(TailmarkError::UnknownRecording(id))?;
        recording.release_video();
        recording.video_path = Some(path.into());
        recording.video = Some(handle);
        Ok(())
    }

    /// Drop a recording, releasing its decoder first. The returned value
    /// still carries the intervals so callers can tear down their visuals.
    pub fn remove_recording(&mut self, id: RecordingId) -> Result<Recording> {
        let index = self
            .index_of(id)
            .ok_or(TailmarkError::UnknownRecording(id))?;
        let mut recording = self.recordings.remove(index);
        recording.release_video();
        Ok(recording)
    }

    pub fn allocate_interval_id(&mut self) -> IntervalId {
        self.interval_ids.allocate()
    }

    /// A recording together with the store's id source, for edits that may
    /// create intervals.
    pub fn edit(&mut self, id: RecordingId) -> Option<(&mut Recording, &mut IntervalIds)> {
        let recording = self.recordings.iter_mut().find(|rec| rec.id == id)?;
        Some((recording, &mut self.interval_ids))
    }

    pub fn get(&self, id: RecordingId) -> Option<&Recording> {
        self.recordings.iter().find(|rec| rec.id == id)
    }

    pub fn get_mut(&mut self, id: RecordingId) -> Option<&mut Recording> {
        self.recordings.iter_mut().find(|rec| rec.id == id)
    }

    pub fn find_by_source(&self, path: &Path) -> Option<RecordingId> {
        self.recordings
            .iter()
            .find(|rec| rec.source_path == path)
            .map(|rec| rec.id)
    }

    pub fn index_of(&self, id: RecordingId) -> Option<usize> {
        self.recordings.iter().position(|rec| rec.id == id)
    }

    pub fn id_at(&self, index: usize) -> Option<RecordingId> {
        self.recordings.get(index).map(|rec| rec.id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Recording> {
        self.recordings.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Recording> {
        self.recordings.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.recordings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recordings.is_empty()
    }
}
