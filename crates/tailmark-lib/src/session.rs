//! Selection coordinator: owns the store, the editor, the overlay layer and
//! the preview state, and keeps them consistent with the selected recording.

use std::path::{Path, PathBuf};

use crate::config::AnnotatorConfig;
use crate::editor::{ClickOutcome, EditContext, IntervalEditor, MenuAction, ReclassifyMenu};
use crate::error::{Result, TailmarkError};
use crate::io::naming::expected_video_name;
use crate::io::results::export_results;
use crate::io::tail_angles::{import_files, import_folder};
use crate::io::{ExportReport, ImportReport, VideoMatchReport};
use crate::plot::{figure_from_trace, Color, Figure, MarkerId, OverlayLayer};
use crate::signal::frame_at;
use crate::store::{Recording, RecordingId, RecordingStore};
use crate::video::{VideoBackend, VideoFrame, VideoHandle};

const MAX_TRACE_POINTS: usize = 4096;
const TRACE_COLOR: Color = Color(0xFF0000);

fn edit_context<'a>(
    store: &'a mut RecordingStore,
    overlays: &'a mut OverlayLayer,
    config: &'a AnnotatorConfig,
    id: RecordingId,
) -> Option<EditContext<'a>> {
    let (recording, ids) = store.edit(id)?;
    Some(EditContext {
        recording,
        ids,
        overlays,
        config,
    })
}

pub struct Session {
    config: AnnotatorConfig,
    backend: Box<dyn VideoBackend>,
    store: RecordingStore,
    selected: Option<RecordingId>,
    editor: IntervalEditor,
    overlays: OverlayLayer,
    trace_figure: Option<Figure>,
    trace_dirty: bool,
}

impl Session {
    pub fn new(config: AnnotatorConfig, backend: impl VideoBackend + 'static) -> Result<Self> {
        config.validate()?;
        let store = RecordingStore::new(config.frame_rate, config.trace_channels);
        Ok(Self {
            config,
            backend: Box::new(backend),
            store,
            selected: None,
            editor: IntervalEditor::new(),
            overlays: OverlayLayer::new(),
            trace_figure: None,
            trace_dirty: true,
        })
    }

    pub fn config(&self) -> &AnnotatorConfig {
        &self.config
    }

    pub fn store(&self) -> &RecordingStore {
        &self.store
    }

    pub fn editor(&self) -> &IntervalEditor {
        &self.editor
    }

    pub fn overlays(&self) -> &OverlayLayer {
        &self.overlays
    }

    pub fn menu(&self) -> Option<&ReclassifyMenu> {
        self.editor.menu()
    }

    pub fn selected(&self) -> Option<RecordingId> {
        self.selected
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.selected.and_then(|id| self.store.index_of(id))
    }

    pub fn selected_recording(&self) -> Option<&Recording> {
        self.selected.and_then(|id| self.store.get(id))
    }

    // -- import ------------------------------------------------------------

    pub fn import_files<I, P>(&mut self, paths: I) -> ImportReport
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let report = import_files(&mut self.store, paths);
        self.select_first_if_unselected();
        report
    }

    pub fn import_folder(&mut self, dir: &Path) -> Result<ImportReport> {
        let report = import_folder(&mut self.store, dir)?;
        self.select_first_if_unselected();
        Ok(report)
    }

    fn select_first_if_unselected(&mut self) {
        if self.selected.is_none() {
            if let Some(first) = self.store.id_at(0) {
                self.apply_selection(Some(first));
            }
        }
    }

    // -- video -------------------------------------------------------------

    /// Open `path` and bind it to recording `id`. On failure the recording
    /// keeps whatever video it had.
    pub fn attach_video(&mut self, id: RecordingId, path: &Path) -> Result<()> {
        if self.store.get(id).is_none() {
            return Err(TailmarkError::UnknownRecording(id));
        }
        let source = self.backend.open(path)?;
        let handle = VideoHandle::spawn(path, source);
        self.store.attach_video(id, path, handle)?;
        log::info!("attached {} to recording {}", path.display(), id);
        if self.selected == Some(id) {
            self.show_first_frame();
        }
        Ok(())
    }

    pub fn attach_video_to_selected(&mut self, path: &Path) -> Result<()> {
        match self.selected {
            Some(id) => self.attach_video(id, path),
            None => Err(TailmarkError::video_open(path, "no recording selected")),
        }
    }

    /// Attach `<base>.<ext>` from `dir` to every recording named
    /// `<base><tail_suffix>.csv`. Recordings without a match are left alone.
    pub fn attach_videos_from_folder(&mut self, dir: &Path) -> VideoMatchReport {
        let mut report = VideoMatchReport::default();
        let candidates: Vec<(RecordingId, Option<PathBuf>)> = self
            .store
            .iter()
            .map(|rec| {
                let video = expected_video_name(
                    rec.source_path(),
                    &self.config.tail_suffix,
                    &self.config.video_extension,
                )
                .map(|name| dir.join(name));
                (rec.id(), video)
            })
            .collect();
        for (id, video) in candidates {
            match video {
                Some(path) if path.is_file() => match self.attach_video(id, &path) {
                    Ok(()) => report.attached.push((id, path)),
                    Err(err) => {
                        log::warn!("{err}");
                        report.failures.push((path, err));
                    }
                },
                Some(path) => {
                    log::debug!("no video at {} for recording {}", path.display(), id);
                    report.unmatched.push(id);
                }
                None => report.unmatched.push(id),
            }
        }
        report
    }

    fn show_first_frame(&mut self) {
        let handle = self
            .selected
            .and_then(|id| self.store.get_mut(id))
            .and_then(Recording::video_mut);
        if let Some(handle) = handle {
            handle.rewind();
            handle.request(0);
        }
    }

    /// Pick up finished decodes for the selected recording. Returns true
    /// when the displayed frame changed.
    pub fn poll_video(&mut self) -> bool {
        self.selected
            .and_then(|id| self.store.get_mut(id))
            .and_then(Recording::video_mut)
            .is_some_and(VideoHandle::poll)
    }

    pub fn current_frame(&self) -> Option<&VideoFrame> {
        self.selected_recording()
            .and_then(Recording::video)
            .and_then(VideoHandle::current)
    }

    pub fn video_pending(&self) -> bool {
        self.selected_recording()
            .and_then(Recording::video)
            .is_some_and(VideoHandle::is_pending)
    }

    // -- selection ---------------------------------------------------------

    /// Make `id` the selected recording. Selecting the current one is a no-op.
    pub fn select(&mut self, id: RecordingId) -> bool {
        if self.selected == Some(id) || self.store.get(id).is_none() {
            return false;
        }
        self.apply_selection(Some(id));
        true
    }

    pub fn select_index(&mut self, index: usize) -> bool {
        match self.store.id_at(index) {
            Some(id) => self.select(id),
            None => false,
        }
    }

    fn apply_selection(&mut self, next: Option<RecordingId>) {
        self.editor.reset(&mut self.overlays);
        if let Some(previous) = self.selected.and_then(|id| self.store.get(id)) {
            self.overlays.detach_overlays(&previous.intervals);
        }
        self.overlays.clear();
        self.selected = next;
        self.trace_dirty = true;
        if let Some(recording) = next.and_then(|id| self.store.get(id)) {
            let peak = recording.trace().nan_max().unwrap_or(0.0);
            self.overlays.set_label_y(self.config.label_height * peak);
            self.overlays.attach_overlays(&recording.intervals, &self.config);
        }
        self.show_first_frame();
    }

    /// Remove a recording along with its decoder and visuals. When it was
    /// selected, the selection stays at the same list position, clamped to
    /// the shorter list, or clears when the list is empty.
    pub fn remove_recording(&mut self, id: RecordingId) -> Result<()> {
        let index = self
            .store
            .index_of(id)
            .ok_or(TailmarkError::UnknownRecording(id))?;
        let was_selected = self.selected == Some(id);
        if was_selected {
            self.editor.reset(&mut self.overlays);
        }
        let removed = self.store.remove_recording(id)?;
        log::info!("removed {}", removed.source_path().display());
        if was_selected {
            self.overlays.detach_overlays(&removed.intervals);
            self.selected = None;
            let next = match self.store.len() {
                0 => None,
                len => self.store.id_at(index.min(len - 1)),
            };
            self.apply_selection(next);
        }
        Ok(())
    }

    pub fn remove_selected(&mut self) -> Result<()> {
        match self.selected {
            Some(id) => self.remove_recording(id),
            None => Ok(()),
        }
    }

    // -- plot --------------------------------------------------------------

    /// Rebuild cached figures after a selection change.
    pub fn prepare(&mut self) {
        if !self.trace_dirty {
            return;
        }
        self.trace_figure = self
            .selected_recording()
            .map(|rec| figure_from_trace(rec.trace(), MAX_TRACE_POINTS, TRACE_COLOR));
        self.trace_dirty = false;
    }

    pub fn trace_figure(&self) -> Option<&Figure> {
        self.trace_figure.as_ref()
    }

    /// Pointer over the plot at time `x`: move the cursor line, stretch a
    /// pending interval and preview the matching video frame.
    pub fn pointer_moved(&mut self, x: f64) {
        self.overlays.set_cursor(Some(x));
        self.editor.pointer_moved(&mut self.overlays, x);
        let Some(recording) = self.selected.and_then(|id| self.store.get_mut(id)) else {
            return;
        };
        let frames = recording.angles().frames();
        let Some(frame) = frame_at(x, self.config.frame_rate).filter(|&f| f < frames) else {
            return;
        };
        if let Some(handle) = recording.video_mut() {
            handle.request(frame);
        }
    }

    pub fn pointer_left(&mut self) {
        self.overlays.set_cursor(None);
    }

    pub fn pointer_clicked(&mut self, x: f64, anchor: [f32; 2]) -> ClickOutcome {
        let Some(id) = self.selected else {
            return ClickOutcome::Ignored;
        };
        match edit_context(&mut self.store, &mut self.overlays, &self.config, id) {
            Some(ctx) => self.editor.click(ctx, x, anchor),
            None => ClickOutcome::Ignored,
        }
    }

    pub fn begin_marker_drag(&mut self, marker: MarkerId) -> bool {
        match self.selected.and_then(|id| self.store.get(id)) {
            Some(recording) => self.editor.begin_drag(recording, &self.overlays, marker),
            None => false,
        }
    }

    pub fn drag_marker(&mut self, marker: MarkerId, x: f64) -> bool {
        let Some(id) = self.selected else {
            return false;
        };
        match edit_context(&mut self.store, &mut self.overlays, &self.config, id) {
            Some(ctx) => self.editor.drag(ctx, marker, x),
            None => false,
        }
    }

    pub fn end_marker_drag(&mut self, marker: MarkerId) -> bool {
        let Some(id) = self.selected else {
            return false;
        };
        match edit_context(&mut self.store, &mut self.overlays, &self.config, id) {
            Some(ctx) => self.editor.end_drag(ctx, marker),
            None => false,
        }
    }

    pub fn choose(&mut self, action: MenuAction) -> bool {
        let Some(id) = self.selected else {
            return false;
        };
        match edit_context(&mut self.store, &mut self.overlays, &self.config, id) {
            Some(ctx) => self.editor.choose(ctx, action),
            None => false,
        }
    }

    pub fn dismiss_menu(&mut self) -> bool {
        self.editor.dismiss_menu()
    }

    // -- export ------------------------------------------------------------

    pub fn export_results(&self, dir: &Path) -> ExportReport {
        export_results(&self.store, &self.config, dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::EditorState;
    use crate::video::testing::ScriptedBackend;
    use std::fs;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    /// `rows` frames whose tail channels average to `peak`.
    fn write_recording(dir: &Path, name: &str, rows: usize, peak: f64) -> PathBuf {
        let mut text = String::new();
        for i in 0..rows {
            text.push_str(&format!("{i},0.0,{peak},{peak},{peak}\n"));
        }
        let path = dir.join(name);
        fs::write(&path, text).unwrap();
        path
    }

    fn session_with(names: &[&str]) -> (Session, ScriptedBackend, TempDir) {
        let dir = tempdir().unwrap();
        let config = AnnotatorConfig {
            frame_rate: 10.0,
            ..AnnotatorConfig::default()
        };
        let backend = ScriptedBackend::new(100);
        let mut session = Session::new(config, backend.clone()).unwrap();
        let paths: Vec<PathBuf> = names
            .iter()
            .map(|name| write_recording(dir.path(), name, 100, 2.0))
            .collect();
        let report = session.import_files(&paths);
        assert_eq!(report.imported.len(), names.len());
        (session, backend, dir)
    }

    #[test]
    fn import_selects_first_recording() {
        let (mut session, _, _dir) = session_with(&["a_tail_angles.csv", "b_tail_angles.csv"]);
        assert_eq!(session.selected_index(), Some(0));
        assert!((session.overlays().label_y() - 1.8).abs() < 1e-9);
        session.prepare();
        assert!(session.trace_figure().is_some());
    }

    #[test]
    fn selecting_same_recording_is_noop() {
        let (mut session, _, _dir) = session_with(&["a_tail_angles.csv"]);
        let id = session.selected().unwrap();
        assert!(!session.select(id));
        assert!(!session.select_index(4));
    }

    #[test]
    fn switching_selection_discards_pending_interval() {
        let (mut session, _, _dir) = session_with(&["a_tail_angles.csv", "b_tail_angles.csv"]);
        assert!(matches!(
            session.pointer_clicked(2.0, [0.0, 0.0]),
            ClickOutcome::Started(_)
        ));
        assert!(!session.overlays().is_empty());
        assert!(session.select_index(1));
        assert_eq!(session.editor().state(), &EditorState::Idle);
        assert!(session.overlays().is_empty());
        assert!(session.store().iter().all(|rec| rec.intervals.is_empty()));
    }

    #[test]
    fn overlays_follow_selection() {
        let (mut session, _, _dir) = session_with(&["a_tail_angles.csv", "b_tail_angles.csv"]);
        session.pointer_clicked(1.0, [0.0, 0.0]);
        session.pointer_clicked(2.0, [0.0, 0.0]);
        session.dismiss_menu();
        let first = session.overlays().interval_ids();
        assert_eq!(first.len(), 1);
        session.select_index(1);
        assert!(session.overlays().is_empty());
        session.select_index(0);
        assert_eq!(session.overlays().interval_ids(), first);
    }

    #[test]
    fn removal_keeps_position_and_clears_when_empty() {
        let (mut session, _, _dir) = session_with(&[
            "a_tail_angles.csv",
            "b_tail_angles.csv",
            "c_tail_angles.csv",
        ]);
        let ids: Vec<RecordingId> = session.store().iter().map(Recording::id).collect();
        session.select_index(2);
        session.remove_selected().unwrap();
        assert_eq!(session.selected(), Some(ids[1]));
        session.remove_recording(ids[0]).unwrap();
        assert_eq!(session.selected(), Some(ids[1]));
        session.remove_selected().unwrap();
        assert_eq!(session.selected(), None);
        assert!(session.store().is_empty());
        assert!(session.overlays().is_empty());
        assert!(matches!(
            session.remove_recording(ids[0]),
            Err(TailmarkError::UnknownRecording(_))
        ));
    }

    #[test]
    fn pointer_motion_previews_matching_frame() {
        let (mut session, backend, dir) = session_with(&["a_tail_angles.csv"]);
        let video = dir.path().join("a.avi");
        fs::write(&video, b"").unwrap();
        session.attach_video_to_selected(&video).unwrap();
        session.pointer_moved(2.35);
        let id = session.selected().unwrap();
        let frame = session
            .store
            .get_mut(id)
            .and_then(Recording::video_mut)
            .and_then(|handle| handle.wait_for_latest(Duration::from_secs(5)))
            .map(|frame| frame.index);
        assert_eq!(frame, Some(23));
        assert_eq!(session.overlays().cursor(), Some(2.35));
        assert!(backend.probe(&video).is_some());

        // Past the last sample: nothing new is requested.
        session.pointer_moved(12.0);
        assert!(!session.video_pending());
    }

    #[test]
    fn attach_without_selection_fails() {
        let config = AnnotatorConfig::default();
        let mut session = Session::new(config, ScriptedBackend::new(1)).unwrap();
        let err = session
            .attach_video_to_selected(Path::new("/nowhere.avi"))
            .unwrap_err();
        assert!(matches!(err, TailmarkError::VideoOpen { .. }));
    }

    #[test]
    fn empty_behavior_catalog_is_rejected() {
        let config = AnnotatorConfig {
            behaviors: Vec::new(),
            ..AnnotatorConfig::default()
        };
        match Session::new(config, ScriptedBackend::new(1)) {
            Err(TailmarkError::InvalidConfig(reason)) => assert!(reason.contains("behavior")),
            Err(other) => panic!("expected invalid config, got {other:?}"),
            Ok(_) => panic!("session accepted an empty catalog"),
        }
    }
}
