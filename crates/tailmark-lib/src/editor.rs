//! Click/drag state machine for creating and editing intervals on the
//! selected recording.
//!
//! `Idle` → click outside every interval → `AwaitingEnd` (start marker and
//! zero-width region shown, region follows the pointer) → second click →
//! interval committed with `start <= end`, label attached, reclassify menu
//! opened → `Idle`. A click inside an existing interval only opens the menu
//! for the first containing interval in insertion order.

use serde::Serialize;

use crate::config::{AnnotatorConfig, Behavior};
use crate::plot::{MarkerId, MarkerRole, OverlayLayer};
use crate::store::{Interval, IntervalId, IntervalIds, Recording, RecordingId};

/// Everything an edit may touch, borrowed for the duration of one event.
pub struct EditContext<'a> {
    pub recording: &'a mut Recording,
    pub ids: &'a mut IntervalIds,
    pub overlays: &'a mut OverlayLayer,
    pub config: &'a AnnotatorConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingInterval {
    pub recording: RecordingId,
    pub interval: IntervalId,
    pub start: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub enum EditorState {
    #[default]
    Idle,
    AwaitingEnd(PendingInterval),
}

/// Popup offering every behavior plus delete for one interval.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReclassifyMenu {
    pub recording: RecordingId,
    pub interval: IntervalId,
    /// Screen position of the click that opened the menu.
    pub anchor: [f32; 2],
    pub checked: Behavior,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MenuAction {
    Reclassify(Behavior),
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum ClickOutcome {
    /// Outside the recording's time range.
    Ignored,
    /// An open menu swallowed the click and closed.
    MenuDismissed,
    MenuOpened(IntervalId),
    Started(IntervalId),
    Completed { interval: IntervalId, swapped: bool },
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ActiveDrag {
    marker: MarkerId,
    interval: IntervalId,
}

#[derive(Debug, Default)]
pub struct IntervalEditor {
    state: EditorState,
    menu: Option<ReclassifyMenu>,
    drag: Option<ActiveDrag>,
}

impl IntervalEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    pub fn pending(&self) -> Option<&PendingInterval> {
        match &self.state {
            EditorState::AwaitingEnd(pending) => Some(pending),
            EditorState::Idle => None,
        }
    }

    pub fn menu(&self) -> Option<&ReclassifyMenu> {
        self.menu.as_ref()
    }

    pub fn dragging(&self) -> Option<MarkerId> {
        self.drag.map(|drag| drag.marker)
    }

    pub fn click(&mut self, ctx: EditContext<'_>, x: f64, anchor: [f32; 2]) -> ClickOutcome {
        if self.menu.take().is_some() {
            return ClickOutcome::MenuDismissed;
        }
        if !(0.0..=ctx.recording.duration()).contains(&x) {
            return ClickOutcome::Ignored;
        }
        match std::mem::take(&mut self.state) {
            EditorState::AwaitingEnd(pending) if pending.recording == ctx.recording.id() => {
                self.complete(ctx, pending, x, anchor)
            }
            EditorState::AwaitingEnd(stale) => {
                ctx.overlays.remove_overlay(stale.interval);
                self.click_idle(ctx, x, anchor)
            }
            EditorState::Idle => self.click_idle(ctx, x, anchor),
        }
    }

    fn click_idle(&mut self, ctx: EditContext<'_>, x: f64, anchor: [f32; 2]) -> ClickOutcome {
        if let Some(hit) = ctx.recording.interval_at(x) {
            let interval = hit.id;
            self.menu = Some(ReclassifyMenu {
                recording: ctx.recording.id(),
                interval,
                anchor,
                checked: hit.label,
            });
            return ClickOutcome::MenuOpened(interval);
        }
        let interval = ctx.ids.allocate();
        let color = ctx.config.behavior_color(ctx.config.default_behavior());
        ctx.overlays.begin_pending(interval, x, color);
        self.state = EditorState::AwaitingEnd(PendingInterval {
            recording: ctx.recording.id(),
            interval,
            start: x,
        });
        ClickOutcome::Started(interval)
    }

    fn complete(
        &mut self,
        ctx: EditContext<'_>,
        pending: PendingInterval,
        x: f64,
        anchor: [f32; 2],
    ) -> ClickOutcome {
        let mut interval = Interval {
            id: pending.interval,
            label: ctx.config.default_behavior(),
            start: pending.start,
            end: x,
        };
        let swapped = interval.normalize();
        ctx.overlays.complete_pending(&interval, swapped, ctx.config);
        log::debug!(
            "interval {:?} committed at [{:.3}, {:.3}]",
            interval.id,
            interval.start,
            interval.end
        );
        self.menu = Some(ReclassifyMenu {
            recording: ctx.recording.id(),
            interval: interval.id,
            anchor,
            checked: interval.label,
        });
        let id = interval.id;
        ctx.recording.intervals.push(interval);
        ClickOutcome::Completed {
            interval: id,
            swapped,
        }
    }

    /// Pointer motion: the pending region's free edge follows `x`.
    pub fn pointer_moved(&mut self, overlays: &mut OverlayLayer, x: f64) {
        if let EditorState::AwaitingEnd(pending) = &self.state {
            overlays.stretch_pending(pending.interval, pending.start, x);
        }
    }

    /// Drop a half-created interval and its visuals.
    pub fn cancel_pending(&mut self, overlays: &mut OverlayLayer) -> Option<PendingInterval> {
        match std::mem::take(&mut self.state) {
            EditorState::AwaitingEnd(pending) => {
                overlays.remove_overlay(pending.interval);
                Some(pending)
            }
            EditorState::Idle => None,
        }
    }

    pub fn dismiss_menu(&mut self) -> bool {
        self.menu.take().is_some()
    }

    /// Forget every transient edit: pending interval, menu and drag.
    pub fn reset(&mut self, overlays: &mut OverlayLayer) {
        self.cancel_pending(overlays);
        self.menu = None;
        self.drag = None;
    }

    /// Apply a menu choice to the interval the menu was opened for.
    pub fn choose(&mut self, ctx: EditContext<'_>, action: MenuAction) -> bool {
        let Some(menu) = self.menu.take() else {
            return false;
        };
        if menu.recording != ctx.recording.id() {
            return false;
        }
        match action {
            MenuAction::Reclassify(label) => {
                let Some(interval) = ctx.recording.interval_mut(menu.interval) else {
                    return false;
                };
                interval.label = label;
                ctx.overlays.refresh_overlay(interval, ctx.config);
                true
            }
            MenuAction::Delete => {
                ctx.overlays.remove_overlay(menu.interval);
                ctx.recording.remove_interval(menu.interval).is_some()
            }
        }
    }

    /// Grab a committed interval's marker. Pending markers are not draggable.
    pub fn begin_drag(&mut self, recording: &Recording, overlays: &OverlayLayer, marker: MarkerId) -> bool {
        let Some(found) = overlays.marker(marker) else {
            return false;
        };
        if recording.interval(found.interval).is_none() {
            return false;
        }
        self.drag = Some(ActiveDrag {
            marker,
            interval: found.interval,
        });
        true
    }

    /// Move the grabbed marker. The field it edits follows the marker's
    /// current role; crossing the paired marker is allowed until release.
    pub fn drag(&mut self, ctx: EditContext<'_>, marker: MarkerId, x: f64) -> bool {
        let Some(drag) = self.drag.filter(|drag| drag.marker == marker) else {
            return false;
        };
        let Some(role) = ctx.overlays.marker(marker).map(|found| found.role) else {
            return false;
        };
        let x = x.clamp(0.0, ctx.recording.duration());
        let Some(interval) = ctx.recording.interval_mut(drag.interval) else {
            return false;
        };
        match role {
            MarkerRole::Start => interval.start = x,
            MarkerRole::End => interval.end = x,
        }
        ctx.overlays.refresh_overlay(interval, ctx.config);
        true
    }

    /// Release the grabbed marker and restore `start <= end`, handing the
    /// start role to whichever marker now sits on the left.
    pub fn end_drag(&mut self, ctx: EditContext<'_>, marker: MarkerId) -> bool {
        let Some(drag) = self.drag.filter(|drag| drag.marker == marker) else {
            return false;
        };
        self.drag = None;
        let Some(interval) = ctx.recording.interval_mut(drag.interval) else {
            return false;
        };
        if interval.normalize() {
            ctx.overlays.swap_marker_roles(interval.id);
        }
        ctx.overlays.refresh_overlay(interval, ctx.config);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::TailAngles;
    use crate::store::RecordingStore;

    struct Fixture {
        store: RecordingStore,
        overlays: OverlayLayer,
        config: AnnotatorConfig,
        id: RecordingId,
    }

    impl Fixture {
        /// Ten seconds of flat signal at 10 Hz.
        fn new() -> Self {
            let mut store = RecordingStore::new(10.0, 3);
            let rows = (0..100).map(|_| vec![0.0, 1.0, 2.0]).collect();
            let angles = TailAngles::from_rows(rows).unwrap();
            let id = store.add_recording(angles, "fish_tail_angles.csv").unwrap();
            Self {
                store,
                overlays: OverlayLayer::new(),
                config: AnnotatorConfig::default(),
                id,
            }
        }

        fn ctx(&mut self) -> EditContext<'_> {
            let (recording, ids) = self.store.edit(self.id).unwrap();
            EditContext {
                recording,
                ids,
                overlays: &mut self.overlays,
                config: &self.config,
            }
        }

        fn intervals(&self) -> Vec<(f64, f64)> {
            self.store
                .get(self.id)
                .unwrap()
                .intervals
                .iter()
                .map(|i| (i.start, i.end))
                .collect()
        }
    }

    fn make_interval(editor: &mut IntervalEditor, fx: &mut Fixture, a: f64, b: f64) -> IntervalId {
        editor.click(fx.ctx(), a, [0.0, 0.0]);
        match editor.click(fx.ctx(), b, [0.0, 0.0]) {
            ClickOutcome::Completed { interval, .. } => {
                editor.dismiss_menu();
                interval
            }
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[test]
    fn two_clicks_commit_interval_and_open_menu() {
        let mut fx = Fixture::new();
        let mut editor = IntervalEditor::new();
        let started = editor.click(fx.ctx(), 1.0, [10.0, 20.0]);
        let ClickOutcome::Started(id) = started else {
            panic!("expected start, got {started:?}");
        };
        assert!(editor.pending().is_some());
        assert!(fx.intervals().is_empty());
        let done = editor.click(fx.ctx(), 2.5, [30.0, 20.0]);
        assert_eq!(
            done,
            ClickOutcome::Completed {
                interval: id,
                swapped: false
            }
        );
        assert_eq!(editor.state(), &EditorState::Idle);
        assert_eq!(fx.intervals(), vec![(1.0, 2.5)]);
        let menu = editor.menu().unwrap();
        assert_eq!(menu.interval, id);
        assert_eq!(menu.anchor, [30.0, 20.0]);
        assert_eq!(menu.checked, Behavior(0));
    }

    #[test]
    fn pending_region_follows_pointer() {
        let mut fx = Fixture::new();
        let mut editor = IntervalEditor::new();
        let ClickOutcome::Started(id) = editor.click(fx.ctx(), 4.0, [0.0, 0.0]) else {
            panic!("expected start");
        };
        editor.pointer_moved(&mut fx.overlays, 6.0);
        let region = &fx.overlays.overlay(id).unwrap().region;
        assert_eq!((region.lo, region.hi), (4.0, 6.0));
        assert!(fx.overlays.overlay(id).unwrap().label.is_none());
    }

    #[test]
    fn click_inside_opens_menu_for_first_match() {
        let mut fx = Fixture::new();
        let mut editor = IntervalEditor::new();
        let first = make_interval(&mut editor, &mut fx, 2.0, 5.0);
        // Overlapping intervals can only be made by dragging; build one directly.
        let second = fx.store.allocate_interval_id();
        fx.store.get_mut(fx.id).unwrap().intervals.push(Interval {
            id: second,
            label: Behavior(2),
            start: 4.0,
            end: 8.0,
        });
        assert_eq!(editor.click(fx.ctx(), 4.5, [0.0, 0.0]), ClickOutcome::MenuOpened(first));
        assert_eq!(editor.state(), &EditorState::Idle);
        assert_eq!(fx.intervals().len(), 2);
        editor.dismiss_menu();
        assert_eq!(editor.click(fx.ctx(), 7.0, [0.0, 0.0]), ClickOutcome::MenuOpened(second));
        assert_eq!(editor.menu().unwrap().checked, Behavior(2));
    }

    #[test]
    fn click_with_menu_open_only_dismisses() {
        let mut fx = Fixture::new();
        let mut editor = IntervalEditor::new();
        editor.click(fx.ctx(), 1.0, [0.0, 0.0]);
        editor.click(fx.ctx(), 2.0, [0.0, 0.0]);
        assert!(editor.menu().is_some());
        assert_eq!(editor.click(fx.ctx(), 6.0, [0.0, 0.0]), ClickOutcome::MenuDismissed);
        assert!(editor.pending().is_none());
    }

    #[test]
    fn clicks_outside_recording_are_ignored() {
        let mut fx = Fixture::new();
        let mut editor = IntervalEditor::new();
        assert_eq!(editor.click(fx.ctx(), -0.5, [0.0, 0.0]), ClickOutcome::Ignored);
        assert_eq!(editor.click(fx.ctx(), 10.5, [0.0, 0.0]), ClickOutcome::Ignored);
        assert!(editor.pending().is_none());
    }

    #[test]
    fn reclassify_updates_label_and_colors() {
        let mut fx = Fixture::new();
        let mut editor = IntervalEditor::new();
        editor.click(fx.ctx(), 1.0, [0.0, 0.0]);
        let ClickOutcome::Completed { interval, .. } = editor.click(fx.ctx(), 3.0, [0.0, 0.0]) else {
            panic!("expected completion");
        };
        assert!(editor.choose(fx.ctx(), MenuAction::Reclassify(Behavior(2))));
        assert!(editor.menu().is_none());
        let recording = fx.store.get(fx.id).unwrap();
        assert_eq!(recording.interval(interval).unwrap().label, Behavior(2));
        let group = fx.overlays.overlay(interval).unwrap();
        let swim = fx.config.behavior_color(Behavior(2));
        assert!(group.markers.iter().all(|m| m.color == swim));
        assert_eq!(group.region.color, swim);
        let label = group.label.as_ref().unwrap();
        assert_eq!((label.text.as_str(), label.color), ("Swim", swim));
        assert_eq!(fx.intervals(), vec![(1.0, 3.0)]);
    }

    #[test]
    fn delete_removes_record_and_visuals() {
        let mut fx = Fixture::new();
        let mut editor = IntervalEditor::new();
        let keep = make_interval(&mut editor, &mut fx, 6.0, 7.0);
        editor.click(fx.ctx(), 1.0, [0.0, 0.0]);
        let ClickOutcome::Completed { interval, .. } = editor.click(fx.ctx(), 3.0, [0.0, 0.0]) else {
            panic!("expected completion");
        };
        assert!(editor.choose(fx.ctx(), MenuAction::Delete));
        assert!(editor.menu().is_none());
        assert!(fx.overlays.overlay(interval).is_none());
        assert_eq!(fx.overlays.interval_ids(), vec![keep]);
        assert_eq!(fx.intervals(), vec![(6.0, 7.0)]);
        assert!(!editor.choose(fx.ctx(), MenuAction::Delete));
    }

    #[test]
    fn drag_crossing_is_normalized_on_release() {
        let mut fx = Fixture::new();
        let mut editor = IntervalEditor::new();
        let id = make_interval(&mut editor, &mut fx, 2.0, 4.0);
        let start_marker = fx.overlays.overlay(id).unwrap().markers[0].id;
        let recording = fx.store.get(fx.id).unwrap();
        assert!(editor.begin_drag(recording, &fx.overlays, start_marker));

        assert!(editor.drag(fx.ctx(), start_marker, 5.0));
        assert_eq!(fx.intervals(), vec![(5.0, 4.0)]);
        let group = fx.overlays.overlay(id).unwrap();
        assert_eq!((group.region.lo, group.region.hi), (4.0, 5.0));
        assert_eq!(group.label.as_ref().unwrap().x, 4.5);

        assert!(editor.end_drag(fx.ctx(), start_marker));
        assert_eq!(fx.intervals(), vec![(4.0, 5.0)]);
        let dragged = fx.overlays.marker(start_marker).unwrap();
        assert_eq!((dragged.role, dragged.x), (MarkerRole::End, 5.0));
        assert!(editor.dragging().is_none());
    }

    #[test]
    fn drag_is_clamped_to_recording() {
        let mut fx = Fixture::new();
        let mut editor = IntervalEditor::new();
        let id = make_interval(&mut editor, &mut fx, 2.0, 4.0);
        let end_marker = fx.overlays.overlay(id).unwrap().markers[1].id;
        let recording = fx.store.get(fx.id).unwrap();
        editor.begin_drag(recording, &fx.overlays, end_marker);
        editor.drag(fx.ctx(), end_marker, 42.0);
        assert_eq!(fx.intervals(), vec![(2.0, 10.0)]);
    }

    #[test]
    fn pending_marker_is_not_draggable() {
        let mut fx = Fixture::new();
        let mut editor = IntervalEditor::new();
        let ClickOutcome::Started(id) = editor.click(fx.ctx(), 4.0, [0.0, 0.0]) else {
            panic!("expected start");
        };
        let marker = fx.overlays.overlay(id).unwrap().markers[0].id;
        let recording = fx.store.get(fx.id).unwrap();
        assert!(!editor.begin_drag(recording, &fx.overlays, marker));
    }

    #[test]
    fn cancel_pending_leaves_no_visuals() {
        let mut fx = Fixture::new();
        let mut editor = IntervalEditor::new();
        editor.click(fx.ctx(), 4.0, [0.0, 0.0]);
        assert!(editor.cancel_pending(&mut fx.overlays).is_some());
        assert!(fx.overlays.is_empty());
        assert!(fx.intervals().is_empty());
    }
}
