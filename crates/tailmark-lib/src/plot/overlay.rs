//! Retained overlay state for the selected recording's intervals.
//!
//! Each interval owns one overlay group: up to two draggable markers, a
//! shaded region and a text label. Markers point back at their interval and
//! carry the role they report on drag, so lookups never depend on list
//! position or on which marker happened to be placed first.

use serde::Serialize;

use super::Color;
use crate::config::AnnotatorConfig;
use crate::store::{Interval, IntervalId};

/// Alpha applied to region fills.
pub const REGION_ALPHA: u8 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MarkerId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MarkerRole {
    Start,
    End,
}

impl MarkerRole {
    fn flipped(self) -> Self {
        match self {
            MarkerRole::Start => MarkerRole::End,
            MarkerRole::End => MarkerRole::Start,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkerOverlay {
    pub id: MarkerId,
    pub interval: IntervalId,
    pub role: MarkerRole,
    pub x: f64,
    pub color: Color,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionOverlay {
    pub lo: f64,
    pub hi: f64,
    pub color: Color,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelOverlay {
    pub x: f64,
    pub y: f64,
    pub text: String,
    pub color: Color,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntervalOverlay {
    pub interval: IntervalId,
    /// In placement order: one while the interval is pending, two after.
    pub markers: Vec<MarkerOverlay>,
    pub region: RegionOverlay,
    pub label: Option<LabelOverlay>,
}

impl IntervalOverlay {
    pub fn marker(&self, role: MarkerRole) -> Option<&MarkerOverlay> {
        self.markers.iter().find(|marker| marker.role == role)
    }
}

#[derive(Debug, Default)]
pub struct OverlayLayer {
    overlays: Vec<IntervalOverlay>,
    next_marker: u64,
    label_y: f64,
    cursor: Option<f64>,
}

impl OverlayLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Vertical position for interval labels on the current plot.
    pub fn set_label_y(&mut self, y: f64) {
        self.label_y = y;
    }

    pub fn label_y(&self) -> f64 {
        self.label_y
    }

    pub fn set_cursor(&mut self, x: Option<f64>) {
        self.cursor = x;
    }

    pub fn cursor(&self) -> Option<f64> {
        self.cursor
    }

    pub fn overlays(&self) -> &[IntervalOverlay] {
        &self.overlays
    }

    pub fn overlay(&self, interval: IntervalId) -> Option<&IntervalOverlay> {
        self.overlays.iter().find(|group| group.interval == interval)
    }

    fn overlay_mut(&mut self, interval: IntervalId) -> Option<&mut IntervalOverlay> {
        self.overlays
            .iter_mut()
            .find(|group| group.interval == interval)
    }

    pub fn interval_ids(&self) -> Vec<IntervalId> {
        self.overlays.iter().map(|group| group.interval).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.overlays.is_empty()
    }

    pub fn marker(&self, id: MarkerId) -> Option<&MarkerOverlay> {
        self.overlays
            .iter()
            .flat_map(|group| group.markers.iter())
            .find(|marker| marker.id == id)
    }

    /// Closest marker within `tolerance` of `x`, in plot units.
    pub fn nearest_marker(&self, x: f64, tolerance: f64) -> Option<MarkerId> {
        self.overlays
            .iter()
            .flat_map(|group| group.markers.iter())
            .map(|marker| (marker.id, (marker.x - x).abs()))
            .filter(|(_, distance)| *distance <= tolerance)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }

    fn mint_marker(&mut self, interval: IntervalId, role: MarkerRole, x: f64, color: Color) -> MarkerOverlay {
        let id = MarkerId(self.next_marker);
        self.next_marker += 1;
        MarkerOverlay {
            id,
            interval,
            role,
            x,
            color,
        }
    }

    /// Build overlay groups for completed intervals being shown.
    pub fn attach_overlays(&mut self, intervals: &[Interval], config: &AnnotatorConfig) {
        for interval in intervals {
            if self.overlay(interval.id).is_some() {
                self.refresh_overlay(interval, config);
                continue;
            }
            let color = config.behavior_color(interval.label);
            let start = self.mint_marker(interval.id, MarkerRole::Start, interval.start, color);
            let end = self.mint_marker(interval.id, MarkerRole::End, interval.end, color);
            let (lo, hi) = interval.bounds();
            let label = self.label_for(interval, config);
            self.overlays.push(IntervalOverlay {
                interval: interval.id,
                markers: vec![start, end],
                region: RegionOverlay { lo, hi, color },
                label: Some(label),
            });
        }
    }

    pub fn detach_overlays(&mut self, intervals: &[Interval]) {
        self.overlays
            .retain(|group| !intervals.iter().any(|interval| interval.id == group.interval));
    }

    pub fn remove_overlay(&mut self, interval: IntervalId) -> bool {
        let before = self.overlays.len();
        self.overlays.retain(|group| group.interval != interval);
        self.overlays.len() != before
    }

    pub fn clear(&mut self) {
        self.overlays.clear();
        self.cursor = None;
    }

    /// Re-derive positions, colors and text from the interval.
    pub fn refresh_overlay(&mut self, interval: &Interval, config: &AnnotatorConfig) {
        let label = self.label_for(interval, config);
        let color = config.behavior_color(interval.label);
        let Some(group) = self.overlay_mut(interval.id) else {
            return;
        };
        for marker in &mut group.markers {
            marker.color = color;
            marker.x = match marker.role {
                MarkerRole::Start => interval.start,
                MarkerRole::End => interval.end,
            };
        }
        let (lo, hi) = interval.bounds();
        group.region = RegionOverlay { lo, hi, color };
        if group.label.is_some() {
            group.label = Some(label);
        }
    }

    /// Start marker plus a zero-width region at `x` for an interval that is
    /// still waiting for its second click.
    pub fn begin_pending(&mut self, interval: IntervalId, x: f64, color: Color) -> MarkerId {
        self.remove_overlay(interval);
        let marker = self.mint_marker(interval, MarkerRole::Start, x, color);
        let id = marker.id;
        self.overlays.push(IntervalOverlay {
            interval,
            markers: vec![marker],
            region: RegionOverlay { lo: x, hi: x, color },
            label: None,
        });
        id
    }

    /// Follow the cursor with the pending region's free edge.
    pub fn stretch_pending(&mut self, interval: IntervalId, anchor: f64, x: f64) {
        if let Some(group) = self.overlay_mut(interval) {
            group.region.lo = anchor.min(x);
            group.region.hi = anchor.max(x);
        }
    }

    /// Add the end marker and label once the interval is committed. When the
    /// clicks came right-to-left the first marker now sits on the right, so
    /// it takes the end role and the new marker the start role.
    pub fn complete_pending(&mut self, interval: &Interval, swapped: bool, config: &AnnotatorConfig) {
        let color = config.behavior_color(interval.label);
        let second_role = if swapped {
            MarkerRole::Start
        } else {
            MarkerRole::End
        };
        let x = if swapped { interval.start } else { interval.end };
        let second = self.mint_marker(interval.id, second_role, x, color);
        let label = self.label_for(interval, config);
        let Some(group) = self.overlay_mut(interval.id) else {
            return;
        };
        if swapped {
            for marker in &mut group.markers {
                marker.role = marker.role.flipped();
            }
        }
        group.markers.push(second);
        group.label = Some(label);
        self.refresh_overlay(interval, config);
    }

    /// Exchange which marker reports start and which reports end.
    pub fn swap_marker_roles(&mut self, interval: IntervalId) {
        if let Some(group) = self.overlay_mut(interval) {
            for marker in &mut group.markers {
                marker.role = marker.role.flipped();
            }
        }
    }

    fn label_for(&self, interval: &Interval, config: &AnnotatorConfig) -> LabelOverlay {
        LabelOverlay {
            x: interval.midpoint(),
            y: self.label_y,
            text: config.behavior_name(interval.label).to_string(),
            color: config.behavior_color(interval.label),
        }
    }
}
