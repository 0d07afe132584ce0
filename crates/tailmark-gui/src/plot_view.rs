use eframe::egui;
use egui_plot::{Line, Plot, PlotPoint, PlotPoints, PlotUi, Polygon, Text, VLine};
use std::hash::Hash;
use tailmark_lib::plot::{
    Figure, IntervalOverlay, MarkerId, OverlayLayer, Series, Style, REGION_ALPHA,
};
use tailmark_lib::Session;

use crate::color32;

/// Grab distance around a marker, in screen pixels.
const MARKER_GRAB_PX: f64 = 6.0;
const MARKER_WIDTH: f32 = 1.5;
const MARKER_HOVER_WIDTH: f32 = 3.0;
/// Labels sit centered on their anchor point, both axes.
const LABEL_ANCHOR: egui::Align2 = egui::Align2::CENTER_CENTER;

/// Pointer activity over the plot during one frame, in plot coordinates.
#[derive(Debug, Default)]
pub struct PlotInput {
    pub hover: Option<f64>,
    pub drag_started: Option<MarkerId>,
    pub drag_to: Option<f64>,
    pub drag_stopped: bool,
    /// Plot x and the screen position for anchoring the menu.
    pub click: Option<(f64, [f32; 2])>,
}

#[derive(Default)]
pub struct PlotView {
    hover_marker: Option<MarkerId>,
    pub menu_opened_this_frame: bool,
}

impl PlotView {
    pub fn show(&mut self, ui: &mut egui::Ui, session: &Session) -> Option<PlotInput> {
        let (Some(recording), Some(figure)) = (session.selected_recording(), session.trace_figure())
        else {
            ui.centered_and_justified(|ui| {
                ui.label("Select a recording to see its tail angles.");
            });
            return None;
        };

        let dragging = session.editor().dragging();
        // Panning would fight marker drags, so it pauses while a marker is
        // grabbed or under the pointer.
        let pan = dragging.is_none() && self.hover_marker.is_none();
        let overlays = session.overlays();

        let plot = tail_plot(("tail_plot", recording.id()), figure, pan);
        let response = plot.show(ui, |plot_ui| {
            let px_per_unit = plot_ui.transform().dpos_dvalue_x().abs().max(f64::EPSILON);
            let pointer = plot_ui.pointer_coordinate().map(|point| point.x);
            let hovered = match dragging {
                Some(marker) => Some(marker),
                None => pointer
                    .and_then(|x| overlays.nearest_marker(x, MARKER_GRAB_PX / px_per_unit)),
            };
            plot_tail_trace(plot_ui, figure, overlays, hovered);

            let plot_response = plot_ui.response();
            let mut input = PlotInput {
                hover: pointer,
                ..PlotInput::default()
            };
            if plot_response.drag_started_by(egui::PointerButton::Primary) {
                input.drag_started = self.hover_marker.or(hovered);
            }
            if plot_response.dragged_by(egui::PointerButton::Primary) {
                input.drag_to = pointer;
            }
            input.drag_stopped = plot_response.drag_stopped();
            if plot_response.clicked() {
                if let (Some(x), Some(pos)) = (pointer, plot_response.interact_pointer_pos()) {
                    input.click = Some((x, [pos.x, pos.y]));
                }
            }
            (input, hovered)
        });

        let (input, hovered) = response.inner;
        self.hover_marker = hovered;
        if hovered.is_some() {
            ui.ctx().set_cursor_icon(egui::CursorIcon::ResizeHorizontal);
        }
        Some(input)
    }
}

fn tail_plot<'a>(id: impl Hash, figure: &Figure, pan: bool) -> Plot<'a> {
    Plot::new(id)
        .x_axis_label(figure.x.label.clone().unwrap_or_default())
        .y_axis_label(figure.y.label.clone().unwrap_or_default())
        .allow_drag([pan, false])
        .allow_zoom([true, false])
        .allow_scroll([true, false])
        .allow_boxed_zoom(false)
        .allow_double_click_reset(true)
        .include_x(0.0)
        .include_x(figure.x_max)
}

/// Vertical extent for interval shading. Sized from the data: auto-bounds
/// pad every drawn item, so shading sized from the view grows each repaint.
fn region_span(figure: &Figure) -> (f64, f64) {
    match figure.y_range {
        Some((lo, hi)) if hi - lo > f64::EPSILON => (lo, hi),
        Some((lo, _)) => (lo - 1.0, lo + 1.0),
        None => (-1.0, 1.0),
    }
}

fn plot_tail_trace(
    plot_ui: &mut PlotUi,
    figure: &Figure,
    overlays: &OverlayLayer,
    hovered: Option<MarkerId>,
) {
    plot_plot_figure(plot_ui, figure);
    let (y_lo, y_hi) = region_span(figure);
    for group in overlays.overlays() {
        plot_interval(plot_ui, group, hovered, y_lo, y_hi);
    }
    if let Some(x) = overlays.cursor() {
        plot_ui.vline(VLine::new(x).stroke(egui::Stroke::new(1.0, egui::Color32::from_gray(150))));
    }
}

fn plot_interval(
    plot_ui: &mut PlotUi,
    group: &IntervalOverlay,
    hovered: Option<MarkerId>,
    y_lo: f64,
    y_hi: f64,
) {
    let (r, g, b) = group.region.color.rgb();
    let fill = egui::Color32::from_rgba_unmultiplied(r, g, b, REGION_ALPHA);
    let region = PlotPoints::new(vec![
        [group.region.lo, y_lo],
        [group.region.hi, y_lo],
        [group.region.hi, y_hi],
        [group.region.lo, y_hi],
    ]);
    plot_ui.polygon(
        Polygon::new(region)
            .fill_color(fill)
            .stroke(egui::Stroke::NONE),
    );

    for marker in &group.markers {
        let width = if hovered == Some(marker.id) {
            MARKER_HOVER_WIDTH
        } else {
            MARKER_WIDTH
        };
        plot_ui.vline(
            VLine::new(marker.x).stroke(egui::Stroke::new(width, color32(marker.color))),
        );
    }

    if let Some(label) = &group.label {
        plot_ui.text(
            Text::new(
                PlotPoint::new(label.x, label.y),
                egui::RichText::new(&label.text).color(color32(label.color)),
            )
            .anchor(LABEL_ANCHOR),
        );
    }
}

fn plot_plot_figure(plot_ui: &mut PlotUi, figure: &Figure) {
    for series in &figure.series {
        match series {
            Series::Line(line) => {
                plot_ui.line(
                    Line::new(line.points.clone())
                        .stroke(stroke_from_style(&line.style))
                        .name(line.name.clone()),
                );
            }
        }
    }
}

fn stroke_from_style(style: &Style) -> egui::Stroke {
    egui::Stroke::new(style.width, color32(style.color))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tailmark_lib::plot::{figure_from_trace, Color};
    use tailmark_lib::{AnnotatorConfig, Behavior, Interval, RecordingStore, TimeSeries};

    fn raw_input() -> egui::RawInput {
        egui::RawInput {
            screen_rect: Some(egui::Rect::from_min_size(
                egui::Pos2::ZERO,
                egui::vec2(800.0, 600.0),
            )),
            ..egui::RawInput::default()
        }
    }

    fn sine_figure() -> Figure {
        let data = (0..100).map(|i| (i as f64 * 0.1).sin()).collect();
        let trace = TimeSeries { fs: 10.0, data };
        figure_from_trace(&trace, 4096, Color(0xFF0000))
    }

    fn shaded_layer() -> OverlayLayer {
        let config = AnnotatorConfig::default();
        let mut store = RecordingStore::new(config.frame_rate, config.trace_channels);
        let interval = Interval {
            id: store.allocate_interval_id(),
            label: Behavior(1),
            start: 2.0,
            end: 4.0,
        };
        let mut layer = OverlayLayer::new();
        layer.set_label_y(0.9);
        layer.attach_overlays(&[interval], &config);
        layer
    }

    #[test]
    fn y_axis_holds_steady_across_repaints() {
        let ctx = egui::Context::default();
        let figure = sine_figure();
        let layer = shaded_layer();
        let mut spans = Vec::new();
        for _ in 0..30 {
            let _ = ctx.run(raw_input(), |ctx| {
                egui::CentralPanel::default().show(ctx, |ui| {
                    let response = tail_plot("steady", &figure, true)
                        .show(ui, |plot_ui| plot_tail_trace(plot_ui, &figure, &layer, None));
                    let bounds = response.transform.bounds();
                    spans.push((bounds.min()[1], bounds.max()[1]));
                });
            });
        }
        let (lo, hi) = spans[2];
        assert!(lo >= -1.5 && hi <= 1.5, "first frames already wide: {lo}..{hi}");
        for &(later_lo, later_hi) in &spans[3..] {
            assert!((later_lo - lo).abs() < 1e-9, "y min drifted to {later_lo}");
            assert!((later_hi - hi).abs() < 1e-9, "y max drifted to {later_hi}");
        }
    }

    #[test]
    fn labels_center_on_their_anchor() {
        assert_eq!(LABEL_ANCHOR.x(), egui::Align::Center);
        assert_eq!(LABEL_ANCHOR.y(), egui::Align::Center);
    }

    #[test]
    fn flat_traces_still_get_visible_shading() {
        let trace = TimeSeries {
            fs: 10.0,
            data: vec![0.0; 20],
        };
        let figure = figure_from_trace(&trace, 4096, Color(0));
        assert_eq!(region_span(&figure), (-1.0, 1.0));
        let (lo, hi) = region_span(&sine_figure());
        assert!(lo < -0.99 && hi > 0.99 && hi < 1.0);
    }
}
