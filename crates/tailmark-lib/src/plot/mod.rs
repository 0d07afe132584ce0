use serde::{Deserialize, Serialize};

use crate::signal::TimeSeries;

pub mod overlay;

pub use overlay::*;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Axis {
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Style {
    pub width: f32,
    pub color: Color,
}

/// Packed `0xRRGGBB`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color(pub u32);

impl Color {
    pub fn rgb(&self) -> (u8, u8, u8) {
        let r = ((self.0 >> 16) & 0xFF) as u8;
        let g = ((self.0 >> 8) & 0xFF) as u8;
        let b = (self.0 & 0xFF) as u8;
        (r, g, b)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub style: Style,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Series {
    Line(LineSeries),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Figure {
    pub title: Option<String>,
    pub x: Axis,
    pub y: Axis,
    pub series: Vec<Series>,
    /// Full x extent of the data, before decimation.
    pub x_max: f64,
    /// Finite y extent of the data, when it has any finite sample.
    pub y_range: Option<(f64, f64)>,
}

impl Figure {
    pub fn new(title: impl Into<Option<String>>) -> Self {
        Self {
            title: title.into(),
            x: Axis { label: None },
            y: Axis { label: None },
            series: Vec::new(),
            x_max: 0.0,
            y_range: None,
        }
    }

    pub fn add_series(&mut self, series: Series) {
        self.series.push(series);
    }
}

/// Reduce `points` to at most `max_points` while keeping every bucket's
/// lowest and highest sample, so short spikes survive at any zoom level.
/// Points within a bucket stay in x order.
pub fn decimate_points(points: &[[f64; 2]], max_points: usize) -> Vec<[f64; 2]> {
    if points.len() <= max_points {
        return points.to_vec();
    }
    let buckets = (max_points / 2).max(1);
    let bucket_size = points.len() as f64 / buckets as f64;
    let mut result = Vec::with_capacity(buckets * 2);
    for i in 0..buckets {
        let start = (i as f64 * bucket_size).floor() as usize;
        let end = (((i + 1) as f64 * bucket_size).floor() as usize).min(points.len());
        if start >= end {
            continue;
        }
        let bucket = &points[start..end];
        let finite = bucket
            .iter()
            .enumerate()
            .filter(|(_, point)| point[1].is_finite());
        let lowest = finite
            .clone()
            .min_by(|a, b| a.1[1].total_cmp(&b.1[1]))
            .map(|(idx, _)| idx);
        let highest = finite
            .max_by(|a, b| a.1[1].total_cmp(&b.1[1]))
            .map(|(idx, _)| idx);
        match (lowest, highest) {
            (Some(lo), Some(hi)) if lo == hi => result.push(bucket[lo]),
            (Some(lo), Some(hi)) => {
                result.push(bucket[lo.min(hi)]);
                result.push(bucket[lo.max(hi)]);
            }
            // An all-NaN bucket keeps one point so the gap stays visible.
            _ => result.push(bucket[0]),
        }
    }
    result
}

/// Tail trace figure with time on x and angle on y.
pub fn figure_from_trace(trace: &TimeSeries, max_points: usize, color: Color) -> Figure {
    let decimated = decimate_points(&trace.points(), max_points);
    let mut fig = Figure::new(Some("Tail angle".to_string()));
    fig.x.label = Some("Time (s)".into());
    fig.y.label = Some("Tail Angle".into());
    fig.x_max = trace.len().saturating_sub(1) as f64 / trace.fs;
    fig.y_range = trace.nan_min().zip(trace.nan_max());
    fig.add_series(Series::Line(LineSeries {
        name: "tail".into(),
        points: decimated,
        style: Style { width: 2.0, color },
    }));
    fig
}
