use serde::{Deserialize, Serialize};

/// Per-frame tail angle vectors, frames × joints, row-major.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TailAngles {
    joints: usize,
    data: Vec<f64>,
}

impl TailAngles {
    /// Build from rows that all share the same width. Returns `None` when the
    /// rows are ragged or carry no joint columns.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Option<Self> {
        let joints = rows.first().map(|row| row.len())?;
        if joints == 0 || rows.iter().any(|row| row.len() != joints) {
            return None;
        }
        let data = rows.into_iter().flatten().collect();
        Some(Self { joints, data })
    }

    pub fn frames(&self) -> usize {
        self.data.len() / self.joints
    }

    pub fn joints(&self) -> usize {
        self.joints
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn frame(&self, index: usize) -> Option<&[f64]> {
        let start = index.checked_mul(self.joints)?;
        self.data.get(start..start + self.joints)
    }

    /// NaN-aware mean of the last `channels` joints for every frame. Frames
    /// where all those joints are NaN stay NaN.
    pub fn tail_trace(&self, channels: usize) -> Vec<f64> {
        let take = channels.clamp(1, self.joints);
        self.data
            .chunks_exact(self.joints)
            .map(|row| nan_mean(&row[self.joints - take..]))
            .collect()
    }
}

/// Uniformly sampled trace derived from a recording.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSeries {
    /// Uniform sampling frequency in Hz
    pub fs: f64,
    pub data: Vec<f64>,
}

impl TimeSeries {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn duration(&self) -> f64 {
        self.data.len() as f64 / self.fs
    }

    pub fn points(&self) -> Vec<[f64; 2]> {
        let dt = 1.0 / self.fs;
        self.data
            .iter()
            .enumerate()
            .map(|(i, value)| [i as f64 * dt, *value])
            .collect()
    }

    /// Smallest finite sample, ignoring NaN gaps.
    pub fn nan_min(&self) -> Option<f64> {
        self.data
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(None, |acc, v| Some(acc.map_or(v, |m: f64| m.min(v))))
    }

    /// Largest finite sample, ignoring NaN gaps.
    pub fn nan_max(&self) -> Option<f64> {
        self.data
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(None, |acc, v| Some(acc.map_or(v, |m: f64| m.max(v))))
    }
}

/// Frame shown for a cursor time: `floor(time * fs)`. Negative times map
/// to `None`.
pub fn frame_at(time: f64, fs: f64) -> Option<usize> {
    let frame = (time * fs).floor();
    (frame.is_finite() && frame >= 0.0).then_some(frame as usize)
}

fn nan_mean(values: &[f64]) -> f64 {
    let (sum, count) = values
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}
