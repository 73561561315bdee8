//! Largest Triangle Three Buckets (LTTB) downsampling.
//!
//! Reduces a series sorted ascending by key to at most `threshold` points
//! while preserving its visual shape. The first and last points are always
//! kept; every interior bucket contributes the point forming the largest
//! triangle with the previously selected point and the average of the
//! following bucket.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::series::{normalize, Key, Point};

/// A validated downsampling threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Threshold {
    /// No downsampling at all. Spelled `0`.
    Unbounded,
    /// Keep at most this many points. Always at least 2.
    Max(usize),
}

impl Threshold {
    /// The number of points a series of `len` points is reduced to.
    pub fn output_len(&self, len: usize) -> usize {
        match *self {
            Threshold::Unbounded => len,
            Threshold::Max(max) => max.min(len),
        }
    }
}

impl TryFrom<i64> for Threshold {
    type Error = Error;

    fn try_from(threshold: i64) -> Result<Self> {
        match threshold {
            0 => Ok(Threshold::Unbounded),
            t if t < 2 => Err(Error::InvalidArgument(t)),
            t => usize::try_from(t)
                .map(Threshold::Max)
                .map_err(|_| Error::InvalidArgument(t)),
        }
    }
}

impl FromStr for Threshold {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let n: i64 = s
            .trim()
            .parse()
            .map_err(|_| Error::BadThreshold(s.to_string()))?;
        Threshold::try_from(n)
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Threshold::Unbounded => write!(f, "0"),
            Threshold::Max(max) => write!(f, "{}", max),
        }
    }
}

/// Downsamples `series` to at most `threshold` points.
///
/// A threshold of `0`, or one at least as large as the series, returns the
/// series unchanged. Thresholds of `1` and below zero are rejected before
/// any work is done.
pub fn downsample<K: Key>(series: &[Point<K>], threshold: i64) -> Result<Vec<Point<K>>> {
    let threshold = Threshold::try_from(threshold)?;
    Ok(downsample_with(series, threshold))
}

/// Like [`downsample`], with an already validated threshold. The returned
/// points are copies of input points, keys untouched.
pub fn downsample_with<K: Key>(series: &[Point<K>], threshold: Threshold) -> Vec<Point<K>> {
    if threshold.output_len(series.len()) == series.len() {
        return series.to_vec();
    }

    let normalized = normalize(series);
    let sampled: Vec<Point<K>> = lttb_indices(&normalized.points, threshold)
        .into_iter()
        .map(|i| series[i])
        .collect();
    tracing::trace!(
        points = series.len(),
        sampled = sampled.len(),
        %threshold,
        "downsampled series"
    );
    sampled
}

/// Indices of the points LTTB keeps, in ascending order.
pub fn lttb_indices(data: &[(f64, f64)], threshold: Threshold) -> Vec<usize> {
    let n = data.len();
    let limit = match threshold {
        Threshold::Max(limit) if (2..n).contains(&limit) => limit,
        _ => return (0..n).collect(),
    };

    let bucket_size = (n - 2) as f64 / (limit - 2) as f64;
    let last = limit.saturating_sub(3);

    let buckets = (0..limit - 2).map_while(|i| {
        let start = (i as f64 * bucket_size) as usize + 1;
        if start > n - 2 {
            return None;
        }
        // The last bucket runs up to the final point, which is averaged alone.
        if i == last {
            return Some((start..n - 1, n - 1..n));
        }
        let end = (((i + 1) as f64 * bucket_size) as usize + 1).min(n - 1);
        let next_end = (((i + 2) as f64 * bucket_size) as usize + 1).min(n);
        Some((start..end, end..next_end))
    });

    let mut selected = Vec::with_capacity(limit);
    selected.push(0);

    // The previously selected index is the only state carried between buckets.
    let (mut selected, _) =
        buckets.fold((selected, 0usize), |(mut selected, a_idx), (bucket, next)| {
            let avg = average(&data[next]).unwrap_or(data[n - 1]);
            let a = data[a_idx];

            let first = bucket.start;
            let (picked, _) = bucket.fold((first, -1.0f64), |(best, max_area), idx| {
                let area = triangle_area(a, data[idx], avg);
                if area > max_area {
                    (idx, area)
                } else {
                    (best, max_area)
                }
            });

            selected.push(picked);
            (selected, picked)
        });

    selected.push(n - 1);
    selected
}

fn average(points: &[(f64, f64)]) -> Option<(f64, f64)> {
    if points.is_empty() {
        return None;
    }
    let (sum_x, sum_y) = points
        .iter()
        .fold((0.0f64, 0.0f64), |(sx, sy), &(x, y)| (sx + x, sy + y));
    let len = points.len() as f64;
    Some((sum_x / len, sum_y / len))
}

fn triangle_area(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> f64 {
    let (ax, ay) = a;
    let (bx, by) = b;
    let (cx, cy) = c;
    0.5 * ((ax - cx) * (by - ay) - (ax - bx) * (cy - ay)).abs()
}
