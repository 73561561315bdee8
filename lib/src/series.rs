use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// A single `(key, value)` sample of a series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point<K> {
    pub key: K,
    pub value: f64,
}

impl<K> Point<K> {
    pub fn new(key: K, value: f64) -> Self {
        Point { key, value }
    }
}

impl<K> From<(K, f64)> for Point<K> {
    fn from((key, value): (K, f64)) -> Self {
        Point { key, value }
    }
}

/// How the keys of a series map onto the plain numbers the algorithm works on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KeyDomain<K> {
    /// Keys are numbers already; offsets are the keys themselves.
    Numeric,
    /// Keys are offsets from the retained origin, the first key of the series.
    TemporalOffset(K),
}

/// A totally ordered series key that can be expressed as a numeric offset.
pub trait Key: Copy + PartialOrd {
    /// Resolves the domain of a series whose first key is `origin`.
    fn domain(origin: Self) -> KeyDomain<Self>;

    fn to_offset(self, domain: &KeyDomain<Self>) -> f64;

    fn from_offset(offset: f64, domain: &KeyDomain<Self>) -> Self;
}

// Numeric keys are their own offsets and always resolve to `KeyDomain::Numeric`.
impl Key for f64 {
    fn domain(_origin: Self) -> KeyDomain<Self> {
        KeyDomain::Numeric
    }

    fn to_offset(self, _domain: &KeyDomain<Self>) -> f64 {
        self
    }

    fn from_offset(offset: f64, _domain: &KeyDomain<Self>) -> Self {
        offset
    }
}

/// Keys beyond 2^53 lose precision as offsets. Downsampling copies the input
/// points it selects, so this only affects [`denormalize`].
impl Key for i64 {
    fn domain(_origin: Self) -> KeyDomain<Self> {
        KeyDomain::Numeric
    }

    fn to_offset(self, _domain: &KeyDomain<Self>) -> f64 {
        self as f64
    }

    fn from_offset(offset: f64, _domain: &KeyDomain<Self>) -> Self {
        offset.round() as i64
    }
}

/// Timestamps are offset in whole microseconds, the precision timestamps are
/// stored with. Sub-microsecond parts do not survive a round trip.
impl Key for SystemTime {
    fn domain(origin: Self) -> KeyDomain<Self> {
        KeyDomain::TemporalOffset(origin)
    }

    fn to_offset(self, domain: &KeyDomain<Self>) -> f64 {
        let origin = match domain {
            KeyDomain::Numeric => UNIX_EPOCH,
            KeyDomain::TemporalOffset(origin) => *origin,
        };
        match self.duration_since(origin) {
            Ok(d) => d.as_micros() as f64,
            Err(e) => -(e.duration().as_micros() as f64),
        }
    }

    fn from_offset(offset: f64, domain: &KeyDomain<Self>) -> Self {
        let origin = match domain {
            KeyDomain::Numeric => UNIX_EPOCH,
            KeyDomain::TemporalOffset(origin) => *origin,
        };
        let shift = Duration::from_micros(offset.abs().round() as u64);
        if offset < 0.0 {
            origin - shift
        } else {
            origin + shift
        }
    }
}

/// A series rewritten as `(offset, value)` pairs, plus what it takes to undo it.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedSeries<K> {
    pub points: Vec<(f64, f64)>,
    pub domain: KeyDomain<K>,
}

impl<K: Key> NormalizedSeries<K> {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn denormalize(&self) -> Vec<Point<K>> {
        denormalize(&self.points, &self.domain)
    }
}

/// Rewrites every key as a numeric offset. Timestamp keys become microseconds
/// since the first key; numeric keys pass through untouched.
pub fn normalize<K: Key>(series: &[Point<K>]) -> NormalizedSeries<K> {
    let Some(first) = series.first() else {
        return NormalizedSeries {
            points: Vec::new(),
            domain: KeyDomain::Numeric,
        };
    };

    let domain = K::domain(first.key);
    let points = series
        .iter()
        .map(|p| (p.key.to_offset(&domain), p.value))
        .collect();

    NormalizedSeries { points, domain }
}

/// Inverse of [`normalize`] for any subset of the normalized points.
pub fn denormalize<K: Key>(points: &[(f64, f64)], domain: &KeyDomain<K>) -> Vec<Point<K>> {
    points
        .iter()
        .map(|&(offset, value)| Point::new(K::from_offset(offset, domain), value))
        .collect()
}
