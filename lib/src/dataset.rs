use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::time::SystemTime;

use crate::error::Error;
use crate::lttb::Threshold;
use crate::record::{RawKey, Record};
use crate::reporters::Summary;
use crate::segment::{downsample_concurrent, Segments};
use crate::series::Point;

/// Segment name for records that don't carry one.
pub const DEFAULT_SEGMENT: &str = "all";

/// Segmented series whose key domain was fixed by the first record read.
#[derive(Debug, Clone, PartialEq)]
pub enum Dataset {
    Numeric(Segments<String, f64>),
    Temporal(Segments<String, SystemTime>),
}

impl Dataset {
    /// Groups `records` by segment and sorts every segment by key.
    pub fn from_records(records: Vec<Record>) -> Result<Self, Error> {
        let mut records = records.into_iter().enumerate();
        let Some((_, first)) = records.next() else {
            return Ok(Dataset::Numeric(BTreeMap::new()));
        };

        let mut dataset = match first.key {
            RawKey::Numeric(_) => Dataset::Numeric(BTreeMap::new()),
            RawKey::Time(_) => Dataset::Temporal(BTreeMap::new()),
        };
        dataset.push(0, first)?;
        for (i, record) in records {
            dataset.push(i, record)?;
        }

        match &mut dataset {
            Dataset::Numeric(segments) => sort_segments(segments),
            Dataset::Temporal(segments) => sort_segments(segments),
        }
        Ok(dataset)
    }

    fn push(&mut self, i: usize, record: Record) -> Result<(), Error> {
        if !record.value.is_finite() {
            return Err(Error::NonFiniteValue {
                record: i + 1,
                value: record.value,
            });
        }

        let segment = record
            .segment
            .unwrap_or_else(|| DEFAULT_SEGMENT.to_string());
        match (self, record.key) {
            (Dataset::Numeric(segments), RawKey::Numeric(key)) => {
                segments
                    .entry(segment)
                    .or_default()
                    .push(Point::new(key, record.value));
            }
            (Dataset::Temporal(segments), RawKey::Time(key)) => {
                segments
                    .entry(segment)
                    .or_default()
                    .push(Point::new(key, record.value));
            }
            (dataset, key) => {
                return Err(Error::MixedKeyDomain {
                    record: i + 1,
                    expected: dataset.domain_name(),
                    found: key.domain_name(),
                })
            }
        }
        Ok(())
    }

    pub fn domain_name(&self) -> &'static str {
        match self {
            Dataset::Numeric(_) => "numeric",
            Dataset::Temporal(_) => "timestamp",
        }
    }

    /// Total number of points across segments.
    pub fn len(&self) -> usize {
        match self {
            Dataset::Numeric(segments) => segments.values().map(Vec::len).sum(),
            Dataset::Temporal(segments) => segments.values().map(Vec::len).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keeps only points with `from <= key <= until`. Segments left empty are dropped.
    pub fn window(&mut self, from: Option<RawKey>, until: Option<RawKey>) -> Result<(), Error> {
        match self {
            Dataset::Numeric(segments) => {
                let from = bound(from, "numeric", |k| match k {
                    RawKey::Numeric(n) => Some(n),
                    RawKey::Time(_) => None,
                })?;
                let until = bound(until, "numeric", |k| match k {
                    RawKey::Numeric(n) => Some(n),
                    RawKey::Time(_) => None,
                })?;
                retain_window(segments, from, until);
            }
            Dataset::Temporal(segments) => {
                let from = bound(from, "timestamp", |k| match k {
                    RawKey::Time(t) => Some(t),
                    RawKey::Numeric(_) => None,
                })?;
                let until = bound(until, "timestamp", |k| match k {
                    RawKey::Time(t) => Some(t),
                    RawKey::Numeric(_) => None,
                })?;
                retain_window(segments, from, until);
            }
        }
        Ok(())
    }

    /// Downsamples every segment independently, `workers` at a time.
    pub async fn downsample(self, threshold: Threshold, workers: usize) -> eyre::Result<Self> {
        Ok(match self {
            Dataset::Numeric(segments) => {
                Dataset::Numeric(downsample_concurrent(segments, threshold, workers).await?)
            }
            Dataset::Temporal(segments) => {
                Dataset::Temporal(downsample_concurrent(segments, threshold, workers).await?)
            }
        })
    }

    pub fn summaries(&self) -> Vec<Summary> {
        match self {
            Dataset::Numeric(segments) => summarize(segments, RawKey::Numeric),
            Dataset::Temporal(segments) => summarize(segments, RawKey::Time),
        }
    }

    /// Flattens back into records, segment by segment.
    pub fn into_records(self) -> Vec<Record> {
        match self {
            Dataset::Numeric(segments) => flatten(segments, RawKey::Numeric),
            Dataset::Temporal(segments) => flatten(segments, RawKey::Time),
        }
    }
}

fn sort_segments<K: PartialOrd>(segments: &mut Segments<String, K>) {
    for points in segments.values_mut() {
        points.sort_by(|a, b| a.key.partial_cmp(&b.key).unwrap_or(Ordering::Equal));
    }
}

fn bound<K>(
    key: Option<RawKey>,
    expected: &'static str,
    extract: impl Fn(RawKey) -> Option<K>,
) -> Result<Option<K>, Error> {
    match key {
        None => Ok(None),
        Some(key) => extract(key).map(Some).ok_or(Error::WindowBound {
            expected,
            found: key.domain_name(),
        }),
    }
}

fn retain_window<K: PartialOrd + Copy>(
    segments: &mut Segments<String, K>,
    from: Option<K>,
    until: Option<K>,
) {
    for points in segments.values_mut() {
        points.retain(|p| {
            from.map_or(true, |from| p.key >= from) && until.map_or(true, |until| p.key <= until)
        });
    }
    segments.retain(|_, points| !points.is_empty());
}

fn summarize<K: Copy>(segments: &Segments<String, K>, key: fn(K) -> RawKey) -> Vec<Summary> {
    segments
        .iter()
        .map(|(segment, points)| Summary {
            segment: segment.clone(),
            points: points.len(),
            first: points.first().map(|p| key(p.key)),
            last: points.last().map(|p| key(p.key)),
        })
        .collect()
}

fn flatten<K: Copy>(segments: Segments<String, K>, key: fn(K) -> RawKey) -> Vec<Record> {
    segments
        .into_iter()
        .flat_map(|(segment, points)| {
            points
                .into_iter()
                .map(move |p| Record::new(Some(segment.clone()), key(p.key), p.value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    fn jan(day: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(1_577_836_800 + (day - 1) * 86_400)
    }

    fn weather() -> Vec<Record> {
        let values = [10.0, 21.0, 19.0, 32.0, 12.0, 14.0, 18.0, 29.0, 23.0, 27.0, 14.0];
        let mut records: Vec<Record> = values
            .iter()
            .enumerate()
            .map(|(i, &v)| Record::new(Some("weather-pro-000001".into()), jan(i as u64 + 1), v))
            .collect();
        // Arrives out of order; the dataset sorts it.
        records.reverse();
        records.push(Record::new(Some("weather-pro-000002".into()), jan(1), 3.0));
        records
    }

    #[test]
    fn groups_and_sorts_records() {
        let dataset = Dataset::from_records(weather()).unwrap();
        let Dataset::Temporal(segments) = &dataset else {
            panic!("expected timestamp keys, got {:?}", dataset);
        };
        assert_eq!(segments.len(), 2);
        let first = &segments["weather-pro-000001"];
        assert_eq!(first.len(), 11);
        assert!(first.windows(2).all(|w| w[0].key < w[1].key));
        assert_eq!(dataset.len(), 12);
    }

    #[test]
    fn records_without_segment_share_default() {
        let dataset = Dataset::from_records(vec![
            Record::new(None, 2.0, 1.0),
            Record::new(None, 1.0, 2.0),
        ])
        .unwrap();
        assert_eq!(
            dataset,
            Dataset::Numeric(BTreeMap::from([(
                DEFAULT_SEGMENT.to_string(),
                vec![Point::new(1.0, 2.0), Point::new(2.0, 1.0)]
            )]))
        );
    }

    #[test]
    fn rejects_mixed_domains() {
        let err = Dataset::from_records(vec![
            Record::new(None, 1.0, 1.0),
            Record::new(None, jan(1), 2.0),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            Error::MixedKeyDomain {
                record: 2,
                expected: "numeric",
                found: "timestamp",
            }
        );
    }

    #[test]
    fn rejects_non_finite_values() {
        let err = Dataset::from_records(vec![Record::new(None, 1.0, f64::NAN)]).unwrap_err();
        assert!(matches!(err, Error::NonFiniteValue { record: 1, .. }));
    }

    #[test]
    fn empty_records() {
        let dataset = Dataset::from_records(Vec::new()).unwrap();
        assert!(dataset.is_empty());
        assert!(dataset.summaries().is_empty());
    }

    #[test]
    fn window_is_inclusive() {
        let mut dataset = Dataset::from_records(weather()).unwrap();
        dataset
            .window(Some(RawKey::Time(jan(2))), Some(RawKey::Time(jan(5))))
            .unwrap();
        let summaries = dataset.summaries();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].points, 4);
        assert_eq!(summaries[0].first, Some(RawKey::Time(jan(2))));
        assert_eq!(summaries[0].last, Some(RawKey::Time(jan(5))));
    }

    #[test]
    fn window_rejects_other_domain() {
        let mut dataset = Dataset::from_records(weather()).unwrap();
        assert_eq!(
            dataset.window(Some(RawKey::Numeric(3.0)), None),
            Err(Error::WindowBound {
                expected: "timestamp",
                found: "numeric",
            })
        );
    }

    #[tokio::test]
    async fn downsample_then_flatten() {
        let dataset = Dataset::from_records(weather()).unwrap();
        let downsampled = dataset.downsample(Threshold::Max(5), 2).await.unwrap();
        let records = downsampled.into_records();
        let first: Vec<(RawKey, f64)> = records
            .iter()
            .filter(|r| r.segment.as_deref() == Some("weather-pro-000001"))
            .map(|r| (r.key, r.value))
            .collect();
        assert_eq!(
            first,
            vec![
                (RawKey::Time(jan(1)), 10.0),
                (RawKey::Time(jan(4)), 32.0),
                (RawKey::Time(jan(5)), 12.0),
                (RawKey::Time(jan(8)), 29.0),
                (RawKey::Time(jan(11)), 14.0),
            ]
        );
        assert_eq!(records.len(), 6);
    }
}
