use std::io::Write;

use serde::Serialize;
use tabwriter::TabWriter;

use crate::dataset::Dataset;
use crate::lttb::Threshold;
use crate::record::RawKey;
use crate::series::Point;

/// Shape of one segment: how many points and which keys it spans.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub segment: String,
    pub points: usize,
    pub first: Option<RawKey>,
    pub last: Option<RawKey>,
}

#[derive(Debug, Serialize)]
pub struct Report {
    pub threshold: usize,
    pub points: usize,
    pub sampled: usize,
    pub segments: Vec<SegmentReport>,
}

#[derive(Debug, Serialize)]
pub struct SegmentReport {
    pub segment: String,
    pub points: usize,
    pub sampled: usize,
    pub ratio: f64,
    pub first: Option<RawKey>,
    pub last: Option<RawKey>,
}

impl Report {
    /// Pairs up the summaries of a dataset before and after downsampling.
    pub fn new(threshold: Threshold, before: &[Summary], after: &[Summary]) -> Self {
        let segments: Vec<SegmentReport> = before
            .iter()
            .map(|b| {
                let sampled = after
                    .iter()
                    .find(|a| a.segment == b.segment)
                    .map_or(0, |a| a.points);
                SegmentReport {
                    segment: b.segment.clone(),
                    points: b.points,
                    sampled,
                    ratio: ratio(sampled, b.points),
                    first: b.first,
                    last: b.last,
                }
            })
            .collect();

        Report {
            threshold: match threshold {
                Threshold::Unbounded => 0,
                Threshold::Max(max) => max,
            },
            points: segments.iter().map(|s| s.points).sum(),
            sampled: segments.iter().map(|s| s.sampled).sum(),
            segments,
        }
    }
}

fn ratio(sampled: usize, points: usize) -> f64 {
    if points == 0 {
        0.0
    } else {
        sampled as f64 / points as f64
    }
}

fn key_string(key: &Option<RawKey>) -> String {
    key.map_or_else(|| "-".to_string(), |k| k.to_string())
}

pub fn report_text(r: &Report, w: &mut dyn Write) -> eyre::Result<()> {
    let mut tw = TabWriter::new(w);

    writeln!(tw, "Segment\tPoints\tSampled\tRatio\tFirst\tLast")?;
    for s in &r.segments {
        writeln!(
            tw,
            "{}\t{}\t{}\t{:.2}%\t{}\t{}",
            s.segment,
            s.points,
            s.sampled,
            s.ratio * 100.0,
            key_string(&s.first),
            key_string(&s.last),
        )?;
    }
    writeln!(
        tw,
        "Total\t{}\t{}\t{:.2}%\t\t",
        r.points,
        r.sampled,
        ratio(r.sampled, r.points) * 100.0,
    )?;

    tw.flush()?;
    Ok(())
}

pub fn report_json(r: &Report, w: &mut dyn Write) -> eyre::Result<()> {
    serde_json::to_writer(&mut *w, r)?;
    w.write_all(b"\n")?;
    Ok(())
}

#[derive(Serialize)]
struct ChartSeries<'a> {
    name: &'a str,
    data: Vec<(RawKey, f64)>,
}

fn chart_series<'a, K: Copy>(
    segment: &'a str,
    points: &[Point<K>],
    key: fn(K) -> RawKey,
) -> ChartSeries<'a> {
    ChartSeries {
        name: segment,
        data: points.iter().map(|p| (key(p.key), p.value)).collect(),
    }
}

/// Writes `[{"name": segment, "data": [[key, value], ...]}, ...]`, the payload
/// charting libraries take for multi-series line charts.
pub fn write_chart_json(dataset: &Dataset, w: &mut dyn Write) -> eyre::Result<()> {
    let payload: Vec<ChartSeries> = match dataset {
        Dataset::Numeric(segments) => segments
            .iter()
            .map(|(segment, points)| chart_series(segment, points, RawKey::Numeric))
            .collect(),
        Dataset::Temporal(segments) => segments
            .iter()
            .map(|(segment, points)| chart_series(segment, points, RawKey::Time))
            .collect(),
    };
    serde_json::to_writer(&mut *w, &payload)?;
    w.write_all(b"\n")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use std::time::{Duration, UNIX_EPOCH};

    fn summary(segment: &str, points: usize) -> Summary {
        Summary {
            segment: segment.to_string(),
            points,
            first: Some(RawKey::Numeric(0.0)),
            last: Some(RawKey::Numeric(points as f64 - 1.0)),
        }
    }

    #[test]
    fn report_pairs_segments() {
        let before = [summary("a", 100), summary("b", 3)];
        let after = [summary("a", 10), summary("b", 3)];
        let r = Report::new(Threshold::Max(10), &before, &after);
        assert_eq!(r.threshold, 10);
        assert_eq!(r.points, 103);
        assert_eq!(r.sampled, 13);
        assert_eq!(r.segments[0].ratio, 0.1);
        assert_eq!(r.segments[1].ratio, 1.0);
    }

    #[test]
    fn text_report_lists_segments_and_total() {
        let r = Report::new(
            Threshold::Max(10),
            &[summary("device-1", 100)],
            &[summary("device-1", 10)],
        );
        let mut buf = Vec::new();
        report_text(&r, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Segment"));
        assert!(lines[1].starts_with("device-1"));
        assert!(lines[1].contains("10.00%"));
        assert!(lines[2].starts_with("Total"));
    }

    #[test]
    fn json_report() {
        let r = Report::new(Threshold::Unbounded, &[summary("a", 2)], &[summary("a", 2)]);
        let mut buf = Vec::new();
        report_json(&r, &mut buf).unwrap();
        let v: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(v["threshold"], 0);
        assert_eq!(v["segments"][0]["segment"], "a");
        assert_eq!(v["segments"][0]["last"], 1.0);
    }

    #[test]
    fn chart_payload() {
        let t = UNIX_EPOCH + Duration::from_secs(1_577_836_800);
        let dataset = Dataset::from_records(vec![
            Record::new(Some("d1".into()), t, 10.0),
            Record::new(Some("d1".into()), t + Duration::from_secs(60), 11.5),
        ])
        .unwrap();
        let mut buf = Vec::new();
        write_chart_json(&dataset, &mut buf).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "[{\"name\":\"d1\",\"data\":[[\"2020-01-01T00:00:00.000000Z\",10.0],\
             [\"2020-01-01T00:01:00.000000Z\",11.5]]}]\n"
        );
    }
}
