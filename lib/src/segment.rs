use std::collections::BTreeMap;
use std::sync::Arc;

use eyre::Result;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::Error;
use crate::lttb::{downsample_with, Threshold};
use crate::series::{Key, Point};

/// Independent series keyed by the segment they belong to.
pub type Segments<G, K> = BTreeMap<G, Vec<Point<K>>>;

/// Groups rows by segment. Rows keep their relative order within a segment.
pub fn partition<G, K, I>(rows: I) -> Segments<G, K>
where
    G: Ord,
    I: IntoIterator<Item = (G, Point<K>)>,
{
    let mut segments: Segments<G, K> = BTreeMap::new();
    for (segment, point) in rows {
        segments.entry(segment).or_default().push(point);
    }
    segments
}

/// Partitions `rows` and downsamples every segment on its own. Buckets never
/// span two segments.
pub fn downsample_segments<G, K, I>(rows: I, threshold: i64) -> Result<Segments<G, K>, Error>
where
    G: Ord,
    K: Key,
    I: IntoIterator<Item = (G, Point<K>)>,
{
    let threshold = Threshold::try_from(threshold)?;
    Ok(partition(rows)
        .into_iter()
        .map(|(segment, series)| {
            let sampled = downsample_with(&series, threshold);
            (segment, sampled)
        })
        .collect())
}

/// Downsamples every segment on the blocking pool, at most `workers` at a time.
pub async fn downsample_concurrent<G, K>(
    segments: Segments<G, K>,
    threshold: Threshold,
    workers: usize,
) -> Result<Segments<G, K>>
where
    G: Ord + Send + 'static,
    K: Key + Send + 'static,
{
    let permits = Arc::new(Semaphore::new(workers.max(1)));
    let mut tasks = JoinSet::new();

    for (segment, series) in segments {
        let permit = permits.clone().acquire_owned().await?;
        tasks.spawn_blocking(move || {
            let _permit = permit;
            let sampled = downsample_with(&series, threshold);
            tracing::debug!(
                points = series.len(),
                sampled = sampled.len(),
                "segment downsampled"
            );
            (segment, sampled)
        });
    }

    let mut downsampled = BTreeMap::new();
    while let Some(joined) = tasks.join_next().await {
        let (segment, sampled) = joined.map_err(|e| eyre::eyre!("downsample task failed: {}", e))?;
        downsampled.insert(segment, sampled);
    }
    Ok(downsampled)
}
