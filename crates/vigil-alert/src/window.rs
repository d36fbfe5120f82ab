use crate::rules::threshold::MetricSource;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use vigil_common::types::{self, Aggregation, Labels, MetricDataPoint};

/// Time-bounded buffer of samples for one series, oldest first.
pub struct SlidingWindow {
    /// `None` keeps every sample.
    span: Option<Duration>,
    data: VecDeque<(DateTime<Utc>, f64)>,
}

impl SlidingWindow {
    pub fn new(window_secs: u64) -> Self {
        Self {
            span: types::seconds(window_secs),
            data: VecDeque::new(),
        }
    }

    /// Inserts a sample, keeping timestamp order for late arrivals.
    pub fn push(&mut self, timestamp: DateTime<Utc>, value: f64) {
        match self.data.back() {
            Some((last, _)) if *last > timestamp => {
                let idx = self.data.partition_point(|(ts, _)| *ts <= timestamp);
                self.data.insert(idx, (timestamp, value));
            }
            _ => self.data.push_back((timestamp, value)),
        }
    }

    pub fn evict(&mut self, now: DateTime<Utc>) {
        let Some(cutoff) = self.span.and_then(|span| now.checked_sub_signed(span)) else {
            return;
        };
        while let Some((front, _)) = self.data.front() {
            if *front < cutoff {
                self.data.pop_front();
            } else {
                break;
            }
        }
    }

    /// Samples with `since <= ts <= now`.
    pub fn range(
        &self,
        since: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> impl Iterator<Item = &(DateTime<Utc>, f64)> {
        self.data
            .iter()
            .filter(move |(ts, _)| *ts >= since && *ts <= now)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

type SeriesKey = (String, Labels);

/// In-memory metric backend for the built-in threshold evaluator.
///
/// Samples are kept per `(metric, labels)` series for at most `retention_secs`.
/// A query selects every series of the metric whose labels contain the
/// filter, merges their samples inside the window and aggregates them.
pub struct MetricStore {
    retention_secs: u64,
    series: RwLock<HashMap<SeriesKey, SlidingWindow>>,
}

impl MetricStore {
    pub fn new(retention_secs: u64) -> Self {
        Self {
            retention_secs: retention_secs.max(1),
            series: RwLock::new(HashMap::new()),
        }
    }

    pub fn ingest(&self, point: MetricDataPoint) {
        let now = Utc::now();
        let mut series = self.series.write();
        let window = series
            .entry((point.metric_name, point.labels))
            .or_insert_with(|| SlidingWindow::new(self.retention_secs));
        window.push(point.timestamp, point.value);
        window.evict(now);
    }

    pub fn ingest_batch(&self, points: impl IntoIterator<Item = MetricDataPoint>) -> usize {
        let mut count = 0;
        for point in points {
            self.ingest(point);
            count += 1;
        }
        count
    }

    pub fn series_count(&self) -> usize {
        self.series.read().len()
    }

    /// Drops samples past retention and any series left empty.
    pub fn compact(&self, now: DateTime<Utc>) {
        let mut series = self.series.write();
        for window in series.values_mut() {
            window.evict(now);
        }
        series.retain(|_, w| !w.is_empty());
    }

    pub fn query_at(
        &self,
        metric: &str,
        filter: &Labels,
        window: Duration,
        aggregation: Aggregation,
        now: DateTime<Utc>,
    ) -> Result<Option<f64>> {
        let since = now.checked_sub_signed(window).ok_or_else(|| {
            anyhow!(
                "window of {}s on '{metric}' reaches past the representable time range",
                window.num_seconds()
            )
        })?;
        let series = self.series.read();
        let mut samples: Vec<(DateTime<Utc>, f64)> = series
            .iter()
            .filter(|((name, labels), _)| {
                name == metric && filter.iter().all(|(k, v)| labels.get(k) == Some(v))
            })
            .flat_map(|(_, w)| w.range(since, now).copied())
            .collect();
        drop(series);

        if samples.is_empty() {
            return Ok(None);
        }
        samples.sort_by(|a, b| a.0.cmp(&b.0));
        let values: Vec<f64> = samples.into_iter().map(|(_, v)| v).collect();
        Ok(aggregation.apply(&values))
    }
}

#[async_trait]
impl MetricSource for MetricStore {
    async fn query(
        &self,
        metric: &str,
        labels: &Labels,
        window: Duration,
        aggregation: Aggregation,
        now: DateTime<Utc>,
    ) -> Result<Option<f64>> {
        self.query_at(metric, labels, window, aggregation, now)
    }
}
