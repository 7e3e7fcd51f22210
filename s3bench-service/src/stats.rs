//! Per-round latency and throughput statistics.
//!
//! [`Stats`] keeps running sums together with every [`Measurement`] of a round. Percentiles are
//! exact nearest-rank values over the full sample rather than streaming estimates: for percentile
//! `p` over `n` samples sorted by latency, the value at index `floor(n * p) - 1` is reported,
//! clamped to the bounds of the sample.

use std::time::{Duration, Instant};

use crate::datamodel::Measurement;

/// Column header matching [`Stats::data`].
pub const HEADER: [&str; 10] = [
    "Test",
    "Throughput",
    "Rate",
    "avg",
    "p25",
    "p50",
    "p75",
    "p90",
    "p99",
    "max",
];

const NANOS_PER_MILLI: f64 = 1_000_000.0;

/// Latency summary of a round, in milliseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LatencySummary {
    pub min: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p99: f64,
    pub max: f64,
    pub avg: f64,
}

/// Aggregated results of one round.
///
/// Updates are expected from a single consumer. The type does no internal locking.
#[derive(Clone, Debug)]
pub struct Stats {
    title: String,
    start: Instant,
    count: u64,
    sum_bytes: u64,
    sum_latency_nanos: u64,
    samples: Vec<Measurement>,
    rate: f64,
    object_rate: f64,
    latency: LatencySummary,
}

impl Stats {
    /// Creates empty statistics, starting the round clock now.
    pub fn new(title: impl Into<String>) -> Self {
        Self::started_at(title, Instant::now())
    }

    /// Creates empty statistics for a round that started at `start`.
    pub fn started_at(title: impl Into<String>, start: Instant) -> Self {
        Self {
            title: title.into(),
            start,
            count: 0,
            sum_bytes: 0,
            sum_latency_nanos: 0,
            samples: Vec::new(),
            rate: 0.0,
            object_rate: 0.0,
            latency: LatencySummary::default(),
        }
    }

    /// Records a completed operation and recomputes the throughput figures.
    pub fn update(&mut self, measurement: Measurement) {
        self.update_at(measurement, Instant::now());
    }

    fn update_at(&mut self, measurement: Measurement, now: Instant) {
        self.sum_bytes += measurement.size;
        self.sum_latency_nanos += measurement.latency.as_nanos() as u64;
        self.samples.push(measurement);
        self.count += 1;

        let elapsed = now.saturating_duration_since(self.start).as_secs_f64();
        if elapsed > 0.0 {
            self.rate = self.sum_bytes as f64 / elapsed;
            self.object_rate = self.count as f64 / elapsed;
        }
    }

    /// Recomputes the latency summary from the sample.
    ///
    /// Sorts the sample in place. Leaves the previous summary untouched if nothing was recorded.
    pub fn refresh(&mut self) {
        if self.count == 0 {
            return;
        }

        self.samples.sort_by_key(|m| m.latency);
        let at = |p: f64| millis(self.samples[percentile_index(self.samples.len(), p)].latency);

        self.latency = LatencySummary {
            min: millis(self.samples[0].latency),
            p25: at(0.25),
            p50: at(0.50),
            p75: at(0.75),
            p90: at(0.90),
            p99: at(0.99),
            max: millis(self.samples[self.samples.len() - 1].latency),
            avg: self.sum_latency_nanos as f64 / self.count as f64 / NANOS_PER_MILLI,
        };
    }

    /// Returns one report row, in the order of [`HEADER`].
    pub fn data(&self) -> Vec<String> {
        let latency = &self.latency;
        vec![
            self.title.clone(),
            format!("{}/s", byte_format(self.rate)),
            format!("{:.0} obj/s", self.object_rate),
            format!("{:.0}", latency.avg),
            format!("{:.0}", latency.p25),
            format!("{:.0}", latency.p50),
            format!("{:.0}", latency.p75),
            format!("{:.0}", latency.p90),
            format!("{:.0}", latency.p99),
            format!("{:.0}", latency.max),
        ]
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Number of recorded operations.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Total bytes transferred.
    pub fn sum_bytes(&self) -> u64 {
        self.sum_bytes
    }

    /// Every recorded measurement. Sorted by latency after [`refresh`](Self::refresh).
    pub fn samples(&self) -> &[Measurement] {
        &self.samples
    }

    /// Bytes per second since the round started.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Operations per second since the round started.
    pub fn object_rate(&self) -> f64 {
        self.object_rate
    }

    /// The summary computed by the last [`refresh`](Self::refresh).
    pub fn latency(&self) -> &LatencySummary {
        &self.latency
    }
}

/// Index of percentile `p` in a sorted sample of `count` elements.
fn percentile_index(count: usize, p: f64) -> usize {
    let rank = (count as f64 * p).floor() as usize;
    rank.saturating_sub(1).min(count.saturating_sub(1))
}

fn millis(duration: Duration) -> f64 {
    duration.as_nanos() as f64 / NANOS_PER_MILLI
}

/// Formats a byte count as KiB or MiB.
fn byte_format(bytes: f64) -> String {
    if bytes >= 1024.0 * 1024.0 {
        format!("{:.2} MiB", bytes / 1024.0 / 1024.0)
    } else {
        format!("{:.2} KiB", bytes / 1024.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn measurement(latency_ms: u64, size: u64) -> Measurement {
        Measurement {
            latency: Duration::from_millis(latency_ms),
            size,
        }
    }

    #[test]
    fn four_uploads() {
        let mut stats = Stats::new("PUT 4");
        for (latency, size) in [(3, 30), (1, 10), (4, 40), (2, 20)] {
            stats.update(measurement(latency, size));
        }
        stats.refresh();

        let latency = stats.latency();
        assert_eq!(stats.count(), 4);
        assert_eq!(stats.sum_bytes(), 100);
        assert_eq!(latency.avg, 2.5);
        assert_eq!(latency.min, 1.0);
        assert_eq!(latency.max, 4.0);
        // floor(4 * 0.5) - 1 = 1, the second-smallest latency
        assert_eq!(latency.p50, 2.0);
        assert_eq!(latency.p25, 1.0);
        assert_eq!(latency.p75, 3.0);
        assert_eq!(latency.p99, 3.0);
    }

    #[test]
    fn count_matches_sample() {
        let mut stats = Stats::new("GET 1");
        for i in 0..50 {
            stats.update(measurement(i % 7, i));
            assert_eq!(stats.count() as usize, stats.samples().len());
        }
    }

    #[test]
    fn percentiles_are_monotonic() {
        let mut stats = Stats::new("GET 8");
        for i in 0..1000u64 {
            // a scrambled but deterministic latency distribution
            stats.update(measurement((i * 7919) % 997, 1));
        }
        stats.refresh();

        let l = stats.latency();
        let ordered = [l.min, l.p25, l.p50, l.p75, l.p90, l.p99, l.max];
        assert!(ordered.windows(2).all(|w| w[0] <= w[1]), "{ordered:?}");
        assert!(l.min <= l.avg && l.avg <= l.max);
    }

    #[test]
    fn single_sample_clamps_indices() {
        let mut stats = Stats::new("DEL 1");
        stats.update(measurement(7, 0));
        stats.refresh();

        let l = stats.latency();
        assert_eq!([l.min, l.p25, l.p50, l.p99, l.max], [7.0; 5]);
    }

    #[test]
    fn refresh_without_samples_is_noop() {
        let mut stats = Stats::new("GET 16");
        stats.refresh();

        assert_eq!(stats.count(), 0);
        assert_eq!(stats.latency(), &LatencySummary::default());
        assert_eq!(stats.rate(), 0.0);
        assert!(stats.data().iter().all(|field| !field.contains("NaN")));
    }

    #[test]
    fn rates_use_elapsed_time() {
        let start = Instant::now();
        let mut stats = Stats::started_at("PUT 2", start);
        stats.update_at(measurement(1, 2048), start + Duration::from_secs(1));
        stats.update_at(measurement(1, 2048), start + Duration::from_secs(2));

        assert_eq!(stats.rate(), 2048.0);
        assert_eq!(stats.object_rate(), 1.0);
    }

    #[test]
    fn percentile_indices() {
        assert_eq!(percentile_index(4, 0.5), 1);
        assert_eq!(percentile_index(4, 0.25), 0);
        assert_eq!(percentile_index(3, 0.25), 0);
        assert_eq!(percentile_index(100, 0.99), 98);
        assert_eq!(percentile_index(100, 0.90), 89);
        assert_eq!(percentile_index(1, 0.99), 0);
    }

    #[test]
    fn formats_report_row() {
        let start = Instant::now();
        let mut stats = Stats::started_at("PUT 16", start);
        stats.update_at(measurement(12, 3 * 1024 * 1024), start + Duration::from_secs(1));
        stats.refresh();

        assert_eq!(
            stats.data(),
            ["PUT 16", "3.00 MiB/s", "1 obj/s", "12", "12", "12", "12", "12", "12", "12"]
        );
        assert_eq!(byte_format(512.0), "0.50 KiB");
    }
}
