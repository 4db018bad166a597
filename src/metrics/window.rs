//! Rolling window of N metric buckets, rotating on period boundaries
//! (§4.10). Bucket 0 is always "current"; higher indices are older.

use std::collections::VecDeque;

use serde_json::{json, Value};

use crate::packet::Timestamp;

use super::bucket::MetricBucket;

const DEFAULT_NUM_PERIODS: usize = 5;
const DEFAULT_PERIOD_LENGTH_SECS: u64 = 60;

pub struct WindowConfig {
    pub num_periods: usize,
    pub period_length_secs: u64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        WindowConfig {
            num_periods: DEFAULT_NUM_PERIODS,
            period_length_secs: DEFAULT_PERIOD_LENGTH_SECS,
        }
    }
}

pub struct MetricsWindow {
    config: WindowConfig,
    buckets: VecDeque<MetricBucket>,
}

impl MetricsWindow {
    pub fn new(config: WindowConfig, start_ts: Timestamp) -> Self {
        let mut buckets = VecDeque::with_capacity(config.num_periods.max(1));
        buckets.push_front(MetricBucket::new(start_ts));
        MetricsWindow { config, buckets }
    }

    /// Rotates if `ts` has crossed the current bucket's period boundary,
    /// then returns a mutable reference to the (possibly just-created)
    /// current bucket.
    pub fn current_bucket_for(&mut self, ts: Timestamp) -> &mut MetricBucket {
        let period_ms = (self.config.period_length_secs * 1000) as f64;
        let should_rotate = {
            let current = self.buckets.front().expect("window always has a current bucket");
            ts.millis_since(&current.start_ts) >= period_ms
        };

        if should_rotate {
            self.buckets.push_front(MetricBucket::new(ts));
            while self.buckets.len() > self.config.num_periods.max(1) {
                self.buckets.pop_back();
            }
        }

        self.buckets.front_mut().expect("just ensured a current bucket")
    }

    pub fn current_bucket(&self) -> &MetricBucket {
        self.buckets.front().expect("window always has a current bucket")
    }

    pub fn bucket(&self, idx: usize) -> Option<&MetricBucket> {
        self.buckets.get(idx)
    }

    pub fn num_buckets(&self) -> usize {
        self.buckets.len()
    }

    pub fn to_json(&self, bucket_idx: usize) -> Option<Value> {
        self.bucket(bucket_idx).map(MetricBucket::to_json)
    }

    pub fn to_json_all(&self) -> Value {
        json!(self.buckets.iter().map(MetricBucket::to_json).collect::<Vec<_>>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_a_single_current_bucket() {
        let window = MetricsWindow::new(WindowConfig::default(), Timestamp::from_secs_nanos(0, 0));
        assert_eq!(window.num_buckets(), 1);
    }

    #[test]
    fn does_not_rotate_within_the_same_period() {
        let mut window = MetricsWindow::new(WindowConfig::default(), Timestamp::from_secs_nanos(0, 0));
        window.current_bucket_for(Timestamp::from_secs_nanos(30, 0));
        assert_eq!(window.num_buckets(), 1);
    }

    #[test]
    fn rotates_on_period_boundary_crossing() {
        let mut window = MetricsWindow::new(WindowConfig::default(), Timestamp::from_secs_nanos(0, 0));
        window.current_bucket_for(Timestamp::from_secs_nanos(61, 0));
        assert_eq!(window.num_buckets(), 2);
    }

    #[test]
    fn drops_oldest_bucket_beyond_num_periods() {
        let config = WindowConfig {
            num_periods: 2,
            period_length_secs: 60,
        };
        let mut window = MetricsWindow::new(config, Timestamp::from_secs_nanos(0, 0));
        window.current_bucket_for(Timestamp::from_secs_nanos(61, 0));
        window.current_bucket_for(Timestamp::from_secs_nanos(122, 0));
        assert_eq!(window.num_buckets(), 2);
    }

    #[test]
    fn no_event_updates_a_non_current_bucket_after_rotation() {
        let mut window = MetricsWindow::new(WindowConfig::default(), Timestamp::from_secs_nanos(0, 0));
        window.current_bucket_for(Timestamp::from_secs_nanos(0, 0)).counters.queries.incr();
        window.current_bucket_for(Timestamp::from_secs_nanos(61, 0)).counters.queries.incr();
        assert_eq!(window.bucket(0).unwrap().counters.queries.value(), 1);
        assert_eq!(window.bucket(1).unwrap().counters.queries.value(), 1);
    }
}
