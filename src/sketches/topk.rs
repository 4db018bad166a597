//! Space-Saving top-K (Metwally et al.): bounded `k`-counter memory,
//! independent of key cardinality — the standard choice for heavy-hitter
//! estimation under a fixed memory budget.

use std::collections::HashMap;

use serde_json::{json, Value};

const DEFAULT_K: usize = 10;

#[derive(Clone, Debug)]
struct Counter {
    key: String,
    count: u64,
    /// Upper bound on the overestimation introduced when this counter
    /// replaced an evicted key; reported alongside `count` so a caller can
    /// judge confidence, though §4.10's JSON schema only surfaces the
    /// estimate itself.
    error: u64,
}

/// Heavy-hitter estimator over `k` bounded counters.
#[derive(Clone, Debug)]
pub struct SpaceSaving {
    k: usize,
    counters: HashMap<String, usize>,
    slots: Vec<Counter>,
}

impl Default for SpaceSaving {
    fn default() -> Self {
        Self::new(DEFAULT_K)
    }
}

impl SpaceSaving {
    pub fn new(k: usize) -> Self {
        SpaceSaving {
            k: k.max(1),
            counters: HashMap::new(),
            slots: Vec::new(),
        }
    }

    pub fn add(&mut self, key: &str) {
        if let Some(&idx) = self.counters.get(key) {
            self.slots[idx].count += 1;
            return;
        }

        if self.slots.len() < self.k {
            let idx = self.slots.len();
            self.slots.push(Counter {
                key: key.to_string(),
                count: 1,
                error: 0,
            });
            self.counters.insert(key.to_string(), idx);
            return;
        }

        // replace the counter with the smallest count (ties broken by the
        // first one found; the min-scan below is deterministic given
        // insertion order, which is all §9's "deterministic top-K" asks for)
        let min_idx = self
            .slots
            .iter()
            .enumerate()
            .min_by_key(|(_, c)| c.count)
            .map(|(i, _)| i)
            .expect("slots is non-empty once k >= 1");

        self.counters.remove(&self.slots[min_idx].key);
        let new_count = self.slots[min_idx].count + 1;
        self.slots[min_idx] = Counter {
            key: key.to_string(),
            count: new_count,
            error: new_count - 1,
        };
        self.counters.insert(key.to_string(), min_idx);
    }

    /// Returns (name, estimate) pairs sorted by estimate descending, ties
    /// broken by name ascending per §9.
    pub fn top(&self) -> Vec<(String, u64)> {
        let mut entries: Vec<(String, u64)> =
            self.slots.iter().map(|c| (c.key.clone(), c.count)).collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        entries
    }

    pub fn merge(&mut self, other: &SpaceSaving) {
        for (key, count) in other.top() {
            for _ in 0..count {
                self.add(&key);
            }
        }
    }

    pub fn reset(&mut self) {
        self.counters.clear();
        self.slots.clear();
    }

    /// `[{"name": ..., "estimate": ...}, ...]`, per entry in [`Self::top`].
    pub fn to_json(&self) -> Value {
        Value::Array(
            self.top()
                .into_iter()
                .map(|(name, estimate)| json!({ "name": name, "estimate": estimate }))
                .collect(),
        )
    }
}
