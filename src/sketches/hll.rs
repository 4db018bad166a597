//! HyperLogLog cardinality estimator, sized per the resolved sketch-sizing
//! section: p = 12 (4096 registers), giving ~1.6% standard error.

use serde_json::Value;
use twox_hash::xxh3::hash64_with_seed;

/// ASCII "NVISOR" truncated to 48 bits, left as a `u64` — the fixed seed
/// every HLL instance hashes with, so identical input sequences always
/// produce identical register state (and therefore identical JSON output).
const HASH_SEED: u64 = 0x4e56_4953_4f52;

const PRECISION: u32 = 12;
const NUM_REGISTERS: usize = 1 << PRECISION; // 4096

#[derive(Clone, Debug)]
pub struct HyperLogLog {
    registers: Vec<u8>,
}

impl Default for HyperLogLog {
    fn default() -> Self {
        Self::new()
    }
}

impl HyperLogLog {
    pub fn new() -> Self {
        HyperLogLog {
            registers: vec![0u8; NUM_REGISTERS],
        }
    }

    /// Hashes `item` with the fixed seed and folds it into the sketch.
    pub fn add(&mut self, item: &[u8]) {
        let hash = hash64_with_seed(item, HASH_SEED);
        self.add_hash(hash);
    }

    fn add_hash(&mut self, hash: u64) {
        let index = (hash >> (64 - PRECISION)) as usize;
        let rest = (hash << PRECISION) | (1 << (PRECISION - 1));
        let rank = (rest.leading_zeros() + 1) as u8;
        if rank > self.registers[index] {
            self.registers[index] = rank;
        }
    }

    pub fn estimate(&self) -> u64 {
        let m = NUM_REGISTERS as f64;
        let alpha = alpha_m(NUM_REGISTERS);

        let mut sum = 0.0;
        let mut zeros = 0usize;
        for &r in &self.registers {
            sum += 2f64.powi(-(r as i32));
            if r == 0 {
                zeros += 1;
            }
        }

        let raw_estimate = alpha * m * m / sum;

        let estimate = if raw_estimate <= 2.5 * m && zeros > 0 {
            // linear counting for the small-cardinality range
            m * (m / zeros as f64).ln()
        } else if raw_estimate <= (1u64 << 32) as f64 / 30.0 {
            raw_estimate
        } else {
            // large-range correction
            -(2f64.powi(32)) * (1.0 - raw_estimate / 2f64.powi(32)).ln()
        };

        estimate.round().max(0.0) as u64
    }

    pub fn merge(&mut self, other: &HyperLogLog) {
        for (a, b) in self.registers.iter_mut().zip(other.registers.iter()) {
            if *b > *a {
                *a = *b;
            }
        }
    }

    pub fn reset(&mut self) {
        self.registers.iter_mut().for_each(|r| *r = 0);
    }

    pub fn to_json(&self) -> Value {
        Value::from(self.estimate())
    }
}

fn alpha_m(m: usize) -> f64 {
    match m {
        16 => 0.673,
        32 => 0.697,
        64 => 0.709,
        _ => 0.7213 / (1.0 + 1.079 / m as f64),
    }
}
