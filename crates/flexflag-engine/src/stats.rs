//! Stats endpoint: per-tier hit/miss counters plus a streaming percentile
//! reservoir over evaluation latency.
//!
//! Percentiles are estimated from a fixed-size reservoir rather than
//! retaining every sample, trading precision for bounded memory under
//! sustained load.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Fixed-capacity reservoir sampler (algorithm R) over evaluation
/// latencies, used to estimate p95/p99 without retaining every sample.
pub struct ReservoirSampler {
    capacity: usize,
    samples: Mutex<Vec<u64>>,
    count: AtomicU64,
}

impl ReservoirSampler {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            samples: Mutex::new(Vec::with_capacity(capacity)),
            count: AtomicU64::new(0),
        }
    }

    /// Records one latency sample (nanoseconds). Cheap: a lock held only
    /// long enough to push or replace one `u64`, never reached on the
    /// T1-only ultra-fast path's steady state (only the general path and
    /// fast-path misses record here).
    pub fn record(&self, value_ns: u64) {
        let seen = self.count.fetch_add(1, Ordering::Relaxed);
        let mut samples = self.samples.lock().unwrap();
        if samples.len() < self.capacity {
            samples.push(value_ns);
        } else {
            // Reservoir sampling: replace a uniformly random existing
            // slot with probability capacity / (seen + 1). `seen` is
            // itself the entropy source's index, not a user input, so a
            // simple multiplicative hash stands in for an RNG — the
            // engine has no `rand` dependency and this only needs to be
            // roughly uniform, not cryptographically so.
            let slot = (seen.wrapping_mul(2_654_435_761) as usize) % (seen as usize + 1);
            if slot < self.capacity {
                samples[slot] = value_ns;
            }
        }
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn avg_ns(&self) -> f64 {
        let samples = self.samples.lock().unwrap();
        if samples.is_empty() {
            return 0.0;
        }
        samples.iter().sum::<u64>() as f64 / samples.len() as f64
    }

    /// Nearest-rank percentile over the current reservoir contents.
    /// `p` is in `[0.0, 1.0]`.
    pub fn percentile(&self, p: f64) -> u64 {
        let mut samples = self.samples.lock().unwrap().clone();
        if samples.is_empty() {
            return 0;
        }
        samples.sort_unstable();
        let rank = ((p * samples.len() as f64).ceil() as usize)
            .saturating_sub(1)
            .min(samples.len() - 1);
        samples[rank]
    }

    pub fn p95_ns(&self) -> u64 {
        self.percentile(0.95)
    }

    pub fn p99_ns(&self) -> u64 {
        self.percentile(0.99)
    }
}

impl Default for ReservoirSampler {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// `{ count, avg_ns, p95_ns, p99_ns }` — the `evaluations` section of the
/// stats endpoint.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EvaluationStats {
    pub count: u64,
    pub avg_ns: f64,
    pub p95_ns: u64,
    pub p99_ns: u64,
}

impl ReservoirSampler {
    pub fn snapshot(&self) -> EvaluationStats {
        EvaluationStats {
            count: self.count(),
            avg_ns: self.avg_ns(),
            p95_ns: self.p95_ns(),
            p99_ns: self.p99_ns(),
        }
    }
}
