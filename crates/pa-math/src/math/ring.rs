//! Fixed-capacity sample buffer feeding a [`StatsWindow`].
//!
//! On overflow the oldest sample is evicted and its removal is folded
//! into the same statistics update as the new insertion, so the window
//! moments always describe exactly the buffered samples.

use chrono::NaiveDateTime;
use pa_common::UserId;
use serde::{Deserialize, Serialize};

use super::window::StatsWindow;

/// One recorded purchase. Immutable once recorded.
///
/// The owning user is carried so a group buffer rebuilt from member
/// ledgers can be replayed deterministically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: NaiveDateTime,
    pub amount: f64,
    pub user: UserId,
}

impl Sample {
    pub fn new(timestamp: NaiveDateTime, amount: f64, user: UserId) -> Self {
        Self {
            timestamp,
            amount,
            user,
        }
    }
}

/// Circular buffer of [`Sample`]s with an attached [`StatsWindow`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RingBuffer {
    size: usize,
    start: usize,
    count: usize,
    buffer: Vec<Option<Sample>>,
    stats: StatsWindow,
}

impl RingBuffer {
    /// Create an empty buffer of the given capacity and sigma level.
    pub fn new(size: usize, sigma_level: u32) -> Self {
        Self {
            size,
            start: 0,
            count: 0,
            buffer: vec![None; size],
            stats: StatsWindow::new(sigma_level),
        }
    }

    pub fn is_full(&self) -> bool {
        self.count == self.size
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn capacity(&self) -> usize {
        self.size
    }

    /// The attached statistics window.
    pub fn stats(&self) -> &StatsWindow {
        &self.stats
    }

    /// Insert a sample, returning the evicted one when the buffer was
    /// already full. Eviction and insertion reach the stats window as a
    /// single folded update.
    pub fn push(&mut self, sample: Sample) -> Option<Sample> {
        let slot = (self.start + self.count) % self.size;
        let evicted = if self.is_full() {
            self.buffer[slot].take()
        } else {
            None
        };
        self.stats
            .fold(sample.amount, evicted.as_ref().map(|s| s.amount));
        self.buffer[slot] = Some(sample);
        if evicted.is_some() {
            self.start = (self.start + 1) % self.size;
        } else {
            self.count += 1;
        }
        evicted
    }

    /// The buffered samples in insertion order, oldest first.
    pub fn ordered(&self) -> Vec<Sample> {
        let mut out = Vec::with_capacity(self.count);
        for i in 0..self.count {
            if let Some(sample) = &self.buffer[(self.start + i) % self.size] {
                out.push(sample.clone());
            }
        }
        out
    }

    /// Drain all samples in insertion order, leaving the buffer and its
    /// statistics empty.
    pub fn flush(&mut self) -> Vec<Sample> {
        let drained = self.ordered();
        self.clear();
        drained
    }

    /// Reset to the empty state.
    pub fn clear(&mut self) {
        self.buffer = vec![None; self.size];
        self.start = 0;
        self.count = 0;
        self.stats.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(secs: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2017, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, secs)
            .unwrap()
    }

    fn sample(secs: u32, amount: f64) -> Sample {
        Sample::new(ts(secs), amount, UserId::from("1"))
    }

    #[test]
    fn push_below_capacity_evicts_nothing() {
        let mut rb = RingBuffer::new(3, 3);
        assert!(rb.push(sample(0, 10.0)).is_none());
        assert!(rb.push(sample(1, 20.0)).is_none());
        assert_eq!(rb.len(), 2);
        assert!(!rb.is_full());
    }

    #[test]
    fn push_at_capacity_evicts_oldest() {
        let mut rb = RingBuffer::new(3, 3);
        for i in 0..3 {
            rb.push(sample(i, f64::from(i) * 10.0));
        }
        let evicted = rb.push(sample(3, 30.0)).expect("oldest evicted");
        assert_eq!(evicted.timestamp, ts(0));
        assert_eq!(rb.len(), 3);
        assert_eq!(rb.stats().count(), 3);
    }

    #[test]
    fn ordered_is_oldest_first() {
        let mut rb = RingBuffer::new(3, 3);
        for i in 0..5 {
            rb.push(sample(i, f64::from(i)));
        }
        let amounts: Vec<f64> = rb.ordered().iter().map(|s| s.amount).collect();
        assert_eq!(amounts, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn stats_track_only_buffered_samples() {
        let mut rb = RingBuffer::new(2, 3);
        rb.push(sample(0, 10.0));
        rb.push(sample(1, 20.0));
        rb.push(sample(2, 30.0)); // evicts 10.0
        assert!((rb.stats().mean() - 25.0).abs() < 1e-9);
    }

    #[test]
    fn flush_drains_and_resets() {
        let mut rb = RingBuffer::new(3, 3);
        rb.push(sample(0, 1.0));
        rb.push(sample(1, 2.0));
        let drained = rb.flush();
        assert_eq!(drained.len(), 2);
        assert!(rb.is_empty());
        assert_eq!(rb.stats().count(), 0);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// After any number of insertions, the incremental moments
            /// match a direct recomputation over exactly the buffered
            /// samples.
            #[test]
            fn incremental_matches_direct(
                amounts in prop::collection::vec(0.01f64..10_000.0, 1..60),
                capacity in 2usize..12,
            ) {
                let mut rb = RingBuffer::new(capacity, 3);
                for (i, &a) in amounts.iter().enumerate() {
                    rb.push(sample(i as u32 % 60, a));
                }
                let tail: Vec<f64> = amounts
                    .iter()
                    .rev()
                    .take(capacity)
                    .rev()
                    .copied()
                    .collect();
                let n = tail.len() as f64;
                let mean = tail.iter().sum::<f64>() / n;
                let var = tail.iter().map(|a| (a - mean) * (a - mean)).sum::<f64>() / n;
                let tol = 1e-6 * (1.0 + mean.abs());
                prop_assert!((rb.stats().mean() - mean).abs() < tol);
                prop_assert!((rb.stats().stdev() - var.sqrt()).abs() < tol);
            }
        }
    }
}
