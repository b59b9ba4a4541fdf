//! Incremental mean / population standard deviation over a bounded window.
//!
//! The window never rescans its samples: every update folds one eviction
//! (if the backing buffer was full) and one insertion into the running
//! count, sum, and sum-of-squares, then rederives the mean, the
//! population standard deviation, and the memoized outlier interval for
//! the configured sigma level.
//!
//! The variance term `Q/n - (S/n)^2` can drift fractionally negative in
//! floating point; it is clamped to zero rather than allowed to reach
//! `sqrt` and produce NaN. The recovery is counted but never surfaced as
//! an error.

use serde::{Deserialize, Serialize};

/// Running statistics over a bounded FIFO of numeric samples.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsWindow {
    count: u64,
    sum: f64,
    square_sum: f64,
    sigma_level: u32,
    mean: f64,
    stdev: f64,
    lower: f64,
    upper: f64,
    /// Number of negative-variance clamps applied so far.
    clamped: u64,
}

impl StatsWindow {
    /// Create an empty window with the given sigma level.
    ///
    /// The sigma level is fixed at construction; `is_outlier` can still
    /// evaluate a different level on the fly.
    pub fn new(sigma_level: u32) -> Self {
        Self {
            count: 0,
            sum: 0.0,
            square_sum: 0.0,
            sigma_level,
            mean: 0.0,
            stdev: 0.0,
            lower: 0.0,
            upper: 0.0,
            clamped: 0,
        }
    }

    /// Fold one insertion, and the matching eviction when the backing
    /// buffer was already full, into the running moments.
    ///
    /// The eviction is removed first, then the new amount added; the
    /// count only grows when nothing was evicted.
    pub fn fold(&mut self, amount: f64, evicted: Option<f64>) {
        match evicted {
            Some(old) => {
                self.sum -= old;
                self.square_sum -= old * old;
            }
            None => self.count += 1,
        }
        self.sum += amount;
        self.square_sum += amount * amount;

        let n = self.count as f64;
        self.mean = self.sum / n;
        let mut variance = self.square_sum / n - self.mean * self.mean;
        if variance < 0.0 {
            variance = 0.0;
            self.clamped += 1;
        }
        self.stdev = variance.sqrt();

        let plus_minus = f64::from(self.sigma_level) * self.stdev;
        self.lower = self.mean - plus_minus;
        self.upper = self.mean + plus_minus;
    }

    /// The `[lower, upper]` interval at the requested sigma level.
    ///
    /// The configured level reads the memoized bounds; any other level
    /// is recomputed from the stored mean and standard deviation.
    pub fn bounds(&self, level: u32) -> (f64, f64) {
        if level == self.sigma_level {
            (self.lower, self.upper)
        } else {
            let plus_minus = f64::from(level) * self.stdev;
            (self.mean - plus_minus, self.mean + plus_minus)
        }
    }

    /// Whether `amount` falls outside the sigma interval.
    ///
    /// Always false until at least two samples have been folded in:
    /// with fewer there is no meaningful spread to compare against.
    pub fn is_outlier(&self, amount: f64, level: Option<u32>) -> bool {
        if self.count < 2 {
            return false;
        }
        let (lower, upper) = self.bounds(level.unwrap_or(self.sigma_level));
        amount < lower || amount > upper
    }

    /// Reset to the empty state, keeping the configured sigma level.
    pub fn reset(&mut self) {
        *self = StatsWindow::new(self.sigma_level);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn stdev(&self) -> f64 {
        self.stdev
    }

    pub fn sigma_level(&self) -> u32 {
        self.sigma_level
    }

    /// How many times the negative-variance guard fired.
    pub fn clamp_count(&self) -> u64 {
        self.clamped
    }
}
