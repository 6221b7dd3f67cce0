// SPDX-License-Identifier: MIT
//
// QRNG Entropy Engine: Multi-Technique Quantum Randomness Service
// Copyright (c) 2025 Valer Bocan, PhD, CSSLP
// Email: valer.bocan@upt.ro
//
// Department of Computer and Information Technology
// Politehnica University of Timisoara
//
// https://github.com/yourusername/qrng-entropy-engine

//! Bounded, time-ordered sample window with count and age eviction
//!
//! Used by the metrics aggregator for its percentile history (count bound) and its live
//! throughput feed (age bound). Not synchronized on its own; the owner holds the lock.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// One timestamped entry
#[derive(Debug, Clone)]
pub struct Stamped<T> {
    pub at: Instant,
    pub value: T,
}

/// Eviction counters
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowStats {
    pub total_pushes: u64,
    pub evictions_overflow: u64,
    pub evictions_age: u64,
}

/// FIFO window holding at most `max_len` entries no older than `horizon`
#[derive(Debug, Clone)]
pub struct MetricWindow<T> {
    entries: VecDeque<Stamped<T>>,
    max_len: usize,
    horizon: Option<Duration>,
    stats: WindowStats,
}

impl<T> MetricWindow<T> {
    /// Count-bounded window
    pub fn new(max_len: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_len.min(4096)),
            max_len: max_len.max(1),
            horizon: None,
            stats: WindowStats::default(),
        }
    }

    /// Count- and age-bounded window
    pub fn with_horizon(max_len: usize, horizon: Duration) -> Self {
        let mut window = Self::new(max_len);
        window.horizon = Some(horizon);
        window
    }

    /// Append a sample taken at `at`
    ///
    /// Timestamps are kept non-decreasing: an `at` earlier than the newest entry is clamped
    /// up to it.
    pub fn push(&mut self, at: Instant, value: T) -> Instant {
        let at = match self.entries.back() {
            Some(last) if at < last.at => last.at,
            _ => at,
        };

        self.entries.push_back(Stamped { at, value });
        self.stats.total_pushes += 1;

        while self.entries.len() > self.max_len {
            self.entries.pop_front();
            self.stats.evictions_overflow += 1;
        }
        self.evict_older_than(at);
        at
    }

    /// Drop entries older than `horizon` relative to `now`
    pub fn evict_older_than(&mut self, now: Instant) {
        let Some(horizon) = self.horizon else {
            return;
        };
        while let Some(front) = self.entries.front() {
            if now.saturating_duration_since(front.at) > horizon {
                self.entries.pop_front();
                self.stats.evictions_age += 1;
            } else {
                break;
            }
        }
    }

    /// Entries within the horizon as seen from `now`, oldest first
    pub fn live(&self, now: Instant) -> impl Iterator<Item = &Stamped<T>> + '_ {
        let horizon = self.horizon;
        self.entries.iter().filter(move |e| match horizon {
            Some(h) => now.saturating_duration_since(e.at) <= h,
            None => true,
        })
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Stamped<T>> + ExactSizeIterator + '_ {
        self.entries.iter()
    }

    /// Newest `n` entries, newest first
    pub fn latest(&self, n: usize) -> impl Iterator<Item = &Stamped<T>> + '_ {
        self.entries.iter().rev().take(n)
    }

    pub fn last(&self) -> Option<&Stamped<T>> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_len
    }

    pub fn horizon(&self) -> Option<Duration> {
        self.horizon
    }

    pub fn stats(&self) -> WindowStats {
        self.stats
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_bound() {
        let mut window = MetricWindow::new(3);
        let t0 = Instant::now();
        for i in 0..5 {
            window.push(t0 + Duration::from_millis(i), i);
        }
        assert_eq!(window.len(), 3);
        let values: Vec<_> = window.iter().map(|e| e.value).collect();
        assert_eq!(values, vec![2, 3, 4]);
        assert_eq!(window.stats().evictions_overflow, 2);
    }

    #[test]
    fn test_age_bound() {
        let mut window = MetricWindow::with_horizon(100, Duration::from_secs(60));
        let t0 = Instant::now();
        window.push(t0, "old");
        window.push(t0 + Duration::from_secs(30), "mid");
        window.push(t0 + Duration::from_secs(61), "new");

        let values: Vec<_> = window.iter().map(|e| e.value).collect();
        assert_eq!(values, vec!["mid", "new"]);
        assert_eq!(window.stats().evictions_age, 1);

        let live: Vec<_> = window
            .live(t0 + Duration::from_secs(100))
            .map(|e| e.value)
            .collect();
        assert_eq!(live, vec!["new"]);
    }

    #[test]
    fn test_timestamps_non_decreasing() {
        let mut window = MetricWindow::new(10);
        let t0 = Instant::now();
        let later = t0 + Duration::from_secs(5);
        window.push(later, 1);
        let stored = window.push(t0, 2);
        assert_eq!(stored, later);

        let stamps: Vec<_> = window.iter().map(|e| e.at).collect();
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_latest_is_newest_first() {
        let mut window = MetricWindow::new(10);
        let t0 = Instant::now();
        for i in 0..5 {
            window.push(t0, i);
        }
        let latest: Vec<_> = window.latest(2).map(|e| e.value).collect();
        assert_eq!(latest, vec![4, 3]);
    }
}
