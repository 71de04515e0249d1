//! Connection-scoped bandwidth and RTT aggregation.
//!
//! Per-path handlers convert their congestion window into a bandwidth
//! figure on every RTT update and feed it here. The estimator keeps one
//! bounded window per scheduler-tracked path, a session-wide bandwidth
//! readout, and an EWMA-smoothed RTT series for diagnostics.
//!
//! One estimator is shared by all handlers of a connection behind
//! `Arc<Mutex<_>>`; handlers on the same event loop never contend.

use std::collections::VecDeque;
use std::time::Duration;

use crate::PathId;

/// Smoothing factor for the cross-ACK RTT series.
const EWMA_FACTOR: f64 = 0.5;

/// Capacity of each per-path bandwidth window.
const BANDWIDTH_WINDOW: usize = 5;

/// Convert a duration to fractional milliseconds.
pub fn duration_to_milliseconds(d: Duration) -> f64 {
    d.as_nanos() as f64 / 1e6
}

/// Derive a bandwidth figure in Mbps from the congestion window and the
/// RTT in milliseconds. Yields 0 when the RTT is (close to) zero.
pub fn cwnd_to_bandwidth_mbps(cwnd_bytes: f64, rtt_ms: f64) -> f64 {
    let cwnd_mbits = cwnd_bytes * 8.0 / 1e6;
    if rtt_ms.abs() > 1e-10 {
        cwnd_mbits / (rtt_ms / 1e3)
    } else {
        0.0
    }
}

/// Bounded per-path bandwidth windows plus a smoothed RTT series.
#[derive(Debug)]
pub struct SessionEstimator {
    /// The two path ids the scheduler follows.
    tracked_paths: [PathId; 2],

    /// One bandwidth window per tracked path, newest at the back.
    path_windows: [VecDeque<f64>; 2],

    /// Smoothed RTT series in milliseconds, capped.
    rtt_series: VecDeque<f64>,

    /// Cap on `rtt_series`.
    rtt_series_cap: usize,
}

impl SessionEstimator {
    /// Create an estimator following the given two path ids.
    pub fn new(tracked_paths: [PathId; 2], rtt_series_cap: usize) -> Self {
        Self {
            tracked_paths,
            path_windows: [
                VecDeque::with_capacity(BANDWIDTH_WINDOW),
                VecDeque::with_capacity(BANDWIDTH_WINDOW),
            ],
            rtt_series: VecDeque::new(),
            rtt_series_cap,
        }
    }

    /// Record a bandwidth sample for a path. Samples from paths outside
    /// the tracked pair are dropped.
    pub fn record_bandwidth(&mut self, path_id: PathId, mbps: f64) {
        let Some(idx) = self.path_index(path_id) else {
            return;
        };
        let window = &mut self.path_windows[idx];
        if window.len() >= BANDWIDTH_WINDOW {
            window.pop_front();
        }
        window.push_back(mbps);
    }

    /// Session-wide bandwidth in Mbps: both windows summed over the window
    /// capacity, halved for the two-of-four path selection policy.
    pub fn session_bandwidth(&self) -> f64 {
        let sum: f64 = self.path_windows.iter().flatten().sum();
        sum / BANDWIDTH_WINDOW as f64 / 2.0
    }

    /// Fold a new RTT figure (milliseconds) into the smoothed series and
    /// return the smoothed value. The first sample passes through as-is.
    pub fn smooth_rtt(&mut self, rtt_ms: f64) -> f64 {
        let smoothed = match self.rtt_series.back() {
            None => rtt_ms,
            Some(prev) => EWMA_FACTOR * prev + (1.0 - EWMA_FACTOR) * rtt_ms,
        };
        if self.rtt_series.len() >= self.rtt_series_cap {
            self.rtt_series.pop_front();
        }
        self.rtt_series.push_back(smoothed);
        smoothed
    }

    /// The most recent smoothed RTT, if any sample has arrived.
    pub fn latest_smoothed_rtt(&self) -> Option<f64> {
        self.rtt_series.back().copied()
    }

    fn path_index(&self, path_id: PathId) -> Option<usize> {
        self.tracked_paths.iter().position(|&p| p == path_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cwnd_to_bandwidth() {
        // 125_000 bytes = 1 Mbit; over 100ms that is 10 Mbps.
        let bw = cwnd_to_bandwidth_mbps(125_000.0, 100.0);
        assert!((bw - 10.0).abs() < 1e-9);

        assert_eq!(cwnd_to_bandwidth_mbps(125_000.0, 0.0), 0.0);
    }

    #[test]
    fn test_window_eviction() {
        let mut est = SessionEstimator::new([1, 3], 16);
        for i in 0..8 {
            est.record_bandwidth(1, i as f64);
        }
        // Window holds the last 5 samples: 3+4+5+6+7 = 25; /5 /2 = 2.5
        assert!((est.session_bandwidth() - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_untracked_path_dropped() {
        let mut est = SessionEstimator::new([1, 3], 16);
        est.record_bandwidth(2, 100.0);
        assert_eq!(est.session_bandwidth(), 0.0);
    }

    #[test]
    fn test_both_paths_summed() {
        let mut est = SessionEstimator::new([1, 3], 16);
        est.record_bandwidth(1, 10.0);
        est.record_bandwidth(3, 30.0);
        // (10 + 30) / 5 / 2 = 4
        assert!((est.session_bandwidth() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_smooth_rtt_series() {
        let mut est = SessionEstimator::new([1, 3], 4);
        assert_eq!(est.smooth_rtt(100.0), 100.0);
        // 0.5 * 100 + 0.5 * 200
        assert_eq!(est.smooth_rtt(200.0), 150.0);
        assert_eq!(est.latest_smoothed_rtt(), Some(150.0));
    }

    #[test]
    fn test_rtt_series_capped() {
        let mut est = SessionEstimator::new([1, 3], 4);
        for _ in 0..32 {
            est.smooth_rtt(50.0);
        }
        assert!(est.rtt_series.len() <= 4);
    }
}
