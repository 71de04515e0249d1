//! Round-trip-time statistics.
//!
//! Standard TCP-style smoothing: the smoothed RTT is an EWMA with gain 1/8,
//! the mean deviation an EWMA with gain 1/4. The peer-reported ack delay is
//! subtracted from a sample unless it would consume the whole sample.

use std::time::{Duration, Instant};

/// Smoothing gain for the mean RTT (1/8).
const RTT_ALPHA: u32 = 8;

/// Smoothing gain for the mean deviation (1/4).
const RTT_BETA: u32 = 4;

/// RTT statistics for one path.
#[derive(Debug, Clone, Default)]
pub struct RttStats {
    latest_rtt: Duration,
    min_rtt: Duration,
    smoothed_rtt: Duration,
    mean_deviation: Duration,
}

impl RttStats {
    /// Create a fresh estimator with no samples.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a new sample.
    ///
    /// `send_delta` is the raw receive-time minus send-time difference;
    /// `ack_delay` is the delay the peer reported holding the ACK.
    /// Zero samples are ignored.
    pub fn update_rtt(&mut self, send_delta: Duration, ack_delay: Duration, _now: Instant) {
        if send_delta.is_zero() {
            return;
        }

        if self.min_rtt.is_zero() || self.min_rtt > send_delta {
            self.min_rtt = send_delta;
        }

        // Correct for ack delay if information received from the peer
        // results in a positive RTT sample.
        let mut sample = send_delta;
        if sample > ack_delay {
            sample -= ack_delay;
        }
        self.latest_rtt = sample;

        if self.smoothed_rtt.is_zero() {
            self.smoothed_rtt = sample;
            self.mean_deviation = sample / 2;
        } else {
            let deviation = if self.smoothed_rtt > sample {
                self.smoothed_rtt - sample
            } else {
                sample - self.smoothed_rtt
            };
            self.mean_deviation =
                self.mean_deviation * (RTT_BETA - 1) / RTT_BETA + deviation / RTT_BETA;
            self.smoothed_rtt =
                self.smoothed_rtt * (RTT_ALPHA - 1) / RTT_ALPHA + sample / RTT_ALPHA;
        }
    }

    /// The smoothed RTT, zero before the first sample.
    pub fn smoothed_rtt(&self) -> Duration {
        self.smoothed_rtt
    }

    /// The most recent (ack-delay-corrected) sample.
    pub fn latest_rtt(&self) -> Duration {
        self.latest_rtt
    }

    /// The smallest raw sample observed.
    pub fn min_rtt(&self) -> Duration {
        self.min_rtt
    }

    /// The smoothed absolute deviation of samples from the mean.
    pub fn mean_deviation(&self) -> Duration {
        self.mean_deviation
    }
}
