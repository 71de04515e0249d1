//! Congestion control capability and the default CUBIC-flavored sender.
//!
//! The recovery core drives congestion control through the narrow
//! [`SendAlgorithm`] trait; any algorithm satisfying it can be plugged in.
//! [`CubicSender`] is the default: slow start to the threshold, cubic
//! window growth beyond it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::rtt::RttStats;
use crate::{ByteCount, PacketNumber};

/// Maximum segment size used for window arithmetic, in bytes.
const DEFAULT_MSS: ByteCount = 1460;

/// Multiplicative decrease factor applied on loss.
const CUBIC_BETA: f64 = 0.7;

/// Cubic growth coefficient (RFC 8312's C), in MSS/s^3.
const CUBIC_C: f64 = 0.4;

/// Smallest window the sender will shrink to, in segments.
const MIN_CWND_SEGMENTS: ByteCount = 2;

/// Congestion control operations consumed by the recovery core.
///
/// The handler never assumes a specific algorithm; everything it needs is
/// covered by these eight operations.
pub trait SendAlgorithm {
    /// A packet left the endpoint.
    fn on_packet_sent(
        &mut self,
        now: Instant,
        bytes_in_flight: ByteCount,
        packet_number: PacketNumber,
        bytes: ByteCount,
        is_retransmittable: bool,
    );

    /// A tracked packet was acknowledged.
    fn on_packet_acked(
        &mut self,
        packet_number: PacketNumber,
        bytes: ByteCount,
        bytes_in_flight: ByteCount,
    );

    /// A tracked packet was declared lost.
    fn on_packet_lost(
        &mut self,
        packet_number: PacketNumber,
        bytes: ByteCount,
        bytes_in_flight: ByteCount,
    );

    /// A retransmission timeout fired; `packets_retransmitted` says whether
    /// packets were actually requeued.
    fn on_retransmission_timeout(&mut self, packets_retransmitted: bool);

    /// An RTT sample arrived; leave slow start if the algorithm sees fit.
    fn maybe_exit_slow_start(&mut self);

    /// Current permissible bytes in flight.
    fn congestion_window(&self) -> ByteCount;

    /// The algorithm's view of the smoothed RTT.
    fn smoothed_rtt(&self) -> Duration;

    /// The retransmission delay derived from RTT statistics; zero when no
    /// sample exists yet.
    fn retransmission_delay(&self) -> Duration;
}

/// Default CUBIC-flavored congestion controller.
#[derive(Debug)]
pub struct CubicSender {
    /// Shared RTT statistics, written by the recovery core.
    rtt: Arc<Mutex<RttStats>>,

    /// Current congestion window in bytes.
    cwnd: ByteCount,

    /// Slow start threshold in bytes.
    ssthresh: ByteCount,

    /// Window ceiling in bytes.
    max_cwnd: ByteCount,

    /// Window at the start of the current cubic epoch.
    w_max: ByteCount,

    /// Start of the current cubic epoch, unset until the first loss.
    epoch_start: Option<Instant>,

    /// Largest packet number handed to `on_packet_sent`.
    largest_sent: PacketNumber,

    /// Largest packet number seen acked.
    largest_acked: PacketNumber,

    /// Largest packet sent when the window was last reduced; losses at or
    /// below it belong to the same congestion event.
    largest_sent_at_last_cutback: PacketNumber,
}

impl CubicSender {
    /// Create a sender with the given initial and maximum window.
    pub fn new(
        rtt: Arc<Mutex<RttStats>>,
        initial_window: ByteCount,
        max_window: ByteCount,
    ) -> Self {
        Self {
            rtt,
            cwnd: initial_window,
            ssthresh: ByteCount::MAX,
            max_cwnd: max_window,
            w_max: 0,
            epoch_start: None,
            largest_sent: 0,
            largest_acked: 0,
            largest_sent_at_last_cutback: 0,
        }
    }

    /// Whether the sender is still in slow start.
    pub fn in_slow_start(&self) -> bool {
        self.cwnd < self.ssthresh
    }

    fn min_cwnd(&self) -> ByteCount {
        MIN_CWND_SEGMENTS * DEFAULT_MSS
    }

    /// Cubic target window for the elapsed epoch time, with a Reno-style
    /// floor so the window never grows slower than one MSS per window.
    fn congestion_avoidance_target(&mut self, now: Instant) -> ByteCount {
        let epoch = *self.epoch_start.get_or_insert(now);
        let t = now.saturating_duration_since(epoch).as_secs_f64();

        let w_max_seg = self.w_max as f64 / DEFAULT_MSS as f64;
        // K = cbrt(W_max * (1 - beta) / C)
        let k = (w_max_seg * (1.0 - CUBIC_BETA) / CUBIC_C).cbrt();
        let target_seg = CUBIC_C * (t - k).powi(3) + w_max_seg;

        let reno_floor = self.cwnd + DEFAULT_MSS * DEFAULT_MSS / self.cwnd.max(1);
        let cubic = (target_seg * DEFAULT_MSS as f64) as ByteCount;
        cubic.max(reno_floor)
    }
}

impl SendAlgorithm for CubicSender {
    fn on_packet_sent(
        &mut self,
        _now: Instant,
        _bytes_in_flight: ByteCount,
        packet_number: PacketNumber,
        _bytes: ByteCount,
        is_retransmittable: bool,
    ) {
        if is_retransmittable && packet_number > self.largest_sent {
            self.largest_sent = packet_number;
        }
    }

    fn on_packet_acked(
        &mut self,
        packet_number: PacketNumber,
        _bytes: ByteCount,
        _bytes_in_flight: ByteCount,
    ) {
        if packet_number > self.largest_acked {
            self.largest_acked = packet_number;
        }

        if self.in_slow_start() {
            self.cwnd = (self.cwnd + DEFAULT_MSS).min(self.max_cwnd);
        } else {
            let target = self.congestion_avoidance_target(Instant::now());
            self.cwnd = target.min(self.max_cwnd);
        }
    }

    fn on_packet_lost(
        &mut self,
        packet_number: PacketNumber,
        _bytes: ByteCount,
        _bytes_in_flight: ByteCount,
    ) {
        // One reduction per congestion event.
        if packet_number <= self.largest_sent_at_last_cutback {
            return;
        }
        self.largest_sent_at_last_cutback = self.largest_sent;

        self.w_max = self.cwnd;
        self.cwnd = ((self.cwnd as f64 * CUBIC_BETA) as ByteCount).max(self.min_cwnd());
        self.ssthresh = self.cwnd;
        self.epoch_start = None;
    }

    fn on_retransmission_timeout(&mut self, packets_retransmitted: bool) {
        if !packets_retransmitted {
            return;
        }
        self.ssthresh = self.cwnd / 2;
        self.cwnd = self.min_cwnd();
        self.w_max = 0;
        self.epoch_start = None;
        self.largest_sent_at_last_cutback = 0;
    }

    fn maybe_exit_slow_start(&mut self) {
        if !self.in_slow_start() {
            return;
        }
        let rtt = self.rtt.lock();
        let min_rtt = rtt.min_rtt();
        // Delay-increase exit: latest sample noticeably above the floor.
        if !min_rtt.is_zero() && rtt.latest_rtt() > min_rtt + min_rtt / 8 {
            self.ssthresh = self.cwnd;
        }
    }

    fn congestion_window(&self) -> ByteCount {
        self.cwnd
    }

    fn smoothed_rtt(&self) -> Duration {
        self.rtt.lock().smoothed_rtt()
    }

    fn retransmission_delay(&self) -> Duration {
        let rtt = self.rtt.lock();
        if rtt.smoothed_rtt().is_zero() {
            return Duration::ZERO;
        }
        rtt.smoothed_rtt() + 4 * rtt.mean_deviation()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender() -> CubicSender {
        let rtt = Arc::new(Mutex::new(RttStats::new()));
        CubicSender::new(rtt, 32 * DEFAULT_MSS, 1000 * DEFAULT_MSS)
    }

    #[test]
    fn test_slow_start_growth() {
        let mut s = sender();
        let start = s.congestion_window();

        for pn in 1..=10 {
            s.on_packet_acked(pn, DEFAULT_MSS, 0);
        }

        assert!(s.in_slow_start());
        assert_eq!(s.congestion_window(), start + 10 * DEFAULT_MSS);
    }

    #[test]
    fn test_loss_reduces_window_once_per_event() {
        let mut s = sender();
        let now = Instant::now();
        for pn in 1..=20 {
            s.on_packet_sent(now, 0, pn, DEFAULT_MSS, true);
        }

        let before = s.congestion_window();
        s.on_packet_lost(5, DEFAULT_MSS, 0);
        let after_first = s.congestion_window();
        assert!(after_first < before);
        assert!(!s.in_slow_start());

        // Losses from the same window don't reduce again.
        s.on_packet_lost(6, DEFAULT_MSS, 0);
        assert_eq!(s.congestion_window(), after_first);
    }

    #[test]
    fn test_rto_collapses_window() {
        let mut s = sender();
        s.on_retransmission_timeout(true);
        assert_eq!(s.congestion_window(), 2 * DEFAULT_MSS);
    }

    #[test]
    fn test_rto_without_retransmissions_is_noop() {
        let mut s = sender();
        let before = s.congestion_window();
        s.on_retransmission_timeout(false);
        assert_eq!(s.congestion_window(), before);
    }

    #[test]
    fn test_retransmission_delay() {
        let rtt = Arc::new(Mutex::new(RttStats::new()));
        let s = CubicSender::new(rtt.clone(), 32 * DEFAULT_MSS, 1000 * DEFAULT_MSS);

        assert_eq!(s.retransmission_delay(), Duration::ZERO);

        rtt.lock()
            .update_rtt(Duration::from_millis(100), Duration::ZERO, Instant::now());
        // srtt + 4 * mean_deviation = 100 + 4 * 50
        assert_eq!(s.retransmission_delay(), Duration::from_millis(300));
    }

    #[test]
    fn test_delay_increase_exits_slow_start() {
        let rtt = Arc::new(Mutex::new(RttStats::new()));
        let mut s = CubicSender::new(rtt.clone(), 32 * DEFAULT_MSS, 1000 * DEFAULT_MSS);

        rtt.lock()
            .update_rtt(Duration::from_millis(50), Duration::ZERO, Instant::now());
        s.maybe_exit_slow_start();
        assert!(s.in_slow_start());

        // Latest RTT 50% above the floor: queue building, exit.
        rtt.lock()
            .update_rtt(Duration::from_millis(75), Duration::ZERO, Instant::now());
        s.maybe_exit_slow_start();
        assert!(!s.in_slow_start());
    }
}
