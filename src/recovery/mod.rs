//! # Per-path recovery
//!
//! Sent-packet tracking, loss detection and scheduler feedback for one
//! network path.
//!
//! ## Overview
//!
//! [`SentPacketHandler`] is the per-path core. It combines:
//!
//! - **Packet history** - ordered store of unacked in-flight packets
//! - **Loss detection** - time-based reordering, tail loss probes (TLP)
//!   and retransmission timeouts (RTO) with exponential backoff
//! - **ACK processing** - range matching, RTT updates, congestion feedback
//! - **Bandwidth estimation** - cwnd-derived per-path and session windows
//! - **Deadline bandit** - discounted UCB over four alpha candidates,
//!   driven by the deadline counters piggybacked on ACK frames
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                SentPacketHandler                     │
//! ├──────────────────────────────────────────────────────┤
//! │  PacketHistory ──→ loss detector ──→ retx queue      │
//! │       │                                   │          │
//! │   ACK processor ──→ RttStats ──→ SessionEstimator    │
//! │       │                                              │
//! │   DeadlineTracker (discounted UCB) ──→ alpha/ratio   │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! The handler is owned by its path's event loop: every entrypoint takes
//! `&mut self` and returns without blocking. Alarms are externally driven;
//! the host reads [`SentPacketHandler::alarm_timeout`] and calls
//! [`SentPacketHandler::on_alarm`] once the deadline elapses.

mod bandit;
mod bandwidth;
mod congestion;
mod handler;
mod packet;
mod rtt;
mod stop_waiting;

// Re-exports
pub use bandit::DeadlineTracker;
pub use bandwidth::SessionEstimator;
pub use congestion::{CubicSender, SendAlgorithm};
pub use handler::{OnRtoCallback, SentPacketHandler};
pub use packet::{Packet, PacketHistory};
pub use rtt::RttStats;
pub use stop_waiting::StopWaitingManager;

use crate::{ByteCount, PathId};

/// Configuration for per-path recovery.
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    // === Tracking limits ===
    /// Maximum packets tracked across history and retransmission queue.
    pub max_tracked_sent_packets: usize,

    /// Maximum intentionally skipped packet numbers remembered for
    /// ACK validation; oldest entries are dropped beyond this.
    pub max_tracked_skipped_packets: usize,

    /// Number of consecutive non-retransmittable packets after which the
    /// caller should include a retransmittable frame so ACK elicitation
    /// continues.
    pub max_non_retransmittable_packets: usize,

    // === Congestion defaults ===
    /// Initial congestion window in bytes for the default sender.
    pub initial_congestion_window: ByteCount,

    /// Upper bound on the congestion window in bytes for the default sender.
    pub max_congestion_window: ByteCount,

    // === Scheduler feedback ===
    /// The two path ids whose bandwidth windows feed the session estimate.
    pub tracked_paths: [PathId; 2],

    /// Cap on the smoothed-RTT diagnostic series kept by the estimator.
    pub rtt_series_cap: usize,

    /// Credit the bandit play count to the arm matched from the incoming
    /// ACK's alpha instead of the currently selected arm. Off by default:
    /// the stock behavior books the play against the selected arm even
    /// though the reward goes to the matched arm.
    pub credit_play_to_matched_arm: bool,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_tracked_sent_packets: 2560,
            max_tracked_skipped_packets: 10,
            max_non_retransmittable_packets: 19,

            // 32 and 1000 full-size packets respectively
            initial_congestion_window: 32 * 1460,
            max_congestion_window: 1000 * 1460,

            tracked_paths: [1, 3],
            rtt_series_cap: 1024,
            credit_play_to_matched_arm: false,
        }
    }
}
