//! STOP_WAITING frame bookkeeping.
//!
//! Tracks the least-unacked floor the peer should be told about. A new
//! frame is only handed out when it moves the floor forward, unless the
//! caller forces one (e.g. for retransmitted packets that must carry it).

use crate::frames::{AckFrame, StopWaitingFrame};
use crate::PacketNumber;

/// Decides when a STOP_WAITING frame needs to be sent, and with which
/// least-unacked value.
#[derive(Debug, Default)]
pub struct StopWaitingManager {
    largest_least_unacked_sent: PacketNumber,
    next: Option<StopWaitingFrame>,
}

impl StopWaitingManager {
    /// Create a manager with no pending frame.
    pub fn new() -> Self {
        Self::default()
    }

    /// The frame to attach to the next outgoing packet, if one is due.
    /// With `force` the pending frame is returned even when it would not
    /// advance the floor.
    pub fn get_stop_waiting_frame(&mut self, force: bool) -> Option<StopWaitingFrame> {
        let frame = self.next?;
        if !force && frame.least_unacked <= self.largest_least_unacked_sent {
            return None;
        }
        self.largest_least_unacked_sent = frame.least_unacked;
        Some(frame)
    }

    /// An ACK arrived; everything up to its largest acked no longer needs
    /// waiting for.
    pub fn received_ack(&mut self, frame: &AckFrame) {
        if frame.largest_acked >= self.largest_least_unacked_sent {
            self.next = Some(StopWaitingFrame {
                least_unacked: frame.largest_acked + 1,
            });
        }
    }

    /// A packet was queued for retransmission; the peer must not wait for
    /// its original transmission.
    pub fn queued_retransmission_for_packet_number(&mut self, packet_number: PacketNumber) {
        if packet_number >= self.largest_least_unacked_sent {
            self.next = Some(StopWaitingFrame {
                least_unacked: packet_number + 1,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_no_frame_initially() {
        let mut manager = StopWaitingManager::new();
        assert!(manager.get_stop_waiting_frame(false).is_none());
        assert!(manager.get_stop_waiting_frame(true).is_none());
    }

    #[test]
    fn test_frame_after_ack() {
        let mut manager = StopWaitingManager::new();
        manager.received_ack(&AckFrame::cumulative(1, 10, Duration::ZERO));

        let frame = manager.get_stop_waiting_frame(false).unwrap();
        assert_eq!(frame.least_unacked, 11);

        // Already sent; not offered again without force.
        assert!(manager.get_stop_waiting_frame(false).is_none());
        assert_eq!(
            manager.get_stop_waiting_frame(true).unwrap().least_unacked,
            11
        );
    }

    #[test]
    fn test_retransmission_advances_floor() {
        let mut manager = StopWaitingManager::new();
        manager.queued_retransmission_for_packet_number(5);

        let frame = manager.get_stop_waiting_frame(false).unwrap();
        assert_eq!(frame.least_unacked, 6);

        // An older retransmission doesn't move the floor back.
        manager.queued_retransmission_for_packet_number(3);
        assert!(manager.get_stop_waiting_frame(false).is_none());
    }
}
