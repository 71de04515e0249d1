//! Parsed frame model consumed by the recovery core.
//!
//! Wire encoding and decoding happen in the framing layer; the recovery
//! core only ever sees these parsed values. ACK frames additionally carry
//! the deadline extension (meet/has counters, the not-sent backlog and the
//! sender-side alpha) used by the deadline bandit.

use std::time::Duration;

use crate::{PacketNumber, PathId};

/// A frame carried by an outbound packet.
///
/// The recovery core treats frame payloads as opaque; the only property it
/// inspects is whether a frame is worth retransmitting. ACK and STOP_WAITING
/// frames are regenerated with fresh state instead of being retransmitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Stream data.
    Stream { stream_id: u32, data: Vec<u8> },
    /// PING, used to elicit an ACK.
    Ping,
    /// An acknowledgement (never retransmitted as-is).
    Ack(AckFrame),
    /// A STOP_WAITING announcement (never retransmitted as-is).
    StopWaiting(StopWaitingFrame),
}

impl Frame {
    /// Shorthand for a PING frame.
    pub fn ping() -> Self {
        Frame::Ping
    }

    /// Shorthand for a stream frame.
    pub fn stream(stream_id: u32, data: Vec<u8>) -> Self {
        Frame::Stream { stream_id, data }
    }

    /// Whether this frame must be retransmitted if its packet is lost.
    pub fn is_retransmittable(&self) -> bool {
        match self {
            Frame::Stream { .. } | Frame::Ping => true,
            Frame::Ack(_) | Frame::StopWaiting(_) => false,
        }
    }
}

/// A closed interval of consecutive packet numbers the peer has received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckRange {
    /// Smallest packet number in the range.
    pub first: PacketNumber,
    /// Largest packet number in the range.
    pub last: PacketNumber,
}

/// A parsed ACK frame, including the deadline extension.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AckFrame {
    /// The largest packet number being acknowledged.
    pub largest_acked: PacketNumber,

    /// The smallest packet number being acknowledged.
    pub lowest_acked: PacketNumber,

    /// Missing-range blocks in descending order (highest range first).
    /// Empty when `[lowest_acked, largest_acked]` is fully acked.
    pub ack_ranges: Vec<AckRange>,

    /// Time the peer held the largest acked packet before acking it.
    pub delay_time: Duration,

    /// Path the ACK was received on.
    pub path_id: PathId,

    /// Deadline extension: packets that met their deadline in the peer's
    /// current window.
    pub num_meet_deadline: u16,

    /// Deadline extension: packets that carried a deadline in the peer's
    /// current window.
    pub num_has_deadline: u16,

    /// Deadline extension: packets the sender failed to send in the last
    /// batch.
    pub cur_not_sent: u8,

    /// Deadline extension: the alpha the sender used, wire-encoded as
    /// `alpha * 10` in a single byte.
    pub alpha: u8,
}

impl AckFrame {
    /// An ACK covering `[lowest_acked, largest_acked]` with no gaps.
    pub fn cumulative(
        lowest_acked: PacketNumber,
        largest_acked: PacketNumber,
        delay_time: Duration,
    ) -> Self {
        AckFrame {
            largest_acked,
            lowest_acked,
            delay_time,
            ..Default::default()
        }
    }

    /// Whether this ACK leaves gaps below `largest_acked`.
    pub fn has_missing_ranges(&self) -> bool {
        !self.ack_ranges.is_empty()
    }

    /// Whether this frame acknowledges packet number `p`.
    pub fn acks_packet(&self, p: PacketNumber) -> bool {
        if p < self.lowest_acked || p > self.largest_acked {
            return false;
        }
        if self.has_missing_ranges() {
            return self
                .ack_ranges
                .iter()
                .any(|r| p >= r.first && p <= r.last);
        }
        true
    }
}

/// A parsed ClosePath frame: the final, ACK-shaped frame on a path.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClosePathFrame {
    /// The largest packet number being acknowledged.
    pub largest_acked: PacketNumber,

    /// The smallest packet number being acknowledged.
    pub lowest_acked: PacketNumber,

    /// Missing-range blocks in descending order.
    pub ack_ranges: Vec<AckRange>,
}

impl ClosePathFrame {
    /// Whether this frame leaves gaps below `largest_acked`.
    pub fn has_missing_ranges(&self) -> bool {
        !self.ack_ranges.is_empty()
    }

    /// Whether this frame acknowledges packet number `p`.
    pub fn acks_packet(&self, p: PacketNumber) -> bool {
        if p < self.lowest_acked || p > self.largest_acked {
            return false;
        }
        if self.has_missing_ranges() {
            return self
                .ack_ranges
                .iter()
                .any(|r| p >= r.first && p <= r.last);
        }
        true
    }
}

/// A STOP_WAITING frame telling the peer not to wait for older packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopWaitingFrame {
    /// The lowest packet number the peer should still expect.
    pub least_unacked: PacketNumber,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retransmittable_frames() {
        assert!(Frame::ping().is_retransmittable());
        assert!(Frame::stream(1, vec![0x42]).is_retransmittable());
        assert!(!Frame::Ack(AckFrame::default()).is_retransmittable());
        assert!(
            !Frame::StopWaiting(StopWaitingFrame { least_unacked: 1 }).is_retransmittable()
        );
    }

    #[test]
    fn test_acks_packet_cumulative() {
        let ack = AckFrame::cumulative(2, 7, Duration::ZERO);
        assert!(!ack.acks_packet(1));
        assert!(ack.acks_packet(2));
        assert!(ack.acks_packet(5));
        assert!(ack.acks_packet(7));
        assert!(!ack.acks_packet(8));
    }

    #[test]
    fn test_acks_packet_with_ranges() {
        let ack = AckFrame {
            largest_acked: 10,
            lowest_acked: 1,
            ack_ranges: vec![
                AckRange { first: 8, last: 10 },
                AckRange { first: 1, last: 3 },
            ],
            ..Default::default()
        };
        assert!(ack.acks_packet(2));
        assert!(!ack.acks_packet(5));
        assert!(ack.acks_packet(9));
        assert!(!ack.acks_packet(11));
    }
}
