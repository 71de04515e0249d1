//! Sent-packet tracking and loss detection for one path of a multipath
//! QUIC endpoint.
//!
//! The central object is [`recovery::SentPacketHandler`]: a single-threaded
//! state machine that tracks every transmitted packet until it is
//! acknowledged or declared lost, drives a congestion controller through
//! send/ack/loss events, detects loss via time-based reordering, tail loss
//! probes (TLP) and retransmission timeouts (RTO), and maintains smoothed
//! round-trip-time estimates.
//!
//! On top of the classic recovery machinery, acknowledgement frames carry
//! deadline-meet counters. The handler feeds them into a discounted
//! upper-confidence-bound bandit ([`recovery::DeadlineTracker`]) and exposes
//! a per-path "alpha" tuning parameter, the current deadline-meet ratio and
//! a bandwidth estimate to an external path scheduler.
//!
//! # Example
//!
//! ```rust
//! use std::time::{Duration, Instant};
//! use mpquic_recovery::frames::{AckFrame, Frame};
//! use mpquic_recovery::recovery::{Packet, RecoveryConfig, SentPacketHandler};
//!
//! let mut handler = SentPacketHandler::new(RecoveryConfig::default(), None, None);
//!
//! let t0 = Instant::now();
//! handler.sent_packet(Packet::new(1, vec![Frame::ping()], 100, t0, None), t0).unwrap();
//!
//! let ack = AckFrame::cumulative(1, 1, Duration::ZERO);
//! handler.received_ack(&ack, 1, t0 + Duration::from_millis(30)).unwrap();
//! assert_eq!(handler.bytes_in_flight(), 0);
//! ```
//!
//! Wire framing, encryption and the scheduler itself live elsewhere: this
//! crate consumes parsed frames and produces outbound [`recovery::Packet`]
//! values.

pub mod frames;
pub mod recovery;

/// Packet numbers are monotonically assigned 64-bit values.
pub type PacketNumber = u64;

/// Byte counts (packet lengths, windows, in-flight totals).
pub type ByteCount = u64;

/// Identifier of one path of the multipath connection.
pub type PathId = u8;

/// Error type for recovery operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A packet was registered with a number not above the last sent one.
    PacketNumberNotIncreasing,
    /// Too many outstanding non-acked and non-retransmitted packets.
    TooManyTrackedSentPackets,
    /// A duplicate or out-of-order ACK was received.
    DuplicateOrOutOfOrderAck,
    /// The peer acked a packet that was never sent.
    AckForUnsentPacket,
    /// The peer acked a packet number that was intentionally skipped.
    AckForSkippedPacket,
    /// The range matcher was about to ack a packet outside the evaluated
    /// range. Indicates an implementation defect, not peer behavior.
    AckRangeEvaluation {
        packet_number: PacketNumber,
        first: PacketNumber,
        last: PacketNumber,
    },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::PacketNumberNotIncreasing => {
                write!(f, "already sent a packet with a higher packet number")
            }
            Error::TooManyTrackedSentPackets => {
                write!(f, "too many outstanding non-acked and non-retransmitted packets")
            }
            Error::DuplicateOrOutOfOrderAck => {
                write!(f, "duplicate or out-of-order ACK")
            }
            Error::AckForUnsentPacket => {
                write!(f, "received ACK for an unsent packet")
            }
            Error::AckForSkippedPacket => {
                write!(f, "received an ACK for a skipped packet number")
            }
            Error::AckRangeEvaluation {
                packet_number,
                first,
                last,
            } => write!(
                f,
                "BUG: would have acked wrong packet {:#x}, while evaluating range {:#x} -> {:#x}",
                packet_number, first, last
            ),
        }
    }
}

impl std::error::Error for Error {}
