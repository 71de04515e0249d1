//! Tracked packets and the ordered history of unacked ones.
//!
//! The history replaces the classic intrusive linked list with a ring
//! buffer: packet numbers are strictly ascending, so in-order iteration,
//! front/back peeks and point removal are all it needs to support.

use std::collections::VecDeque;
use std::time::Instant;

use crate::frames::Frame;
use crate::{ByteCount, PacketNumber};

/// A packet handed to the recovery core on send.
///
/// Packets are never mutated in place once tracked; ack and loss processing
/// moves them out of the history wholesale.
#[derive(Debug, Clone)]
pub struct Packet {
    /// Monotonically assigned packet number.
    pub packet_number: PacketNumber,

    /// Frames carried by the packet. Opaque to the core except for
    /// retransmittability.
    pub frames: Vec<Frame>,

    /// Length of the packet in bytes.
    pub length: ByteCount,

    /// When the packet was sent. Stamped by the handler on registration.
    pub send_time: Instant,

    /// Deadline by which the packet should be delivered, if any.
    pub deadline: Option<Instant>,
}

impl Packet {
    /// Create a new packet.
    pub fn new(
        packet_number: PacketNumber,
        frames: Vec<Frame>,
        length: ByteCount,
        send_time: Instant,
        deadline: Option<Instant>,
    ) -> Self {
        Self {
            packet_number,
            frames,
            length,
            send_time,
            deadline,
        }
    }

    /// Whether the packet still carries anything worth retransmitting.
    pub fn is_retransmittable(&self) -> bool {
        !self.frames.is_empty()
    }

    /// Drop frames that are regenerated rather than retransmitted
    /// (ACK, STOP_WAITING). Returns whether any frames remain.
    pub fn strip_non_retransmittable_frames(&mut self) -> bool {
        self.frames.retain(Frame::is_retransmittable);
        !self.frames.is_empty()
    }
}

/// Ordered store of unacked in-flight packets.
///
/// Invariant: packet numbers are strictly increasing front to back.
#[derive(Debug, Default)]
pub struct PacketHistory {
    packets: VecDeque<Packet>,
}

impl PacketHistory {
    /// Create an empty history.
    pub fn new() -> Self {
        Self {
            packets: VecDeque::new(),
        }
    }

    /// Number of tracked packets.
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    /// Whether the history is empty.
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// The oldest tracked packet.
    pub fn front(&self) -> Option<&Packet> {
        self.packets.front()
    }

    /// The newest tracked packet.
    pub fn back(&self) -> Option<&Packet> {
        self.packets.back()
    }

    /// In-order iteration, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Packet> {
        self.packets.iter()
    }

    /// Append a packet.
    ///
    /// The caller guarantees its number exceeds every tracked one; this is
    /// enforced by the handler's send path and asserted here.
    pub fn push_back(&mut self, packet: Packet) {
        debug_assert!(
            self.packets
                .back()
                .map_or(true, |p| p.packet_number < packet.packet_number),
            "packet numbers must be strictly increasing"
        );
        self.packets.push_back(packet);
    }

    /// Remove and return the oldest tracked packet.
    pub fn pop_front(&mut self) -> Option<Packet> {
        self.packets.pop_front()
    }

    /// Remove and return the newest tracked packet.
    pub fn pop_back(&mut self) -> Option<Packet> {
        self.packets.pop_back()
    }

    /// Remove the packet with the given number, if tracked.
    pub fn remove(&mut self, packet_number: PacketNumber) -> Option<Packet> {
        let idx = self
            .packets
            .iter()
            .position(|p| p.packet_number == packet_number)?;
        self.packets.remove(idx)
    }

    /// Whether a packet with this number is tracked.
    pub fn contains(&self, packet_number: PacketNumber) -> bool {
        self.packets.iter().any(|p| p.packet_number == packet_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::Frame;

    fn packet(pn: PacketNumber) -> Packet {
        Packet::new(pn, vec![Frame::ping()], 100, Instant::now(), None)
    }

    #[test]
    fn test_push_and_order() {
        let mut history = PacketHistory::new();
        history.push_back(packet(1));
        history.push_back(packet(3));
        history.push_back(packet(7));

        assert_eq!(history.len(), 3);
        assert_eq!(history.front().unwrap().packet_number, 1);
        assert_eq!(history.back().unwrap().packet_number, 7);

        let numbers: Vec<_> = history.iter().map(|p| p.packet_number).collect();
        assert_eq!(numbers, vec![1, 3, 7]);
    }

    #[test]
    fn test_point_removal() {
        let mut history = PacketHistory::new();
        for pn in [1, 2, 3, 4] {
            history.push_back(packet(pn));
        }

        let removed = history.remove(3).unwrap();
        assert_eq!(removed.packet_number, 3);
        assert!(!history.contains(3));
        assert_eq!(history.len(), 3);

        assert!(history.remove(3).is_none());
    }

    #[test]
    fn test_strip_non_retransmittable() {
        let mut p = Packet::new(
            1,
            vec![
                Frame::Ack(crate::frames::AckFrame::default()),
                Frame::stream(4, vec![1, 2, 3]),
            ],
            100,
            Instant::now(),
            None,
        );
        assert!(p.strip_non_retransmittable_frames());
        assert_eq!(p.frames.len(), 1);

        let mut ack_only = Packet::new(
            2,
            vec![Frame::Ack(crate::frames::AckFrame::default())],
            40,
            Instant::now(),
            None,
        );
        assert!(!ack_only.strip_non_retransmittable_frames());
        assert!(!ack_only.is_retransmittable());
    }
}
