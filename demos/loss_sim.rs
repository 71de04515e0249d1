//! Loss-detection simulation driver
//!
//! Drives a [`SentPacketHandler`] against a simulated lossy path: packets
//! go out under congestion control, a synthetic receiver acks every few
//! packets (with gaps for dropped packets and deadline-meet counters), the
//! alarm fires for whatever the receiver never acks, and retransmissions
//! are drained back into the send loop.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example loss_sim -- --packets 200 --loss 10
//! cargo run --example loss_sim -- --packets 1000 --loss 25 --ack-every 4 -v
//! ```

use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};

use mpquic_recovery::frames::{AckFrame, AckRange, Frame};
use mpquic_recovery::recovery::{Packet, RecoveryConfig, SentPacketHandler};

/// Simulate a lossy path through the recovery core.
#[derive(Parser, Debug)]
#[command(name = "loss_sim")]
struct Args {
    /// Number of data packets to deliver.
    #[arg(long, default_value_t = 200)]
    packets: u64,

    /// Simulated loss percentage (0-100).
    #[arg(long, default_value_t = 10)]
    loss: u8,

    /// Receiver acks after this many received packets.
    #[arg(long, default_value_t = 8)]
    ack_every: usize,

    /// Simulated round-trip time in milliseconds.
    #[arg(long, default_value_t = 30)]
    rtt_ms: u64,

    /// Verbose output (handler traces).
    #[arg(short, long)]
    verbose: bool,
}

/// Deterministic per-packet drop decision, reproducible across runs.
fn should_drop(packet_number: u64, loss_percent: u8) -> bool {
    if loss_percent == 0 {
        return false;
    }
    let hash = packet_number.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    ((hash >> 56) as u8) % 100 < loss_percent
}

/// Build the descending range set for the received packet numbers.
fn ack_ranges(received: &[u64]) -> Vec<AckRange> {
    let mut ranges: Vec<AckRange> = Vec::new();
    for &pn in received {
        match ranges.last_mut() {
            Some(range) if range.last + 1 == pn => range.last = pn,
            _ => ranges.push(AckRange { first: pn, last: pn }),
        }
    }
    if ranges.len() <= 1 {
        return Vec::new(); // no gaps, cumulative ACK
    }
    ranges.reverse();
    ranges
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { Level::TRACE } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();

    let mut handler = SentPacketHandler::new(RecoveryConfig::default(), None, None);
    let start = Instant::now();
    let rtt = Duration::from_millis(args.rtt_ms);

    let mut next_packet_number = 1u64;
    let mut peer_packet_number = 1u64;
    let mut delivered = 0u64;
    let mut pending_receipts: Vec<u64> = Vec::new();

    let mut tick = 0u64;
    while delivered < args.packets {
        let now = start + Duration::from_millis(tick);
        tick += 1;

        // Fire the alarm when its deadline has passed.
        if handler.alarm_timeout().is_some_and(|deadline| deadline <= now) {
            handler.on_alarm(now);
        }

        // Retransmissions drain first and always carry a fresh number.
        let frames = if let Some(lost) = handler.dequeue_packet_for_retransmission() {
            lost.frames
        } else if handler.sending_allowed() {
            vec![Frame::stream(1, vec![0u8; 1000])]
        } else {
            continue;
        };

        let packet_number = next_packet_number;
        next_packet_number += 1;
        let deadline = Some(now + 2 * rtt);
        handler.sent_packet(
            Packet::new(packet_number, frames, 1200, now, deadline),
            now,
        )?;

        if should_drop(packet_number, args.loss) {
            continue;
        }
        pending_receipts.push(packet_number);
        delivered += 1;

        if pending_receipts.len() < args.ack_every {
            continue;
        }

        // The receiver acks the batch one RTT after the oldest receipt.
        let ack_time = now + rtt;
        let has = pending_receipts.len() as u16;
        let meet = pending_receipts
            .iter()
            .filter(|&&pn| !should_drop(pn.wrapping_mul(7), 20))
            .count() as u16;
        let ack = AckFrame {
            largest_acked: *pending_receipts.last().unwrap(),
            lowest_acked: pending_receipts[0],
            ack_ranges: ack_ranges(&pending_receipts),
            delay_time: Duration::from_millis(1),
            path_id: 1,
            num_meet_deadline: meet,
            num_has_deadline: has,
            cur_not_sent: 0,
            alpha: (handler.path_alpha() * 10.0).round() as u8,
        };
        pending_receipts.clear();

        handler.received_ack(&ack, peer_packet_number, ack_time)?;
        peer_packet_number += 1;
        tick += args.rtt_ms;
    }

    let (packets, retransmissions, losses) = handler.statistics();
    info!(packets, retransmissions, losses, "run finished");
    info!(
        sent_bytes = handler.sent_bytes(),
        acked_bytes = handler.acked_bytes(),
        bytes_in_flight = handler.bytes_in_flight(),
        cwnd = handler.congestion_window(),
        "transfer totals"
    );
    info!(
        srtt_ms = handler.rtt_stats().lock().smoothed_rtt().as_millis() as u64,
        session_bandwidth_mbps = handler.session_estimator().lock().session_bandwidth(),
        alpha = handler.path_alpha(),
        deadline_ratio = handler.deadline_ratio(),
        "scheduler readouts"
    );

    Ok(())
}
