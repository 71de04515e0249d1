//! The per-path sent-packet handler.
//!
//! Tracks outbound packets until they are acked or declared lost, arms the
//! loss-detection alarm (time loss, TLP, RTO in that priority), matches
//! incoming ACK ranges against the history, feeds the congestion controller
//! and the deadline bandit, and exposes scheduler readouts.
//!
//! The handler is a non-blocking state machine owned by its path's event
//! loop; the host serialises calls and drives the alarm externally via
//! [`SentPacketHandler::alarm_timeout`] / [`SentPacketHandler::on_alarm`].

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::bandit::DeadlineTracker;
use super::bandwidth::{cwnd_to_bandwidth_mbps, duration_to_milliseconds, SessionEstimator};
use super::congestion::{CubicSender, SendAlgorithm};
use super::packet::{Packet, PacketHistory};
use super::rtt::RttStats;
use super::stop_waiting::StopWaitingManager;
use super::RecoveryConfig;
use crate::frames::{AckFrame, AckRange, ClosePathFrame, StopWaitingFrame};
use crate::{ByteCount, Error, PacketNumber};

/// Maximum reordering in time space before time-based loss detection
/// considers a packet lost, as a fraction of an RTT.
const TIME_REORDERING_FRACTION: f64 = 1.0 / 8.0;

/// RTO on connections without an RTT estimate from congestion.
const DEFAULT_RTO_TIMEOUT: Duration = Duration::from_millis(500);

/// Minimum time in the future an RTO alarm may be set for.
const MIN_RTO_TIMEOUT: Duration = Duration::from_millis(200);

/// Maximum RTO time.
const MAX_RTO_TIMEOUT: Duration = Duration::from_secs(60);

/// Up to two tail loss probes are sent before falling back to RTO, as per
/// draft-dukkipati-tcpm-tcp-loss-probe.
const MAX_TAIL_LOSS_PROBES: u32 = 2;

/// Floor under the retransmission alarm, matching the Linux minimum RTO.
const MIN_RETRANSMISSION_TIME: Duration = Duration::from_millis(200);

/// Minimum tail loss probe timeout.
const MIN_TAIL_LOSS_PROBE_TIMEOUT: Duration = Duration::from_millis(10);

/// Decides, when an RTO fires, whether the path should be treated as
/// potentially failed (flush everything) instead of probing narrowly.
pub type OnRtoCallback = Box<dyn FnMut(Instant) -> bool>;

/// Sent-packet tracking and loss detection for one path.
pub struct SentPacketHandler {
    config: RecoveryConfig,

    last_sent_packet_number: PacketNumber,
    skipped_packets: VecDeque<PacketNumber>,

    /// Non-retransmittable packets since the last retransmittable one.
    num_non_retransmittable_packets: usize,

    largest_acked: PacketNumber,
    largest_received_packet_with_ack: PacketNumber,

    packet_history: PacketHistory,
    stop_waiting: StopWaitingManager,
    retransmission_queue: VecDeque<Packet>,

    bytes_in_flight: ByteCount,

    congestion: Box<dyn SendAlgorithm>,
    rtt_stats: Arc<Mutex<RttStats>>,
    estimator: Arc<Mutex<SessionEstimator>>,

    on_rto: Option<OnRtoCallback>,

    /// RTOs fired without receiving an ack.
    rto_count: u32,
    /// TLPs sent without receiving an ack.
    tlp_count: u32,

    /// When the next packet will be considered lost based on exceeding the
    /// reordering window in time.
    loss_time: Option<Instant>,

    /// When the last packet was sent; seeds the retransmission alarm.
    last_sent_time: Option<Instant>,

    /// The alarm deadline. Set iff the history is non-empty.
    alarm: Option<Instant>,

    packets: u64,
    retransmissions: u64,
    losses: u64,

    acked_bytes: ByteCount,
    sent_bytes: ByteCount,

    deadline: DeadlineTracker,
    deadline_ratio: f32,
}

impl SentPacketHandler {
    /// Create a handler with its own session estimator.
    ///
    /// Without an explicit congestion controller a [`CubicSender`] sharing
    /// this handler's RTT statistics is installed.
    pub fn new(
        config: RecoveryConfig,
        congestion: Option<Box<dyn SendAlgorithm>>,
        on_rto: Option<OnRtoCallback>,
    ) -> Self {
        let estimator = Arc::new(Mutex::new(SessionEstimator::new(
            config.tracked_paths,
            config.rtt_series_cap,
        )));
        Self::with_estimator(config, estimator, congestion, on_rto)
    }

    /// Create a handler sharing a connection-scoped estimator with the
    /// handlers of the other paths.
    pub fn with_estimator(
        config: RecoveryConfig,
        estimator: Arc<Mutex<SessionEstimator>>,
        congestion: Option<Box<dyn SendAlgorithm>>,
        on_rto: Option<OnRtoCallback>,
    ) -> Self {
        let rtt_stats = Arc::new(Mutex::new(RttStats::new()));
        let congestion = congestion.unwrap_or_else(|| {
            Box::new(CubicSender::new(
                rtt_stats.clone(),
                config.initial_congestion_window,
                config.max_congestion_window,
            ))
        });
        let credit_matched = config.credit_play_to_matched_arm;
        Self {
            config,
            last_sent_packet_number: 0,
            skipped_packets: VecDeque::new(),
            num_non_retransmittable_packets: 0,
            largest_acked: 0,
            largest_received_packet_with_ack: 0,
            packet_history: PacketHistory::new(),
            stop_waiting: StopWaitingManager::new(),
            retransmission_queue: VecDeque::new(),
            bytes_in_flight: 0,
            congestion,
            rtt_stats,
            estimator,
            on_rto,
            rto_count: 0,
            tlp_count: 0,
            loss_time: None,
            last_sent_time: None,
            alarm: None,
            packets: 0,
            retransmissions: 0,
            losses: 0,
            acked_bytes: 0,
            sent_bytes: 0,
            deadline: DeadlineTracker::new(credit_matched),
            deadline_ratio: 0.0,
        }
    }

    // === Sending path ===

    /// Register an outbound packet.
    ///
    /// Packet numbers in the gap to the previous send are remembered as
    /// intentionally skipped. Non-retransmittable packets (empty after
    /// frame stripping) are counted but not tracked.
    pub fn sent_packet(&mut self, mut packet: Packet, now: Instant) -> Result<(), Error> {
        if packet.packet_number <= self.last_sent_packet_number {
            return Err(Error::PacketNumberNotIncreasing);
        }
        if self.retransmission_queue.len() + self.packet_history.len() + 1
            > self.config.max_tracked_sent_packets
        {
            return Err(Error::TooManyTrackedSentPackets);
        }

        for p in self.last_sent_packet_number + 1..packet.packet_number {
            self.skipped_packets.push_back(p);
            if self.skipped_packets.len() > self.config.max_tracked_skipped_packets {
                self.skipped_packets.pop_front();
            }
        }

        self.last_sent_packet_number = packet.packet_number;
        self.packets += 1;
        self.last_sent_time = Some(now);

        let is_retransmittable = packet.strip_non_retransmittable_frames();
        let packet_number = packet.packet_number;
        let length = packet.length;

        if is_retransmittable {
            packet.send_time = now;
            self.bytes_in_flight += length;
            self.sent_bytes += length;
            self.packet_history.push_back(packet);
            self.num_non_retransmittable_packets = 0;
        } else {
            self.num_non_retransmittable_packets += 1;
        }

        trace!(
            packet_number,
            length,
            is_retransmittable,
            bytes_in_flight = self.bytes_in_flight,
            "sent packet"
        );

        self.congestion.on_packet_sent(
            now,
            self.bytes_in_flight,
            packet_number,
            length,
            is_retransmittable,
        );

        self.update_loss_detection_alarm();
        Ok(())
    }

    /// True once enough consecutive non-retransmittable packets went out
    /// that the caller should include a retransmittable frame, keeping ACK
    /// elicitation alive.
    pub fn should_send_retransmittable_packet(&self) -> bool {
        self.num_non_retransmittable_packets >= self.config.max_non_retransmittable_packets
    }

    /// Whether another packet may be sent right now.
    ///
    /// Retransmissions are always allowed through even when congestion
    /// limited, so the retransmission queue can drain.
    pub fn sending_allowed(&self) -> bool {
        let congestion_limited = self.bytes_in_flight > self.congestion.congestion_window();
        let max_tracked_limited = self.retransmission_queue.len() + self.packet_history.len()
            >= self.config.max_tracked_sent_packets;
        if congestion_limited {
            debug!(
                bytes_in_flight = self.bytes_in_flight,
                window = self.congestion.congestion_window(),
                "congestion limited"
            );
        } else if max_tracked_limited {
            debug!(
                tracked = self.retransmission_queue.len() + self.packet_history.len(),
                "max tracked limited"
            );
        }
        let have_retransmissions = !self.retransmission_queue.is_empty();
        !max_tracked_limited && (!congestion_limited || have_retransmissions)
    }

    /// Pop the next packet awaiting retransmission, oldest first.
    pub fn dequeue_packet_for_retransmission(&mut self) -> Option<Packet> {
        let packet = self.retransmission_queue.pop_front()?;
        self.retransmissions += 1;
        Some(packet)
    }

    /// Queue an externally duplicated packet for (re)transmission without
    /// touching the history.
    pub fn duplicate_packet(&mut self, packet: Packet) {
        self.retransmission_queue.push_back(packet);
    }

    // === ACK processing ===

    /// Process an ACK frame received in packet `with_packet_number` at
    /// `rcv_time`.
    ///
    /// The deadline extension is folded into the bandit before any
    /// validity checks; duplicate ACKs therefore still update the deadline
    /// counters even though they are otherwise ignored.
    pub fn received_ack(
        &mut self,
        ack: &AckFrame,
        with_packet_number: PacketNumber,
        rcv_time: Instant,
    ) -> Result<(), Error> {
        if ack.largest_acked > self.last_sent_packet_number {
            return Err(Error::AckForUnsentPacket);
        }

        trace!(
            largest_acked = ack.largest_acked,
            lowest_acked = ack.lowest_acked,
            num_meet_deadline = ack.num_meet_deadline,
            num_has_deadline = ack.num_has_deadline,
            cur_not_sent = ack.cur_not_sent,
            alpha = ack.alpha,
            "received ACK"
        );

        self.update_deadline_information(ack);

        if with_packet_number <= self.largest_received_packet_with_ack {
            return Err(Error::DuplicateOrOutOfOrderAck);
        }
        self.largest_received_packet_with_ack = with_packet_number;

        // Repeated ACKs without a higher largest acked carry no new
        // recovery information.
        if ack.largest_acked <= self.largest_in_order_acked() {
            return Ok(());
        }
        self.largest_acked = ack.largest_acked;

        if self.skipped_packets_acked(|p| ack.acks_packet(p)) {
            return Err(Error::AckForSkippedPacket);
        }

        let rtt_updated = self.maybe_update_rtt(ack.largest_acked, ack.delay_time, rcv_time);

        if rtt_updated {
            self.update_session_estimate(ack.path_id);
            self.congestion.maybe_exit_slow_start();
        }

        let acked_packets =
            self.determine_newly_acked(ack.largest_acked, ack.lowest_acked, &ack.ack_ranges)?;
        for packet_number in acked_packets {
            if let Some(length) = self.on_packet_acked(packet_number) {
                self.congestion
                    .on_packet_acked(packet_number, length, self.bytes_in_flight);
            }
        }

        self.detect_lost_packets(rcv_time);
        self.update_loss_detection_alarm();

        self.garbage_collect_skipped_packets();
        self.stop_waiting.received_ack(ack);

        Ok(())
    }

    /// Process the final, ACK-shaped ClosePath frame of a path.
    ///
    /// Acks are matched like a normal ACK but no RTT update happens and no
    /// stale shortcut applies; anything still in flight afterwards is
    /// declared lost.
    pub fn received_close_path(
        &mut self,
        frame: &ClosePathFrame,
        with_packet_number: PacketNumber,
        _rcv_time: Instant,
    ) -> Result<(), Error> {
        if frame.largest_acked > self.last_sent_packet_number {
            return Err(Error::AckForUnsentPacket);
        }

        // A ClosePath frame is the last packet on a path; an out-of-order
        // one is a peer error.
        if with_packet_number <= self.largest_received_packet_with_ack {
            return Err(Error::DuplicateOrOutOfOrderAck);
        }
        self.largest_received_packet_with_ack = with_packet_number;

        if self.skipped_packets_acked(|p| frame.acks_packet(p)) {
            return Err(Error::AckForSkippedPacket);
        }

        let acked_packets = self.determine_newly_acked(
            frame.largest_acked,
            frame.lowest_acked,
            &frame.ack_ranges,
        )?;
        for packet_number in acked_packets {
            if let Some(length) = self.on_packet_acked(packet_number) {
                self.congestion
                    .on_packet_acked(packet_number, length, self.bytes_in_flight);
            }
        }

        self.set_inflight_as_lost();

        self.garbage_collect_skipped_packets();
        // No STOP_WAITING frames follow a path close.

        Ok(())
    }

    /// Declare every remaining in-flight packet at or below the largest
    /// acked as lost and queue it for retransmission.
    pub fn set_inflight_as_lost(&mut self) {
        let mut lost = Vec::new();
        for packet in self.packet_history.iter() {
            if packet.packet_number > self.largest_acked {
                break;
            }
            lost.push(packet.packet_number);
        }

        for packet_number in lost {
            self.losses += 1;
            if let Some((_, length)) = self.queue_packet_for_retransmission(packet_number) {
                self.congestion
                    .on_packet_lost(packet_number, length, self.bytes_in_flight);
            }
        }
    }

    // === Alarm ===

    /// The current alarm deadline; `None` while nothing is in flight.
    pub fn alarm_timeout(&self) -> Option<Instant> {
        self.alarm
    }

    /// The host calls this once the alarm deadline has elapsed.
    ///
    /// Resolves, in priority order, into time-based loss detection, a tail
    /// loss probe, or an RTO escalation, then re-arms.
    pub fn on_alarm(&mut self, now: Instant) {
        if !self.has_outstanding_retransmittable_packet() {
            self.alarm = None;
            return;
        }

        if self.loss_time.is_some() {
            // Early retransmit or time loss detection.
            self.detect_lost_packets(now);
        } else if self.tlp_count < MAX_TAIL_LOSS_PROBES {
            debug!(tlp_count = self.tlp_count, "tail loss probe");
            self.retransmit_tlp();
            self.tlp_count += 1;
        } else {
            let potentially_failed = match self.on_rto.as_mut() {
                Some(callback) => {
                    let last_sent = self.last_sent_time.unwrap_or(now);
                    callback(last_sent)
                }
                None => false,
            };
            debug!(rto_count = self.rto_count, potentially_failed, "RTO fired");
            if potentially_failed {
                self.retransmit_all_packets();
            } else {
                self.retransmit_oldest_two_packets();
            }
            self.rto_count += 1;
        }

        self.update_loss_detection_alarm();
    }

    // === Readouts ===

    /// `(packets, retransmissions, losses)` counters.
    pub fn statistics(&self) -> (u64, u64, u64) {
        (self.packets, self.retransmissions, self.losses)
    }

    /// Total bytes acknowledged.
    pub fn acked_bytes(&self) -> ByteCount {
        self.acked_bytes
    }

    /// Total retransmittable bytes sent.
    pub fn sent_bytes(&self) -> ByteCount {
        self.sent_bytes
    }

    /// Bytes currently tracked in the history.
    pub fn bytes_in_flight(&self) -> ByteCount {
        self.bytes_in_flight
    }

    /// The congestion controller's current window.
    pub fn congestion_window(&self) -> ByteCount {
        self.congestion.congestion_window()
    }

    /// The largest packet number the peer has acked.
    pub fn largest_acked(&self) -> PacketNumber {
        self.largest_acked
    }

    /// The number of the last packet handed to [`Self::sent_packet`].
    pub fn last_packet_number(&self) -> PacketNumber {
        self.last_sent_packet_number
    }

    /// One above the largest in-order acked packet number.
    pub fn least_unacked(&self) -> PacketNumber {
        self.largest_in_order_acked() + 1
    }

    /// The alpha of the bandit's currently selected arm.
    pub fn path_alpha(&self) -> f32 {
        self.deadline.path_alpha()
    }

    /// The windowed deadline-meet ratio published on the last ACK.
    pub fn deadline_ratio(&self) -> f32 {
        self.deadline_ratio
    }

    /// Cumulative deadline-meet ratio.
    pub fn meet_ratio(&self) -> f32 {
        self.deadline.calculate_meet_ratio()
    }

    /// Blend of cumulative and current-window meet ratios.
    pub fn instant_meet_ratio(&self) -> f32 {
        self.deadline.calculate_instant_meet_ratio()
    }

    /// The deadline tracker, for scheduler introspection.
    pub fn deadline_tracker(&self) -> &DeadlineTracker {
        &self.deadline
    }

    /// Shared RTT statistics for this path.
    pub fn rtt_stats(&self) -> Arc<Mutex<RttStats>> {
        self.rtt_stats.clone()
    }

    /// The connection-scoped bandwidth estimator.
    pub fn session_estimator(&self) -> Arc<Mutex<SessionEstimator>> {
        self.estimator.clone()
    }

    /// The STOP_WAITING frame to attach to the next packet, if one is due.
    pub fn get_stop_waiting_frame(&mut self, force: bool) -> Option<StopWaitingFrame> {
        self.stop_waiting.get_stop_waiting_frame(force)
    }

    // === Internals ===

    /// The packet number below which everything has been acked.
    fn largest_in_order_acked(&self) -> PacketNumber {
        match self.packet_history.front() {
            Some(front) => front.packet_number.saturating_sub(1),
            None => self.largest_acked,
        }
    }

    fn has_outstanding_retransmittable_packet(&self) -> bool {
        self.packet_history.iter().any(Packet::is_retransmittable)
    }

    fn update_deadline_information(&mut self, ack: &AckFrame) {
        self.deadline_ratio = self.deadline.on_ack(ack);
    }

    /// Derive bandwidth from the congestion window and fold it, along with
    /// the smoothed RTT, into the connection-scoped estimator.
    fn update_session_estimate(&mut self, path_id: crate::PathId) {
        let rtt_ms = duration_to_milliseconds(self.rtt_stats.lock().smoothed_rtt());
        let bandwidth =
            cwnd_to_bandwidth_mbps(self.congestion.congestion_window() as f64, rtt_ms);

        let mut estimator = self.estimator.lock();
        estimator.record_bandwidth(path_id, bandwidth);
        let session_bandwidth = estimator.session_bandwidth();
        let smoothed_rtt = estimator.smooth_rtt(rtt_ms);
        drop(estimator);

        debug!(
            path_id,
            rtt_ms = smoothed_rtt,
            bandwidth_mbps = bandwidth,
            session_bandwidth_mbps = session_bandwidth,
            deadline_bandwidth_mbps = bandwidth * self.deadline_ratio as f64,
            "path estimate"
        );
    }

    /// RTT is sampled only when the largest acked packet is still in the
    /// history at ACK time.
    fn maybe_update_rtt(
        &mut self,
        largest_acked: PacketNumber,
        ack_delay: Duration,
        rcv_time: Instant,
    ) -> bool {
        for packet in self.packet_history.iter() {
            if packet.packet_number == largest_acked {
                self.rtt_stats.lock().update_rtt(
                    rcv_time.saturating_duration_since(packet.send_time),
                    ack_delay,
                    rcv_time,
                );
                return true;
            }
            // Packets are sorted by number, so we can stop searching.
            if packet.packet_number > largest_acked {
                break;
            }
        }
        false
    }

    /// Walk the history against the ACK's range set and collect the newly
    /// acked packet numbers.
    ///
    /// Ranges arrive highest-first; the cursor starts at the last (lowest)
    /// one and advances as the ascending history walk overtakes each range.
    fn determine_newly_acked(
        &self,
        largest_acked: PacketNumber,
        lowest_acked: PacketNumber,
        ack_ranges: &[AckRange],
    ) -> Result<Vec<PacketNumber>, Error> {
        let mut acked = Vec::new();
        let mut range_idx = 0usize;

        for packet in self.packet_history.iter() {
            let packet_number = packet.packet_number;

            if packet_number < lowest_acked {
                continue;
            }
            if packet_number > largest_acked {
                break;
            }

            if !ack_ranges.is_empty() {
                let mut range = &ack_ranges[ack_ranges.len() - 1 - range_idx];
                while packet_number > range.last && range_idx < ack_ranges.len() - 1 {
                    range_idx += 1;
                    range = &ack_ranges[ack_ranges.len() - 1 - range_idx];
                }

                if packet_number >= range.first {
                    if packet_number > range.last {
                        return Err(Error::AckRangeEvaluation {
                            packet_number,
                            first: range.first,
                            last: range.last,
                        });
                    }
                    acked.push(packet_number);
                }
            } else {
                acked.push(packet_number);
            }
        }

        Ok(acked)
    }

    /// Remove an acked packet from the history and account for it.
    /// Returns its length for the congestion callback.
    fn on_packet_acked(&mut self, packet_number: PacketNumber) -> Option<ByteCount> {
        let packet = self.packet_history.remove(packet_number)?;
        self.bytes_in_flight -= packet.length;
        self.rto_count = 0;
        self.tlp_count = 0;
        self.acked_bytes += packet.length;
        Some(packet.length)
    }

    /// Declare packets lost whose age exceeds the reordering window, and
    /// schedule the alarm for the first one that has not aged out yet.
    fn detect_lost_packets(&mut self, now: Instant) {
        self.loss_time = None;

        let (latest_rtt, smoothed_rtt) = {
            let rtt = self.rtt_stats.lock();
            (rtt.latest_rtt(), rtt.smoothed_rtt())
        };
        let max_rtt = latest_rtt.max(smoothed_rtt);
        let delay_until_lost = max_rtt.mul_f64(1.0 + TIME_REORDERING_FRACTION);

        let mut lost = Vec::new();
        for packet in self.packet_history.iter() {
            if packet.packet_number > self.largest_acked {
                break;
            }

            let time_since_sent = now.saturating_duration_since(packet.send_time);
            if time_since_sent > delay_until_lost {
                lost.push(packet.packet_number);
            } else if self.loss_time.is_none() {
                // Only the first surviving packet schedules the alarm.
                self.loss_time = Some(now + (delay_until_lost - time_since_sent));
            }
        }

        for packet_number in lost {
            debug!(packet_number, "packet lost (time threshold)");
            self.losses += 1;
            if let Some((_, length)) = self.queue_packet_for_retransmission(packet_number) {
                self.congestion
                    .on_packet_lost(packet_number, length, self.bytes_in_flight);
            }
        }
    }

    /// Cancel or re-arm the alarm: time loss beats TLP beats RTO.
    fn update_loss_detection_alarm(&mut self) {
        if self.packet_history.is_empty() {
            self.alarm = None;
            return;
        }
        let Some(last_sent_time) = self.last_sent_time else {
            self.alarm = None;
            return;
        };

        if let Some(loss_time) = self.loss_time {
            // Early retransmit timer or time loss detection.
            self.alarm = Some(loss_time);
        } else if !self.rtt_stats.lock().smoothed_rtt().is_zero()
            && self.tlp_count < MAX_TAIL_LOSS_PROBES
        {
            self.alarm = Some(last_sent_time + self.compute_tlp_timeout());
        } else {
            self.alarm =
                Some(last_sent_time + self.compute_rto_timeout().max(MIN_RETRANSMISSION_TIME));
        }
    }

    /// RTO from the congestion controller's delay estimate, clamped and
    /// backed off exponentially per unanswered RTO.
    fn compute_rto_timeout(&self) -> Duration {
        let mut rto = self.congestion.retransmission_delay();
        if rto.is_zero() {
            rto = DEFAULT_RTO_TIMEOUT;
        }
        rto = rto.max(MIN_RTO_TIMEOUT);
        // Exponential backoff
        let shift = self.rto_count.min(16);
        rto = rto.checked_mul(1u32 << shift).unwrap_or(MAX_RTO_TIMEOUT);
        rto.min(MAX_RTO_TIMEOUT)
    }

    fn has_multiple_outstanding_retransmittable_packets(&self) -> bool {
        self.packet_history.len() >= 2
    }

    fn compute_tlp_timeout(&self) -> Duration {
        let rtt = self.congestion.smoothed_rtt();
        if self.has_multiple_outstanding_retransmittable_packets() {
            (2 * rtt).max(rtt * 3 / 2 + MIN_RETRANSMISSION_TIME / 2)
        } else {
            (2 * rtt).max(MIN_TAIL_LOSS_PROBE_TIMEOUT)
        }
    }

    /// Queue the newest in-flight packet as a tail loss probe.
    fn retransmit_tlp(&mut self) {
        if let Some(packet_number) = self.packet_history.back().map(|p| p.packet_number) {
            self.queue_packet_for_retransmission(packet_number);
        }
    }

    /// RTO escalation for a potentially failed path: requeue everything.
    fn retransmit_all_packets(&mut self) {
        while let Some(packet_number) = self.packet_history.front().map(|p| p.packet_number) {
            self.queue_rto(packet_number);
        }
        self.congestion.on_retransmission_timeout(true);
    }

    fn retransmit_oldest_packet(&mut self) {
        if let Some(packet_number) = self.packet_history.front().map(|p| p.packet_number) {
            self.queue_rto(packet_number);
        }
    }

    /// Standard RTO escalation: requeue the two oldest packets.
    fn retransmit_oldest_two_packets(&mut self) {
        self.retransmit_oldest_packet();
        self.retransmit_oldest_packet();
        self.congestion.on_retransmission_timeout(true);
    }

    fn queue_rto(&mut self, packet_number: PacketNumber) {
        debug!(
            packet_number,
            outstanding = self.packet_history.len(),
            "queueing packet for retransmission (RTO)"
        );
        if let Some((_, length)) = self.queue_packet_for_retransmission(packet_number) {
            self.losses += 1;
            self.congestion
                .on_packet_lost(packet_number, length, self.bytes_in_flight);
        }
    }

    /// Move a packet from the history to the retransmission queue.
    fn queue_packet_for_retransmission(
        &mut self,
        packet_number: PacketNumber,
    ) -> Option<(PacketNumber, ByteCount)> {
        let packet = self.packet_history.remove(packet_number)?;
        self.bytes_in_flight -= packet.length;
        let length = packet.length;
        self.stop_waiting
            .queued_retransmission_for_packet_number(packet_number);
        self.retransmission_queue.push_back(packet);
        Some((packet_number, length))
    }

    fn skipped_packets_acked(&self, acks: impl Fn(PacketNumber) -> bool) -> bool {
        self.skipped_packets.iter().any(|&p| acks(p))
    }

    /// Skipped numbers at or below the in-order floor can no longer be
    /// maliciously acked.
    fn garbage_collect_skipped_packets(&mut self) {
        let floor = self.largest_in_order_acked();
        self.skipped_packets.retain(|&p| p > floor);
    }
}

impl std::fmt::Debug for SentPacketHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SentPacketHandler")
            .field("last_sent_packet_number", &self.last_sent_packet_number)
            .field("largest_acked", &self.largest_acked)
            .field("bytes_in_flight", &self.bytes_in_flight)
            .field("tracked", &self.packet_history.len())
            .field("queued", &self.retransmission_queue.len())
            .field("rto_count", &self.rto_count)
            .field("tlp_count", &self.tlp_count)
            .field("alarm", &self.alarm)
            .finish()
    }
}
