//! Deadline accounting and the discounted-UCB alpha bandit.
//!
//! Every ACK frame carries the peer's deadline counters for the current
//! window. They are folded into a per-arm history, turned into a reward,
//! and fed to an upper-confidence-bound bandit over four alpha candidates.
//! Network conditions drift, so past rewards are geometrically discounted;
//! the not-sent penalty ties the reward to path productivity.

use std::collections::VecDeque;

use crate::frames::AckFrame;

/// Discount factor applied to an arm's accumulated reward per play.
const GAMMA: f32 = 0.8;

/// Batch size normalising the not-sent penalty.
const BATCH: f32 = 6.0;

/// Samples of deadline counters kept per arm.
const HISTORY_LEN: usize = 5;

/// UCB assigned to arms that have never been played, preferring them over
/// any realistic played score.
const UCB_UNPLAYED: f32 = 2.0;

/// The alpha candidates, one per arm.
const ARMS_ALPHA: [f32; 4] = [0.9, 1.0, 1.1, 1.2];

/// Tolerance for matching a wire alpha against an arm.
const ALPHA_EPSILON: f64 = 1e-5;

/// Per-arm bandit bookkeeping.
#[derive(Debug, Clone)]
struct BanditState {
    arms_num_play: [u32; 4],
    total_num_play: u32,
    total_reward: [f32; 4],
    cur_arm_index: usize,
}

impl BanditState {
    fn new() -> Self {
        Self {
            arms_num_play: [0; 4],
            total_num_play: 0,
            total_reward: [0.0; 4],
            cur_arm_index: 0,
        }
    }

    fn compute_ucb(&self) -> [f32; 4] {
        let mut ucbs = [0.0f32; 4];
        for (i, ucb) in ucbs.iter_mut().enumerate() {
            if self.arms_num_play[i] == 0 {
                *ucb = UCB_UNPLAYED;
            } else {
                let avg = self.total_reward[i] / self.arms_num_play[i] as f32;
                let delta = (2.0 * ((self.total_num_play + 1) as f64).ln()
                    / self.arms_num_play[i] as f64)
                    .sqrt();
                *ucb = avg + delta as f32;
            }
        }
        ucbs
    }
}

/// The first arm with the maximal UCB.
fn select_best_arm(ucbs: &[f32; 4]) -> usize {
    let mut best = 0;
    let mut max = ucbs[0];
    for (i, &ucb) in ucbs.iter().enumerate() {
        if ucb > max {
            best = i;
            max = ucb;
        }
    }
    best
}

/// The arm whose alpha matches within tolerance; 0 when nothing matches.
fn find_arm_index(alpha: f32) -> usize {
    let mut index = 0;
    for (i, &val) in ARMS_ALPHA.iter().enumerate() {
        if ((val - alpha) as f64).abs() < ALPHA_EPSILON {
            index = i;
        }
    }
    index
}

/// Deadline-meet accounting plus the alpha bandit for one path.
#[derive(Debug)]
pub struct DeadlineTracker {
    total_meet: u16,
    total_has: u16,
    cur_meet: u16,
    cur_has: u16,
    bandit: BanditState,
    meet_history: [VecDeque<u16>; 4],
    has_history: [VecDeque<u16>; 4],
    credit_play_to_matched_arm: bool,
}

impl DeadlineTracker {
    /// Create a tracker with no plays recorded.
    ///
    /// `credit_play_to_matched_arm` corrects the play-count bookkeeping to
    /// the arm the reward goes to; off, the play is booked against the
    /// currently selected arm (the stock behavior).
    pub fn new(credit_play_to_matched_arm: bool) -> Self {
        Self {
            total_meet: 0,
            total_has: 0,
            cur_meet: 0,
            cur_has: 0,
            bandit: BanditState::new(),
            meet_history: Default::default(),
            has_history: Default::default(),
            credit_play_to_matched_arm,
        }
    }

    /// Fold one ACK frame's deadline extension into the bandit.
    ///
    /// Returns the windowed meet ratio of the matched arm, published by the
    /// handler as the path's deadline ratio.
    pub fn on_ack(&mut self, frame: &AckFrame) -> f32 {
        self.cur_meet = frame.num_meet_deadline;
        self.cur_has = frame.num_has_deadline;

        let alpha_true = frame.alpha as f32 / 10.0;
        let arm = find_arm_index(alpha_true);

        self.push_history(arm);

        let ratio = self.history_meet_ratio(arm);
        let reward = ratio - frame.cur_not_sent as f32 / BATCH;
        self.update_bandit(reward, arm);

        self.update_alpha();

        self.total_meet = self.total_meet.wrapping_add(frame.num_meet_deadline);
        self.total_has = self.total_has.wrapping_add(frame.num_has_deadline);

        ratio
    }

    /// The alpha of the currently selected arm.
    pub fn path_alpha(&self) -> f32 {
        ARMS_ALPHA[self.bandit.cur_arm_index]
    }

    /// Index of the currently selected arm.
    pub fn cur_arm_index(&self) -> usize {
        self.bandit.cur_arm_index
    }

    /// Cumulative meet ratio over everything acked so far.
    pub fn calculate_meet_ratio(&self) -> f32 {
        self.total_meet as f32 / (self.total_has as f32 + 1.0)
    }

    /// Blend of the cumulative ratio and the current window's ratio;
    /// 0 when the current window carried no deadlines.
    pub fn calculate_instant_meet_ratio(&self) -> f32 {
        if self.cur_has == 0 {
            return 0.0;
        }
        let accumulated = self.calculate_meet_ratio();
        let current = self.cur_meet as f32 / self.cur_has as f32;
        accumulated * 0.5 + current * 0.5
    }

    /// Total plays across all arms.
    pub fn total_num_play(&self) -> u32 {
        self.bandit.total_num_play
    }

    /// Plays booked per arm.
    pub fn arms_num_play(&self) -> [u32; 4] {
        self.bandit.arms_num_play
    }

    /// The UCB scores as of the last update.
    pub fn ucb_scores(&self) -> [f32; 4] {
        self.bandit.compute_ucb()
    }

    fn push_history(&mut self, arm: usize) {
        self.meet_history[arm].push_back(self.cur_meet);
        self.has_history[arm].push_back(self.cur_has);
        while self.meet_history[arm].len() > HISTORY_LEN {
            self.meet_history[arm].pop_front();
        }
        while self.has_history[arm].len() > HISTORY_LEN {
            self.has_history[arm].pop_front();
        }
    }

    /// Windowed meet ratio of an arm: 0 until its history is full, and 0
    /// when the window carried no deadlines at all.
    fn history_meet_ratio(&self, arm: usize) -> f32 {
        if self.meet_history[arm].len() < HISTORY_LEN
            || self.has_history[arm].len() < HISTORY_LEN
        {
            return 0.0;
        }
        let meet_sum: u16 = self.meet_history[arm].iter().sum();
        let has_sum: u16 = self.has_history[arm].iter().sum();
        if has_sum == 0 {
            return 0.0;
        }
        meet_sum as f32 / has_sum as f32
    }

    fn update_bandit(&mut self, reward: f32, arm: usize) {
        self.bandit.total_reward[arm] = GAMMA * self.bandit.total_reward[arm] + reward;

        let play_arm = if self.credit_play_to_matched_arm {
            arm
        } else {
            self.bandit.cur_arm_index
        };
        self.bandit.arms_num_play[play_arm] += 1;
        self.bandit.total_num_play += 1;
    }

    fn update_alpha(&mut self) {
        let ucbs = self.bandit.compute_ucb();
        self.bandit.cur_arm_index = select_best_arm(&ucbs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ack(alpha_tenths: u8, meet: u16, has: u16, not_sent: u8) -> AckFrame {
        AckFrame {
            alpha: alpha_tenths,
            num_meet_deadline: meet,
            num_has_deadline: has,
            cur_not_sent: not_sent,
            ..Default::default()
        }
    }

    #[test]
    fn test_find_arm_index() {
        assert_eq!(find_arm_index(0.9), 0);
        assert_eq!(find_arm_index(1.0), 1);
        assert_eq!(find_arm_index(1.1), 2);
        assert_eq!(find_arm_index(1.2), 3);
        // Unknown alphas silently map to arm 0.
        assert_eq!(find_arm_index(0.5), 0);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut tracker = DeadlineTracker::new(false);
        for _ in 0..20 {
            tracker.on_ack(&ack(11, 5, 5, 0));
        }
        assert!(tracker.meet_history[2].len() <= HISTORY_LEN);
        assert!(tracker.has_history[2].len() <= HISTORY_LEN);
    }

    #[test]
    fn test_ratio_zero_until_history_full() {
        let mut tracker = DeadlineTracker::new(false);
        for _ in 0..HISTORY_LEN - 1 {
            assert_eq!(tracker.on_ack(&ack(10, 5, 5, 0)), 0.0);
        }
        assert_eq!(tracker.on_ack(&ack(10, 5, 5, 0)), 1.0);
    }

    #[test]
    fn test_play_counts_sum_to_total() {
        let mut tracker = DeadlineTracker::new(false);
        for i in 0..17u16 {
            tracker.on_ack(&ack(9 + (i % 4) as u8, 3, 5, 0));
        }
        let plays: u32 = tracker.arms_num_play().iter().sum();
        assert_eq!(plays, tracker.total_num_play());
        assert_eq!(tracker.total_num_play(), 17);
    }

    #[test]
    fn test_selected_arm_is_argmax() {
        let mut tracker = DeadlineTracker::new(false);
        for i in 0..12u16 {
            tracker.on_ack(&ack(9 + (i % 4) as u8, 4, 5, 0));
        }
        let ucbs = tracker.ucb_scores();
        assert_eq!(tracker.cur_arm_index(), select_best_arm(&ucbs));
    }

    #[test]
    fn test_unplayed_arms_preferred() {
        let bandit = BanditState::new();
        let ucbs = bandit.compute_ucb();
        assert_eq!(ucbs, [UCB_UNPLAYED; 4]);
        // First-wins on ties.
        assert_eq!(select_best_arm(&ucbs), 0);
    }

    #[test]
    fn test_meet_ratio_readouts() {
        let mut tracker = DeadlineTracker::new(false);
        tracker.on_ack(&ack(10, 4, 8, 0));

        // 4 / (8 + 1)
        assert!((tracker.calculate_meet_ratio() - 4.0 / 9.0).abs() < 1e-6);
        // 0.5 * 4/9 + 0.5 * 4/8
        let expected = 0.5 * (4.0 / 9.0) + 0.5 * 0.5;
        assert!((tracker.calculate_instant_meet_ratio() - expected).abs() < 1e-6);
    }

    #[test]
    fn test_instant_ratio_zero_without_deadlines() {
        let mut tracker = DeadlineTracker::new(false);
        tracker.on_ack(&ack(10, 0, 0, 0));
        assert_eq!(tracker.calculate_instant_meet_ratio(), 0.0);
    }

    #[test]
    fn test_not_sent_penalty_lowers_reward() {
        let mut penalised = DeadlineTracker::new(true);
        let mut clean = DeadlineTracker::new(true);
        for _ in 0..HISTORY_LEN {
            penalised.on_ack(&ack(10, 5, 5, 6));
            clean.on_ack(&ack(10, 5, 5, 0));
        }
        assert!(penalised.bandit.total_reward[1] < clean.bandit.total_reward[1]);
    }

    #[test]
    fn test_convergence_to_best_arm() {
        let mut tracker = DeadlineTracker::new(true);

        // Prime each arm once.
        for arm_alpha in [9u8, 10, 11, 12] {
            tracker.on_ack(&ack(arm_alpha, 5, 5, 0));
        }
        // Arm 2 (alpha 1.1) keeps meeting deadlines, the others do not.
        // With symmetric feeding the play counts stay equal at every round
        // boundary, so the arm with the best reward holds the argmax there.
        for round in 0..10 {
            tracker.on_ack(&ack(9, 1, 5, 0));
            tracker.on_ack(&ack(10, 1, 5, 0));
            tracker.on_ack(&ack(12, 1, 5, 0));
            tracker.on_ack(&ack(11, 5, 5, 0));

            if round >= 4 {
                assert_eq!(tracker.cur_arm_index(), 2, "round {round}");
            }
        }

        assert_eq!(tracker.cur_arm_index(), 2);
        assert!((tracker.path_alpha() - 1.1).abs() < 1e-6);
    }

    #[test]
    fn test_stock_mode_books_play_against_selected_arm() {
        let mut tracker = DeadlineTracker::new(false);
        assert_eq!(tracker.cur_arm_index(), 0);

        // The reward goes to the matched arm (2), the play to the selected
        // arm (0). Preserved from the original bookkeeping.
        tracker.on_ack(&ack(11, 5, 5, 0));
        assert_eq!(tracker.arms_num_play()[0], 1);
        assert_eq!(tracker.arms_num_play()[2], 0);
    }
}
