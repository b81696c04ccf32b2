//! Convergence detection for lazily-rendered listings.
//!
//! [`Stabilizer`] consumes one item count per loop iteration and decides
//! whether the page has stopped growing. It is pure: no browser, no clock,
//! so any count sequence can be replayed in tests.
//!
//! States move once per observation:
//!
//! ```text
//! Scanning ──same count──▶ Stabilizing(1) ──same──▶ … ──streak == threshold──▶ Converged
//!    ▲                           │
//!    └──────count changed────────┘
//! budget spent without converging ─────────────────────────────────────────▶ Exhausted
//! ```

/// Where the detector currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Last observation differed from the one before (or was the first).
    Scanning,
    /// This many consecutive observations repeated the previous count.
    Stabilizing(u32),
    /// The streak reached the threshold; stop scrolling.
    Converged,
    /// The check budget ran out before convergence.
    Exhausted,
}

impl Phase {
    /// Whether no further observations will be accepted.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Converged | Self::Exhausted)
    }
}

/// How a materialization run ended. Both variants are successes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Item count held steady for the required number of checks.
    Converged { checks: u32, count: usize },
    /// `max_scrolls` checks ran out; content is best effort.
    Exhausted { checks: u32, count: usize },
}

impl Outcome {
    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged { .. })
    }

    /// Count checks performed.
    pub fn checks(&self) -> u32 {
        match *self {
            Self::Converged { checks, .. } | Self::Exhausted { checks, .. } => checks,
        }
    }

    /// Last item count observed inside the loop.
    pub fn count(&self) -> usize {
        match *self {
            Self::Converged { count, .. } | Self::Exhausted { count, .. } => count,
        }
    }
}

/// Debounced "has the item count stopped growing" detector.
#[derive(Debug, Clone)]
pub struct Stabilizer {
    /// `None` until the first observation, so it never matches a real count.
    previous: Option<usize>,
    streak: u32,
    threshold: u32,
    budget: u32,
    checks: u32,
    phase: Phase,
}

impl Stabilizer {
    /// `budget` bounds the number of observations; `threshold` is the number
    /// of consecutive repeats that declares convergence. Both are raised to 1.
    pub fn new(budget: u32, threshold: u32) -> Self {
        Self {
            previous: None,
            streak: 0,
            threshold: threshold.max(1),
            budget: budget.max(1),
            checks: 0,
            phase: Phase::Scanning,
        }
    }

    /// Whether another count check may run.
    pub fn has_budget(&self) -> bool {
        !self.phase.is_terminal() && self.checks < self.budget
    }

    /// Feed one item count and return the resulting phase.
    ///
    /// Observations after a terminal phase are ignored. Running out of budget
    /// is only reported by [`Stabilizer::finish`], since the caller still
    /// scrolls after the last non-converging check.
    pub fn observe(&mut self, count: usize) -> Phase {
        if self.phase.is_terminal() || self.checks >= self.budget {
            return self.phase;
        }
        self.checks += 1;

        if self.previous == Some(count) {
            self.streak += 1;
        } else {
            self.streak = 0;
            self.previous = Some(count);
        }

        self.phase = if self.streak >= self.threshold {
            Phase::Converged
        } else if self.streak == 0 {
            Phase::Scanning
        } else {
            Phase::Stabilizing(self.streak)
        };
        self.phase
    }

    /// Close the run and report how it ended.
    pub fn finish(&mut self) -> Outcome {
        let count = self.previous.unwrap_or(0);
        if self.phase == Phase::Converged {
            Outcome::Converged {
                checks: self.checks,
                count,
            }
        } else {
            self.phase = Phase::Exhausted;
            Outcome::Exhausted {
                checks: self.checks,
                count,
            }
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }

    pub fn checks(&self) -> u32 {
        self.checks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Replay counts the way the scroll loop does; returns the outcome and
    /// how many scrolls would have been triggered.
    fn replay(counts: &[usize], budget: u32, threshold: u32) -> (Outcome, usize) {
        let mut detector = Stabilizer::new(budget, threshold);
        let mut scrolls = 0;
        let mut feed = counts.iter().copied();
        while detector.has_budget() {
            let Some(count) = feed.next() else { break };
            if detector.observe(count) == Phase::Converged {
                break;
            }
            scrolls += 1;
        }
        (detector.finish(), scrolls)
    }

    #[test]
    fn first_observation_never_matches_sentinel() {
        for count in [0, 1, 42] {
            let mut detector = Stabilizer::new(10, 2);
            assert_eq!(detector.observe(count), Phase::Scanning);
            assert_eq!(detector.streak(), 0);
        }
    }

    #[test]
    fn repeated_count_builds_streak() {
        let mut detector = Stabilizer::new(10, 2);
        assert_eq!(detector.observe(3), Phase::Scanning);
        assert_eq!(detector.observe(5), Phase::Scanning);
        assert_eq!(detector.observe(5), Phase::Stabilizing(1));
        assert_eq!(detector.observe(5), Phase::Converged);
        assert_eq!(detector.checks(), 4);
    }

    #[test]
    fn growth_resets_streak() {
        let mut detector = Stabilizer::new(10, 2);
        detector.observe(4);
        assert_eq!(detector.observe(4), Phase::Stabilizing(1));
        assert_eq!(detector.observe(9), Phase::Scanning);
        assert_eq!(detector.streak(), 0);
        assert_eq!(detector.observe(9), Phase::Stabilizing(1));
    }

    #[test]
    fn steady_growth_never_converges() {
        let (outcome, scrolls) = replay(&[3, 5, 7, 9], 4, 2);
        assert_eq!(outcome, Outcome::Exhausted { checks: 4, count: 9 });
        assert_eq!(scrolls, 4);
    }

    #[test]
    fn identical_counts_converge_on_third_check() {
        let (outcome, scrolls) = replay(&[4, 4, 4, 4, 4], 20, 2);
        assert_eq!(outcome, Outcome::Converged { checks: 3, count: 4 });
        assert_eq!(scrolls, 2);
    }

    #[test]
    fn single_check_budget_falls_through() {
        let (outcome, scrolls) = replay(&[7, 7, 7], 1, 2);
        assert_eq!(outcome, Outcome::Exhausted { checks: 1, count: 7 });
        assert_eq!(scrolls, 1);
    }

    #[test]
    fn loop_terminates_within_budget_for_any_sequence() {
        let sequences: [&[usize]; 4] = [
            &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12],
            &[0, 0, 1, 1, 2, 2, 3, 3, 4, 4],
            &[5, 4, 5, 4, 5, 4, 5, 4],
            &[9; 12],
        ];
        for budget in 1..=6 {
            for counts in sequences {
                let (outcome, scrolls) = replay(counts, budget, 2);
                assert!(outcome.checks() <= budget);
                assert!(scrolls <= budget as usize);
            }
        }
    }

    #[test]
    fn shrinking_count_is_a_change() {
        let (outcome, _) = replay(&[10, 8, 8, 8], 10, 2);
        assert_eq!(outcome, Outcome::Converged { checks: 4, count: 8 });
    }

    #[test]
    fn observations_after_convergence_are_ignored() {
        let mut detector = Stabilizer::new(10, 1);
        detector.observe(2);
        assert_eq!(detector.observe(2), Phase::Converged);
        assert_eq!(detector.observe(99), Phase::Converged);
        assert_eq!(detector.checks(), 2);
        assert!(!detector.has_budget());
    }

    #[test]
    fn finish_without_observations_is_exhausted() {
        let mut detector = Stabilizer::new(3, 2);
        assert_eq!(detector.finish(), Outcome::Exhausted { checks: 0, count: 0 });
        assert_eq!(detector.phase(), Phase::Exhausted);
    }
}
