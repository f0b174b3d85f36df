//! The three independent session end conditions.
//!
//! Each condition is its own small state machine (`Inactive`, `Counting`,
//! `Fired`) and knows nothing about the others. The engine decides which
//! firing ends the session; the first one wins.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use kinder_protocol::{EndConditions, MovieKey, Session, OVER_MATCHES, OVER_TIME};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionState {
    Inactive,
    Counting,
    Fired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Normal,
    Warning,
    Critical,
}

impl Severity {
    pub fn is_critical(&self) -> bool {
        matches!(self, Severity::Critical)
    }
}

/// Why the session ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EndCause {
    Time,
    Matches,
    /// Reported by the source when asking for the next movie.
    Server { reason: String },
}

impl EndCause {
    pub fn server(reason: impl Into<String>) -> Self {
        EndCause::Server {
            reason: reason.into(),
        }
    }

    /// User-facing reason, matching the wording the server uses.
    pub fn reason(&self) -> &str {
        match self {
            EndCause::Time => OVER_TIME,
            EndCause::Matches => OVER_MATCHES,
            EndCause::Server { reason } => reason,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Time
// ═══════════════════════════════════════════════════════════════════════════════

const SECONDS_PER_MINUTE: f64 = 60.0;
const SECONDS_PER_HOUR: f64 = 3600.0;

/// Remaining time, rounded to the unit shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "unit", content = "value", rename_all = "snake_case")]
pub enum TimeTier {
    Hours(i64),
    Minutes(i64),
    Seconds(i64),
}

impl TimeTier {
    pub fn from_remaining(seconds: f64) -> Self {
        if seconds > SECONDS_PER_HOUR {
            TimeTier::Hours((seconds / SECONDS_PER_HOUR).floor() as i64)
        } else if seconds > SECONDS_PER_MINUTE {
            TimeTier::Minutes((seconds / SECONDS_PER_MINUTE).ceil() as i64)
        } else {
            // Never reads zero while time is left.
            TimeTier::Seconds((seconds.floor() as i64).max(1))
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            TimeTier::Seconds(s) if *s <= 10 => Severity::Critical,
            TimeTier::Seconds(s) if *s <= 30 => Severity::Warning,
            _ => Severity::Normal,
        }
    }
}

impl fmt::Display for TimeTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (value, unit) = match self {
            TimeTier::Hours(v) => (*v, "hour"),
            TimeTier::Minutes(v) => (*v, "minute"),
            TimeTier::Seconds(v) => (*v, "second"),
        };
        let plural = if value == 1 { "" } else { "s" };
        write!(f, "{} {}{}", value, unit, plural)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeOutcome {
    Inactive,
    Counting { tier: TimeTier, changed: bool },
    /// Fired on this evaluation. `announced` is false when the deadline was
    /// already a second or more in the past (discovered on load or rejoin).
    Expired { announced: bool },
    /// Fired earlier.
    Done,
}

#[derive(Debug)]
pub struct TimeCondition {
    deadline: Option<DateTime<Utc>>,
    state: ConditionState,
    shown: Option<TimeTier>,
}

impl TimeCondition {
    pub fn new(start_date: DateTime<Utc>, max_minutes: i64) -> Self {
        let deadline = (max_minutes > 0).then(|| start_date + Duration::minutes(max_minutes));
        Self {
            deadline,
            state: if deadline.is_some() {
                ConditionState::Counting
            } else {
                ConditionState::Inactive
            },
            shown: None,
        }
    }

    pub fn state(&self) -> ConditionState {
        self.state
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.deadline
    }

    /// Fractional seconds until the deadline; negative once it passed.
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> Option<f64> {
        self.deadline
            .map(|deadline| (deadline - now).num_milliseconds() as f64 / 1000.0)
    }

    pub fn evaluate(&mut self, now: DateTime<Utc>) -> TimeOutcome {
        match self.state {
            ConditionState::Inactive => TimeOutcome::Inactive,
            ConditionState::Fired => TimeOutcome::Done,
            ConditionState::Counting => {
                let Some(remaining) = self.remaining_seconds(now) else {
                    return TimeOutcome::Inactive;
                };
                if remaining > 0.0 {
                    let tier = TimeTier::from_remaining(remaining);
                    let changed = self.shown != Some(tier);
                    self.shown = Some(tier);
                    TimeOutcome::Counting { tier, changed }
                } else {
                    self.state = ConditionState::Fired;
                    TimeOutcome::Expired {
                        announced: remaining > -1.0,
                    }
                }
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Vote budget
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    Inactive,
    Counting {
        user_votes: i64,
        severity: Severity,
        changed: bool,
    },
    /// The budget was reached on this evaluation. Nothing more is displayed;
    /// the session itself ends through the next-movie request.
    Exhausted { user_votes: i64 },
    Done,
}

/// Per-user vote budget.
///
/// Votes known from the first snapshot plus distinct movies voted on through
/// this client, so re-voting a movie after a correction is not counted twice.
#[derive(Debug)]
pub struct VoteBudgetCondition {
    max: i64,
    known_at_join: Option<i64>,
    cast: HashSet<MovieKey>,
    state: ConditionState,
    shown: Option<i64>,
}

impl VoteBudgetCondition {
    pub fn new(max_votes: i64) -> Self {
        Self {
            max: max_votes,
            known_at_join: None,
            cast: HashSet::new(),
            state: if max_votes > 0 {
                ConditionState::Counting
            } else {
                ConditionState::Inactive
            },
            shown: None,
        }
    }

    pub fn state(&self) -> ConditionState {
        self.state
    }

    pub fn max(&self) -> i64 {
        self.max
    }

    /// Sets the votes already on record when this client joined, leaving out
    /// movies already counted through [`Self::note_cast`]. Only the first
    /// call counts.
    pub fn init_known<'a>(&mut self, on_record: impl IntoIterator<Item = &'a MovieKey>) {
        if self.known_at_join.is_some() {
            return;
        }
        let known = on_record
            .into_iter()
            .filter(|movie| !self.cast.contains(*movie))
            .count();
        self.known_at_join = Some(known as i64);
    }

    /// Counts a vote cast through this client without evaluating the budget.
    pub fn note_cast(&mut self, movie: MovieKey) {
        if self.state == ConditionState::Counting {
            self.cast.insert(movie);
        }
    }

    pub fn user_votes(&self) -> i64 {
        self.known_at_join.unwrap_or(0) + self.cast.len() as i64
    }

    pub fn record_vote(&mut self, movie: &MovieKey) -> VoteOutcome {
        self.note_cast(movie.clone());
        self.evaluate()
    }

    pub fn evaluate(&mut self) -> VoteOutcome {
        match self.state {
            ConditionState::Inactive => VoteOutcome::Inactive,
            ConditionState::Fired => VoteOutcome::Done,
            ConditionState::Counting => {
                let user_votes = self.user_votes();
                if user_votes >= self.max {
                    self.state = ConditionState::Fired;
                    return VoteOutcome::Exhausted { user_votes };
                }
                let changed = self.shown != Some(user_votes);
                self.shown = Some(user_votes);
                VoteOutcome::Counting {
                    user_votes,
                    severity: vote_severity(self.max - user_votes, self.max),
                    changed,
                }
            }
        }
    }
}

fn vote_severity(left: i64, max: i64) -> Severity {
    if left * 10 <= max {
        Severity::Critical
    } else if left * 5 <= max {
        Severity::Warning
    } else {
        Severity::Normal
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Match budget
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    Inactive,
    /// The display surface is gone; nothing was evaluated.
    Detached,
    Counting {
        match_count: usize,
        severity: Severity,
        changed: bool,
    },
    Reached,
    Done,
}

#[derive(Debug)]
pub struct MatchBudgetCondition {
    max: i64,
    state: ConditionState,
    shown: Option<usize>,
}

impl MatchBudgetCondition {
    pub fn new(max_matches: i64) -> Self {
        Self {
            max: max_matches,
            state: if max_matches > 0 {
                ConditionState::Counting
            } else {
                ConditionState::Inactive
            },
            shown: None,
        }
    }

    pub fn state(&self) -> ConditionState {
        self.state
    }

    pub fn max(&self) -> i64 {
        self.max
    }

    pub fn evaluate(&mut self, match_count: usize, surface_mounted: bool) -> MatchOutcome {
        match self.state {
            ConditionState::Inactive => MatchOutcome::Inactive,
            ConditionState::Fired => MatchOutcome::Done,
            ConditionState::Counting if !surface_mounted => MatchOutcome::Detached,
            ConditionState::Counting => {
                let left = self.max - match_count as i64;
                if left <= 0 {
                    self.state = ConditionState::Fired;
                    return MatchOutcome::Reached;
                }
                let changed = self.shown != Some(match_count);
                self.shown = Some(match_count);
                let severity = match left {
                    1 => Severity::Critical,
                    2 => Severity::Warning,
                    _ => Severity::Normal,
                };
                MatchOutcome::Counting {
                    match_count,
                    severity,
                    changed,
                }
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Evaluator
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConditionStates {
    pub time: ConditionState,
    pub votes: ConditionState,
    pub matches: ConditionState,
}

/// The three conditions of one session, built from its settings once.
#[derive(Debug)]
pub struct EndConditionEvaluator {
    pub time: TimeCondition,
    pub votes: VoteBudgetCondition,
    pub matches: MatchBudgetCondition,
}

impl EndConditionEvaluator {
    pub fn new(start_date: DateTime<Utc>, conditions: &EndConditions) -> Self {
        Self {
            time: TimeCondition::new(start_date, conditions.max_minutes),
            votes: VoteBudgetCondition::new(conditions.max_votes),
            matches: MatchBudgetCondition::new(conditions.max_matches),
        }
    }

    pub fn for_session(session: &Session) -> Self {
        Self::new(session.start_date, &session.end_conditions)
    }

    pub fn states(&self) -> ConditionStates {
        ConditionStates {
            time: self.time.state(),
            votes: self.votes.state(),
            matches: self.matches.state(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::test_utils::{key, t0};

    fn on_record(ids: &[&str]) -> Vec<MovieKey> {
        ids.iter().map(|id| key(id)).collect()
    }

    fn time_with_remaining_ms(remaining_ms: i64) -> (TimeCondition, DateTime<Utc>) {
        // Deadline is t0 + 1 minute; pick `now` so the requested amount is left.
        let condition = TimeCondition::new(t0(), 1);
        let now = t0() + Duration::minutes(1) - Duration::milliseconds(remaining_ms);
        (condition, now)
    }

    #[test]
    fn one_second_left_is_critical_seconds() {
        let (mut condition, now) = time_with_remaining_ms(1_000);
        match condition.evaluate(now) {
            TimeOutcome::Counting { tier, changed } => {
                assert_eq!(tier, TimeTier::Seconds(1));
                assert!(tier.severity().is_critical());
                assert!(changed);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn expired_a_second_ago_is_silent() {
        let (mut condition, now) = time_with_remaining_ms(-1_000);
        assert_eq!(
            condition.evaluate(now),
            TimeOutcome::Expired { announced: false }
        );
        assert_eq!(condition.state(), ConditionState::Fired);
    }

    #[test]
    fn expired_half_a_second_ago_is_announced() {
        let (mut condition, now) = time_with_remaining_ms(-500);
        assert_eq!(
            condition.evaluate(now),
            TimeOutcome::Expired { announced: true }
        );
    }

    #[test]
    fn time_fires_once() {
        let (mut condition, now) = time_with_remaining_ms(0);
        assert!(matches!(condition.evaluate(now), TimeOutcome::Expired { .. }));
        assert_eq!(condition.evaluate(now), TimeOutcome::Done);
    }

    #[test]
    fn unchanged_tier_is_not_flagged() {
        let mut condition = TimeCondition::new(t0(), 30);
        let first = condition.evaluate(t0());
        let second = condition.evaluate(t0() + Duration::seconds(1));
        assert_eq!(
            first,
            TimeOutcome::Counting {
                tier: TimeTier::Minutes(30),
                changed: true
            }
        );
        assert_eq!(
            second,
            TimeOutcome::Counting {
                tier: TimeTier::Minutes(30),
                changed: false
            }
        );
    }

    #[test]
    fn tiers_and_severities() {
        assert_eq!(TimeTier::from_remaining(7_200.5), TimeTier::Hours(2));
        assert_eq!(TimeTier::from_remaining(3_600.0), TimeTier::Minutes(60));
        assert_eq!(TimeTier::from_remaining(90.0), TimeTier::Minutes(2));
        assert_eq!(TimeTier::from_remaining(60.0), TimeTier::Seconds(60));
        assert_eq!(TimeTier::from_remaining(59.2), TimeTier::Seconds(59));
        assert_eq!(TimeTier::from_remaining(10.5), TimeTier::Seconds(10));
        assert_eq!(TimeTier::from_remaining(10.5).severity(), Severity::Critical);
        assert_eq!(TimeTier::from_remaining(0.3), TimeTier::Seconds(1));
        assert_eq!(TimeTier::Seconds(25).severity(), Severity::Warning);
        assert_eq!(TimeTier::Seconds(31).severity(), Severity::Normal);
        assert_eq!(TimeTier::Minutes(1).severity(), Severity::Normal);
        assert_eq!(TimeTier::Minutes(1).to_string(), "1 minute");
        assert_eq!(TimeTier::Hours(3).to_string(), "3 hours");
    }

    #[test]
    fn disabled_conditions_stay_inactive() {
        let mut evaluator = EndConditionEvaluator::new(t0(), &EndConditions::default());
        assert_eq!(evaluator.time.evaluate(t0()), TimeOutcome::Inactive);
        assert_eq!(evaluator.votes.record_vote(&key("1")), VoteOutcome::Inactive);
        assert_eq!(evaluator.matches.evaluate(10, true), MatchOutcome::Inactive);
        assert_eq!(
            evaluator.states(),
            ConditionStates {
                time: ConditionState::Inactive,
                votes: ConditionState::Inactive,
                matches: ConditionState::Inactive,
            }
        );
    }

    #[test]
    fn re_voting_a_movie_counts_once() {
        let mut votes = VoteBudgetCondition::new(10);
        votes.init_known(&on_record(&["x", "y", "z"]));
        votes.record_vote(&key("a"));
        votes.record_vote(&key("a"));
        assert_eq!(votes.user_votes(), 4);
    }

    #[test]
    fn known_votes_are_set_once() {
        let mut votes = VoteBudgetCondition::new(10);
        votes.init_known(&on_record(&["x", "y", "z"]));
        votes.init_known(&on_record(&["p", "q", "r", "s", "t", "u", "v"]));
        assert_eq!(votes.user_votes(), 3);
    }

    #[test]
    fn votes_cast_before_join_are_not_counted_twice() {
        let mut votes = VoteBudgetCondition::new(10);
        votes.note_cast(key("a"));
        votes.note_cast(key("b"));
        // The first snapshot already holds "a" but was fetched before "b".
        votes.init_known(&on_record(&["old", "a"]));
        assert_eq!(votes.user_votes(), 3);
    }

    #[test]
    fn vote_budget_severity_and_exhaustion() {
        let mut votes = VoteBudgetCondition::new(10);
        votes.init_known(&on_record(&["p", "q", "r", "s", "t", "u", "v"]));
        assert!(matches!(
            votes.evaluate(),
            VoteOutcome::Counting {
                user_votes: 7,
                severity: Severity::Normal,
                ..
            }
        ));
        assert!(matches!(
            votes.record_vote(&key("a")),
            VoteOutcome::Counting {
                severity: Severity::Warning,
                ..
            }
        ));
        assert!(matches!(
            votes.record_vote(&key("b")),
            VoteOutcome::Counting {
                severity: Severity::Critical,
                ..
            }
        ));
        assert_eq!(
            votes.record_vote(&key("c")),
            VoteOutcome::Exhausted { user_votes: 10 }
        );
        assert_eq!(votes.record_vote(&key("d")), VoteOutcome::Done);
        assert_eq!(votes.user_votes(), 10);
    }

    #[test]
    fn match_budget_fires_once() {
        let mut matches = MatchBudgetCondition::new(2);
        assert!(matches!(
            matches.evaluate(1, true),
            MatchOutcome::Counting {
                severity: Severity::Critical,
                ..
            }
        ));
        assert_eq!(matches.evaluate(2, true), MatchOutcome::Reached);
        assert_eq!(matches.evaluate(3, true), MatchOutcome::Done);
    }

    #[test]
    fn match_budget_ignored_without_surface() {
        let mut matches = MatchBudgetCondition::new(1);
        assert_eq!(matches.evaluate(1, false), MatchOutcome::Detached);
        assert_eq!(matches.state(), ConditionState::Counting);
    }

    #[test]
    fn end_cause_reasons() {
        assert_eq!(EndCause::Time.reason(), "Times up!");
        assert_eq!(EndCause::Matches.reason(), "Max matches reached!");
        assert_eq!(EndCause::server("No more movies left!").reason(), "No more movies left!");
    }
}
