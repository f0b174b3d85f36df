//! KinderEngine - one participant's view of one voting session.
//!
//! The engine wires the pieces together in a fixed order per refresh:
//! snapshot → ranking → match detection → end conditions. It is:
//! - **Synchronous**: the host drives it with `tick(now)` and user actions
//! - **Single-owner**: ledger and condition state belong to this instance only
//! - **Forgiving**: transport failures are reported and the next poll retries
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use kinder_core::{EngineConfig, KinderEngine};
//!
//! let (tx, rx) = std::sync::mpsc::channel();
//! let mut engine = KinderEngine::new(EngineConfig::default(), 7, ParticipantId(3),
//!     Box::new(source), Box::new(tx));
//! engine.start(Utc::now())?;
//! loop {
//!     engine.tick(Utc::now());
//!     for notification in rx.try_iter() { render(notification); }
//! }
//! ```

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use kinder_protocol::{MovieKey, Participant, ParticipantId, SessionStatusSnapshot, VoteDirection};
use tracing::{debug, info, trace, warn};

use crate::config::EngineConfig;
use crate::cursor::{CursorState, ShowOutcome, VotingCursor};
use crate::end_condition::{
    ConditionStates, EndCause, EndConditionEvaluator, MatchOutcome, TimeOutcome, VoteOutcome,
};
use crate::error::{KinderError, Result, SourceError};
use crate::matches::{MatchDetector, MatchLedger, MatchTransition};
use crate::movies::MovieCache;
use crate::notify::{Notification, NotificationSink};
use crate::ranking::{rank_top_flop, Capacities, TopFlopBoard};
use crate::roster::Roster;
use crate::source::SnapshotSource;
use crate::surface::{Surface, Surfaces};
use crate::timer::{Scheduler, TimerHandle, TimerKind};

/// Proof that a refresh is in flight. Hand it back to
/// [`KinderEngine::complete_refresh`] with the fetched snapshot, or to
/// [`KinderEngine::cancel_refresh`] if the fetch is abandoned. Dropping it
/// otherwise leaves the refresh slot claimed and polling stalls.
#[derive(Debug)]
#[must_use]
pub struct RefreshTicket {
    _private: (),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Another refresh was in flight; this request was dropped.
    Skipped,
    Applied,
    /// A transport failure aborted the refresh. The next poll retries.
    Aborted,
}

pub struct KinderEngine {
    config: EngineConfig,
    session_id: u64,
    participant: ParticipantId,
    source: Box<dyn SnapshotSource>,
    sink: Box<dyn NotificationSink>,
    surfaces: Surfaces,
    scheduler: Scheduler,
    movies: MovieCache,
    board: TopFlopBoard,
    detector: MatchDetector,
    conditions: Option<EndConditionEvaluator>,
    /// Decisions made before the first snapshot was applied.
    cast_before_join: HashSet<MovieKey>,
    cursor: VotingCursor,
    roster: Roster,
    last_snapshot: Option<SessionStatusSnapshot>,
    refresh_in_flight: bool,
    poll_timer: Option<TimerHandle>,
    countdown_timer: Option<TimerHandle>,
    over: Option<EndCause>,
    started: bool,
    stopped: bool,
}

impl KinderEngine {
    pub fn new(
        config: EngineConfig,
        session_id: u64,
        participant: ParticipantId,
        source: Box<dyn SnapshotSource>,
        sink: Box<dyn NotificationSink>,
    ) -> Self {
        let cursor = VotingCursor::new(session_id, participant, config.reminder);
        Self {
            config,
            session_id,
            participant,
            source,
            sink,
            surfaces: Surfaces::all_mounted(),
            scheduler: Scheduler::new(),
            movies: MovieCache::new(),
            board: TopFlopBoard::new(),
            detector: MatchDetector::new(),
            conditions: None,
            cast_before_join: HashSet::new(),
            cursor,
            roster: Roster::new(),
            last_snapshot: None,
            refresh_in_flight: false,
            poll_timer: None,
            countdown_timer: None,
            over: None,
            started: false,
            stopped: false,
        }
    }

    /// Starts with only the given surfaces mounted.
    pub fn with_surfaces(mut self, surfaces: Surfaces) -> Self {
        self.surfaces = surfaces;
        self
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Lifecycle
    // ═══════════════════════════════════════════════════════════════════════

    /// First refresh, poll schedule, and the first movie.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.started || self.stopped {
            return Ok(());
        }
        self.started = true;
        info!(session = self.session_id, participant = %self.participant, "Engine started");

        self.refresh(now);
        self.schedule_poll(now);

        if self.surfaces.is_mounted(Surface::VotingArea)
            && self.cursor.state() != CursorState::Ended
        {
            self.show_next(now)?;
        }
        Ok(())
    }

    /// Fires every timer due at `now`, earliest first.
    pub fn tick(&mut self, now: DateTime<Utc>) {
        if self.stopped {
            return;
        }
        for fired in self.scheduler.take_due(now) {
            if self.poll_timer.as_ref().is_some_and(|h| h.matches(&fired)) {
                self.poll_timer = None;
                self.refresh(now);
                self.schedule_poll(now);
            } else if self
                .countdown_timer
                .as_ref()
                .is_some_and(|h| h.matches(&fired))
            {
                self.countdown_timer = None;
                self.run_countdown(now);
            } else {
                let mut out = Vec::new();
                if !self
                    .cursor
                    .on_timer(&fired, &mut self.scheduler, now, &mut out)
                {
                    trace!(kind = ?fired.kind, "Ignoring timer with no owner");
                }
                self.flush(out);
            }
        }
    }

    /// Earliest pending timer, so the host knows when to call `tick` next.
    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.scheduler.next_due()
    }

    /// Removes a presentation surface. Timers that only served it stop.
    pub fn tear_down(&mut self, surface: Surface) {
        if !self.surfaces.tear_down(surface) {
            return;
        }
        debug!(?surface, "Surface torn down");
        match surface {
            Surface::TimeBadge => self.cancel_countdown(),
            Surface::VotingArea => {
                let mut out = Vec::new();
                self.cursor.end(None, &mut self.scheduler, &mut out);
                self.flush(out);
            }
            Surface::TopFlopPanel | Surface::VoteBadge | Surface::MatchBadge => {}
        }
    }

    /// Stops everything. Later ticks and refreshes do nothing.
    pub fn shutdown(&mut self) {
        if self.stopped {
            return;
        }
        let mut out = Vec::new();
        self.cursor.end(None, &mut self.scheduler, &mut out);
        self.flush(out);
        self.scheduler.cancel_all();
        self.poll_timer = None;
        self.countdown_timer = None;
        self.stopped = true;
        info!(session = self.session_id, "Engine stopped");
    }

    fn schedule_poll(&mut self, now: DateTime<Utc>) {
        if self.stopped || self.poll_timer.is_some() {
            return;
        }
        let at = now + self.config.poll_interval();
        self.poll_timer = Some(self.scheduler.schedule(at, TimerKind::Poll));
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Refresh
    // ═══════════════════════════════════════════════════════════════════════

    /// Claims the refresh slot. `None` if a refresh is already in flight.
    pub fn begin_refresh(&mut self) -> Option<RefreshTicket> {
        if self.refresh_in_flight || self.stopped {
            debug!("Refresh already in flight; dropping request");
            return None;
        }
        self.refresh_in_flight = true;
        Some(RefreshTicket { _private: () })
    }

    /// Applies a snapshot fetched under `ticket`.
    pub fn complete_refresh(
        &mut self,
        ticket: RefreshTicket,
        fetched: std::result::Result<SessionStatusSnapshot, SourceError>,
        now: DateTime<Utc>,
    ) -> RefreshOutcome {
        let RefreshTicket { .. } = ticket;
        self.refresh_in_flight = false;

        match fetched.and_then(|snapshot| self.apply_snapshot(snapshot, now)) {
            Ok(()) => RefreshOutcome::Applied,
            Err(err) => {
                self.report_source_error("session refresh", &err);
                RefreshOutcome::Aborted
            }
        }
    }

    /// Releases the refresh slot without applying anything.
    pub fn cancel_refresh(&mut self, ticket: RefreshTicket) {
        let RefreshTicket { .. } = ticket;
        self.refresh_in_flight = false;
        debug!("Refresh cancelled");
    }

    /// Fetches and applies a snapshot in one step.
    pub fn refresh(&mut self, now: DateTime<Utc>) -> RefreshOutcome {
        let Some(ticket) = self.begin_refresh() else {
            return RefreshOutcome::Skipped;
        };
        let fetched = self.source.session_status(self.session_id);
        self.complete_refresh(ticket, fetched, now)
    }

    fn apply_snapshot(
        &mut self,
        snapshot: SessionStatusSnapshot,
        now: DateTime<Utc>,
    ) -> std::result::Result<(), SourceError> {
        if self.conditions.is_none() {
            let mut conditions = EndConditionEvaluator::for_session(&snapshot.session);
            for movie in self.cast_before_join.drain() {
                conditions.votes.note_cast(movie);
            }
            conditions
                .votes
                .init_known(snapshot.voted_by(self.participant));
            self.conditions = Some(conditions);
            self.run_countdown(now);
        }

        let capacities = Capacities::new(self.config.top_count, self.config.flop_count);
        let movies = &mut self.movies;
        let source = self.source.as_ref();
        let ranking = rank_top_flop(&snapshot, capacities, |key| movies.resolve(source, key))?;

        let update = self.board.apply(ranking);
        if !update.is_empty() {
            self.emit(Notification::PanelUpdated {
                top: update.top,
                flop: update.flop,
                participants: snapshot.participant_count(),
                attention: update.attention,
            });
        }

        let report = self
            .detector
            .detect(self.board.selected(), &snapshot.user_ids, self.participant);
        if let Some(report) = report {
            for transition in report.transitions {
                self.emit(match transition {
                    MatchTransition::NewMatch { movie, pro_count } => {
                        Notification::NewMatch { movie, pro_count }
                    }
                    MatchTransition::Recalled { movie } => Notification::MatchRecalled { movie },
                });
            }
            self.evaluate_matches(report.match_count);
        }

        self.evaluate_votes();
        self.last_snapshot = Some(snapshot);
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // End conditions
    // ═══════════════════════════════════════════════════════════════════════

    fn run_countdown(&mut self, now: DateTime<Utc>) {
        self.cancel_countdown();
        if !self.surfaces.is_mounted(Surface::TimeBadge) {
            return;
        }
        let Some(conditions) = self.conditions.as_mut() else {
            return;
        };

        match conditions.time.evaluate(now) {
            TimeOutcome::Inactive | TimeOutcome::Done => {}
            TimeOutcome::Counting { tier, changed } => {
                if changed {
                    self.emit(Notification::TimeRemainingUpdated {
                        tier,
                        severity: tier.severity(),
                    });
                }
                let at = now + self.config.countdown_interval();
                self.countdown_timer = Some(self.scheduler.schedule(at, TimerKind::Countdown));
            }
            TimeOutcome::Expired { announced } => self.conclude(EndCause::Time, announced),
        }
    }

    fn cancel_countdown(&mut self) {
        if let Some(handle) = self.countdown_timer.take() {
            self.scheduler.cancel(handle);
        }
    }

    fn evaluate_matches(&mut self, match_count: usize) {
        let mounted = self.surfaces.is_mounted(Surface::MatchBadge);
        let Some(conditions) = self.conditions.as_mut() else {
            return;
        };
        let max = conditions.matches.max();

        match conditions.matches.evaluate(match_count, mounted) {
            MatchOutcome::Counting {
                match_count,
                severity,
                changed: true,
            } => self.emit(Notification::MatchCountUpdated {
                match_count,
                max,
                severity,
            }),
            MatchOutcome::Reached => {
                info!(match_count, max, "Match budget reached");
                self.conclude(EndCause::Matches, true);
            }
            MatchOutcome::Detached => trace!("Match badge gone; skipping match budget"),
            _ => {}
        }
    }

    fn evaluate_votes(&mut self) {
        let Some(conditions) = self.conditions.as_mut() else {
            return;
        };
        let outcome = conditions.votes.evaluate();
        let max = conditions.votes.max();
        self.emit_vote_outcome(outcome, max);
    }

    fn emit_vote_outcome(&mut self, outcome: VoteOutcome, max: i64) {
        match outcome {
            VoteOutcome::Counting {
                user_votes,
                severity,
                changed: true,
            } => self.emit(Notification::VoteCountUpdated {
                user_votes,
                max,
                severity,
            }),
            VoteOutcome::Exhausted { user_votes } => {
                info!(user_votes, max, "Vote budget reached; display stops");
            }
            _ => {}
        }
    }

    /// Ends the session. The first cause wins; later ones are ignored.
    fn conclude(&mut self, cause: EndCause, announced: bool) {
        if let Some(existing) = &self.over {
            debug!(existing = existing.reason(), ignored = cause.reason(), "Session already over");
            return;
        }
        info!(reason = cause.reason(), announced, "Session over");
        self.over = Some(cause.clone());
        self.cancel_countdown();
        self.surfaces.tear_down_end_condition_badges();

        let mut out = Vec::new();
        self.cursor
            .end(Some(cause.reason().to_string()), &mut self.scheduler, &mut out);
        self.flush(out);
        self.emit(Notification::SessionOver { cause, announced });
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Voting
    // ═══════════════════════════════════════════════════════════════════════

    /// Requests and presents the next movie.
    pub fn show_next(&mut self, now: DateTime<Utc>) -> Result<()> {
        let mut out = Vec::new();
        let result = self
            .cursor
            .show(self.source.as_ref(), &mut self.scheduler, now, &mut out);
        self.flush(out);

        match result {
            Ok(ShowOutcome::Presented(_)) => Ok(()),
            Ok(ShowOutcome::Over(reason)) => {
                self.conclude(EndCause::server(reason), true);
                Ok(())
            }
            Err(err) => {
                self.report_error("next movie", &err);
                Err(err)
            }
        }
    }

    /// Records a decision on the presented movie, submits it and moves on.
    pub fn decide(&mut self, direction: VoteDirection, now: DateTime<Utc>) -> Result<()> {
        let movie = self.cursor.decision_target()?.clone();

        match self.conditions.as_mut() {
            Some(conditions) => {
                let outcome = conditions.votes.record_vote(&movie);
                let max = conditions.votes.max();
                self.emit_vote_outcome(outcome, max);
            }
            None => {
                debug!(movie = %movie, "Vote before first snapshot");
                self.cast_before_join.insert(movie);
            }
        }

        let mut out = Vec::new();
        let result = self
            .cursor
            .decide(direction, self.source.as_ref(), &mut self.scheduler, &mut out);
        self.flush(out);

        if let Err(err) = result {
            self.report_error("submit vote", &err);
            return Err(err);
        }
        self.show_next(now)
    }

    /// Re-presents the movie voted on last.
    pub fn correct(&mut self, now: DateTime<Utc>) -> Result<()> {
        let mut out = Vec::new();
        let result = self.cursor.correct(
            &mut self.movies,
            self.source.as_ref(),
            &mut self.scheduler,
            now,
            &mut out,
        );
        self.flush(out);

        match result {
            Ok(movie) => {
                debug!(movie = %movie, "Correction presented");
                Ok(())
            }
            Err(err) => {
                self.report_error("correction", &err);
                Err(err)
            }
        }
    }

    pub fn dismiss_correction(&mut self) {
        let mut out = Vec::new();
        self.cursor.dismiss_correction(&mut out);
        self.flush(out);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Participants
    // ═══════════════════════════════════════════════════════════════════════

    /// Participants of the last applied snapshot, creator included.
    pub fn participants(&mut self) -> Result<Vec<Participant>> {
        let Some(snapshot) = self.last_snapshot.as_ref() else {
            return Ok(Vec::new());
        };
        Ok(self.roster.members(self.source.as_ref(), snapshot)?)
    }

    pub fn is_rejoin(&mut self, name: &str) -> Result<bool> {
        let Some(snapshot) = self.last_snapshot.as_ref() else {
            return Ok(false);
        };
        Ok(self.roster.is_rejoin(self.source.as_ref(), snapshot, name)?)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════════

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_over(&self) -> bool {
        self.over.is_some()
    }

    pub fn end_cause(&self) -> Option<&EndCause> {
        self.over.as_ref()
    }

    pub fn board(&self) -> &TopFlopBoard {
        &self.board
    }

    pub fn ledger(&self) -> &MatchLedger {
        self.detector.ledger()
    }

    pub fn condition_states(&self) -> Option<ConditionStates> {
        self.conditions.as_ref().map(EndConditionEvaluator::states)
    }

    pub fn cursor(&self) -> &VotingCursor {
        &self.cursor
    }

    pub fn cursor_state(&self) -> CursorState {
        self.cursor.state()
    }

    pub fn surfaces(&self) -> &Surfaces {
        &self.surfaces
    }

    pub fn pending_timers(&self) -> usize {
        self.scheduler.pending()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Delivery
    // ═══════════════════════════════════════════════════════════════════════

    fn emit(&mut self, notification: Notification) {
        if let Some(surface) = notification.surface() {
            if !self.surfaces.is_mounted(surface) {
                trace!(?surface, category = notification.category(), "Surface gone; dropping update");
                return;
            }
        }
        self.sink.emit(notification);
    }

    fn flush(&mut self, notifications: Vec<Notification>) {
        for notification in notifications {
            self.emit(notification);
        }
    }

    fn report_error(&mut self, context: &str, err: &KinderError) {
        if let KinderError::Source(source_err) = err {
            self.report_source_error(context, source_err);
        }
    }

    fn report_source_error(&mut self, context: &str, err: &SourceError) {
        warn!(context, error = %err, "Source request failed");
        self.emit(Notification::Error {
            context: context.to_string(),
            message: err.to_string(),
        });
    }
}
