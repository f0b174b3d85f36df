//! Sequential fetch, present, decide, submit loop for one participant.
//!
//! ```text
//! Idle ──show──▶ AwaitingMovie ──movie──▶ AwaitingDecision ──decide──▶ Submitting ──▶ Idle
//!                      │                        ▲                                       │
//!                      │ over                   └──────── Correcting ◀──correct─────────┘
//!                      ▼
//!                    Ended
//! ```
//!
//! A presented movie waits for a decision indefinitely. While it waits, an
//! adaptive reminder flashes the decision affordances: it nudges sooner for a
//! participant who keeps letting it fire and later for one who decides fast.

use chrono::{DateTime, Duration, Utc};
use kinder_protocol::{MovieDetail, MovieKey, NextMovie, ParticipantId, VoteDirection, VoteRequest};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::ReminderConfig;
use crate::error::{KinderError, Result};
use crate::movies::MovieCache;
use crate::notify::Notification;
use crate::source::SnapshotSource;
use crate::timer::{FiredTimer, Scheduler, TimerHandle, TimerKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorState {
    Idle,
    AwaitingMovie,
    AwaitingDecision,
    Submitting,
    Correcting,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlashPhase {
    First,
    Second,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShowOutcome {
    Presented(MovieKey),
    /// The source reports the session is over for this participant.
    Over(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Reminder
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct Reminder {
    config: ReminderConfig,
    delay_ms: i64,
    timer: Option<TimerHandle>,
    flash: Option<TimerHandle>,
    fired_since_presentation: bool,
}

impl Reminder {
    fn new(config: ReminderConfig) -> Self {
        Self {
            config,
            delay_ms: config.min_ms,
            timer: None,
            flash: None,
            fired_since_presentation: false,
        }
    }

    fn ceiling(&self) -> i64 {
        self.config.max_ms.max(self.config.min_ms)
    }

    fn arm(&mut self, scheduler: &mut Scheduler, now: DateTime<Utc>) {
        self.disarm(scheduler);
        self.fired_since_presentation = false;
        self.schedule(scheduler, now);
    }

    fn schedule(&mut self, scheduler: &mut Scheduler, now: DateTime<Utc>) {
        if !self.config.is_enabled() {
            return;
        }
        let at = now + Duration::milliseconds(self.delay_ms.max(1));
        self.timer = Some(scheduler.schedule(at, TimerKind::Reminder));
    }

    fn disarm(&mut self, scheduler: &mut Scheduler) {
        if let Some(handle) = self.timer.take() {
            scheduler.cancel(handle);
        }
        if let Some(handle) = self.flash.take() {
            scheduler.cancel(handle);
        }
    }

    fn on_decision(&mut self, scheduler: &mut Scheduler) {
        if !self.fired_since_presentation {
            self.delay_ms = (self.delay_ms + self.config.offset_ms).min(self.ceiling());
        }
        self.disarm(scheduler);
    }

    fn on_timer(
        &mut self,
        fired: &FiredTimer,
        scheduler: &mut Scheduler,
        now: DateTime<Utc>,
        out: &mut Vec<Notification>,
    ) -> bool {
        if self.timer.as_ref().is_some_and(|h| h.matches(fired)) {
            self.timer = None;
            self.fired_since_presentation = true;
            self.delay_ms = (self.delay_ms - self.config.offset_ms).max(self.config.min_ms);
            out.push(Notification::ReminderFlash {
                phase: FlashPhase::First,
            });
            let at = now + Duration::milliseconds(self.config.flash_ms.max(1));
            self.flash = Some(scheduler.schedule(at, TimerKind::ReminderFlash));
            return true;
        }
        if self.flash.as_ref().is_some_and(|h| h.matches(fired)) {
            self.flash = None;
            out.push(Notification::ReminderFlash {
                phase: FlashPhase::Second,
            });
            self.schedule(scheduler, now);
            return true;
        }
        false
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Cursor
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct VotingCursor {
    session_id: u64,
    participant: ParticipantId,
    state: CursorState,
    current: Option<MovieDetail>,
    last_voted: Option<MovieKey>,
    ended_reason: Option<String>,
    reminder: Reminder,
}

impl VotingCursor {
    pub fn new(session_id: u64, participant: ParticipantId, reminder: ReminderConfig) -> Self {
        Self {
            session_id,
            participant,
            state: CursorState::Idle,
            current: None,
            last_voted: None,
            ended_reason: None,
            reminder: Reminder::new(reminder),
        }
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    pub fn current(&self) -> Option<&MovieDetail> {
        self.current.as_ref()
    }

    /// The movie a correction would re-present, if one is on offer.
    pub fn correctable(&self) -> Option<&MovieKey> {
        self.last_voted.as_ref()
    }

    pub fn reminder_delay_ms(&self) -> i64 {
        self.reminder.delay_ms
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state == CursorState::Ended {
            return Err(KinderError::CursorEnded {
                reason: self.ended_reason.clone().unwrap_or_default(),
            });
        }
        Ok(())
    }

    /// Requests the next candidate and presents it.
    pub fn show(
        &mut self,
        source: &dyn SnapshotSource,
        scheduler: &mut Scheduler,
        now: DateTime<Utc>,
        out: &mut Vec<Notification>,
    ) -> Result<ShowOutcome> {
        self.ensure_open()?;
        self.reminder.disarm(scheduler);
        let previous = self.state;
        self.state = CursorState::AwaitingMovie;
        out.push(Notification::AwaitingMovie);

        let next = match source.next_movie(self.session_id, self.participant) {
            Ok(next) => next,
            Err(err) => {
                self.state = previous;
                if previous == CursorState::AwaitingDecision {
                    self.reminder.arm(scheduler, now);
                }
                return Err(err.into());
            }
        };

        match next {
            NextMovie::Over { over } => {
                info!(reason = %over, "No further movies for participant");
                self.end(Some(over.clone()), scheduler, out);
                Ok(ShowOutcome::Over(over))
            }
            NextMovie::Movie(detail) => {
                let key = detail.movie.clone();
                self.present(detail, false, scheduler, now, out);
                Ok(ShowOutcome::Presented(key))
            }
        }
    }

    fn present(
        &mut self,
        detail: MovieDetail,
        correction: bool,
        scheduler: &mut Scheduler,
        now: DateTime<Utc>,
        out: &mut Vec<Notification>,
    ) {
        debug!(movie = %detail.movie, correction, "Presenting movie");
        self.current = Some(detail.clone());
        self.state = CursorState::AwaitingDecision;
        out.push(Notification::MoviePresented {
            movie: detail,
            correction,
        });
        self.reminder.arm(scheduler, now);
    }

    /// The movie a decision would apply to right now.
    pub fn decision_target(&self) -> Result<&MovieKey> {
        self.ensure_open()?;
        match (&self.state, &self.current) {
            (CursorState::AwaitingDecision, Some(detail)) => Ok(&detail.movie),
            _ => Err(KinderError::NoMoviePresented),
        }
    }

    /// Submits a decision on the presented movie and offers a correction.
    ///
    /// On a failed submission the movie stays presented so the participant
    /// can try again.
    pub fn decide(
        &mut self,
        direction: VoteDirection,
        source: &dyn SnapshotSource,
        scheduler: &mut Scheduler,
        out: &mut Vec<Notification>,
    ) -> Result<MovieKey> {
        let movie = self.decision_target()?.clone();
        self.state = CursorState::Submitting;

        let request = VoteRequest {
            session_id: self.session_id,
            user_id: self.participant,
            movie_id: movie.clone(),
            vote: direction,
        };
        if let Err(err) = source.submit_vote(&request) {
            self.state = CursorState::AwaitingDecision;
            return Err(err.into());
        }
        debug!(movie = %movie, vote = direction.as_str(), "Vote submitted");

        self.reminder.on_decision(scheduler);
        self.current = None;
        self.last_voted = Some(movie.clone());
        self.state = CursorState::Idle;
        out.push(Notification::CorrectionOffered {
            movie: movie.clone(),
        });
        Ok(movie)
    }

    /// Re-presents the movie voted on last, fetched fresh. The fresh details
    /// replace the cached ones so the panels pick them up too.
    ///
    /// Neither the vote count nor the previous submission is touched; voting
    /// again is an ordinary decision.
    pub fn correct(
        &mut self,
        movies: &mut MovieCache,
        source: &dyn SnapshotSource,
        scheduler: &mut Scheduler,
        now: DateTime<Utc>,
        out: &mut Vec<Notification>,
    ) -> Result<MovieKey> {
        self.ensure_open()?;
        let Some(movie) = self.last_voted.clone() else {
            return Err(KinderError::NothingToCorrect);
        };

        let previous = self.state;
        self.state = CursorState::Correcting;
        let detail = match movies.refetch(source, &movie) {
            Ok(detail) => detail,
            Err(err) => {
                self.state = previous;
                return Err(err.into());
            }
        };

        self.last_voted = None;
        self.reminder.disarm(scheduler);
        self.present(detail, true, scheduler, now, out);
        Ok(movie)
    }

    pub fn dismiss_correction(&mut self, out: &mut Vec<Notification>) {
        if self.last_voted.take().is_some() {
            out.push(Notification::CorrectionWithdrawn);
        }
    }

    /// Handles a reminder timer. Returns false if the timer is not ours.
    pub fn on_timer(
        &mut self,
        fired: &FiredTimer,
        scheduler: &mut Scheduler,
        now: DateTime<Utc>,
        out: &mut Vec<Notification>,
    ) -> bool {
        if self.state == CursorState::Ended {
            return false;
        }
        self.reminder.on_timer(fired, scheduler, now, out)
    }

    /// Stops the cursor for good. Returns false if it had already ended.
    pub fn end(
        &mut self,
        reason: Option<String>,
        scheduler: &mut Scheduler,
        out: &mut Vec<Notification>,
    ) -> bool {
        if self.state == CursorState::Ended {
            return false;
        }
        self.reminder.disarm(scheduler);
        self.current = None;
        self.last_voted = None;
        self.ended_reason = reason;
        self.state = CursorState::Ended;
        out.push(Notification::VotingClosed);
        true
    }
}
