//! Notifications produced for the presentation collaborator.
//!
//! The engine owns its sink; nothing is broadcast through global state.
//! Every notification carries a category key the presenter can use to
//! coalesce toasts (a later `kinder.over` replaces an earlier one).

use std::sync::mpsc;

use kinder_protocol::{MovieDetail, MovieKey};
use serde::Serialize;

use crate::cursor::FlashPhase;
use crate::end_condition::{EndCause, Severity, TimeTier};
use crate::ranking::PanelOp;
use crate::surface::Surface;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    /// Positional changes to the top/flop panel. Positions not mentioned
    /// stay untouched.
    PanelUpdated {
        top: Vec<PanelOp>,
        flop: Vec<PanelOp>,
        participants: usize,
        attention: bool,
    },
    NewMatch {
        movie: MovieKey,
        pro_count: usize,
    },
    MatchRecalled {
        movie: MovieKey,
    },
    MatchCountUpdated {
        match_count: usize,
        max: i64,
        severity: Severity,
    },
    VoteCountUpdated {
        user_votes: i64,
        max: i64,
        severity: Severity,
    },
    TimeRemainingUpdated {
        tier: TimeTier,
        severity: Severity,
    },
    SessionOver {
        cause: EndCause,
        /// False when the session was already over before this client
        /// noticed (late rejoin), so no toast should be shown.
        announced: bool,
    },
    AwaitingMovie,
    MoviePresented {
        movie: MovieDetail,
        correction: bool,
    },
    CorrectionOffered {
        movie: MovieKey,
    },
    CorrectionWithdrawn,
    ReminderFlash {
        phase: FlashPhase,
    },
    VotingClosed,
    Error {
        context: String,
        message: String,
    },
}

impl Notification {
    pub fn category(&self) -> &'static str {
        match self {
            Notification::PanelUpdated { .. } => "kinder.panel",
            Notification::NewMatch { .. } | Notification::MatchRecalled { .. } => "kinder.match",
            Notification::MatchCountUpdated { .. } => "kinder.condition.matches",
            Notification::VoteCountUpdated { .. } => "kinder.condition.votes",
            Notification::TimeRemainingUpdated { .. } => "kinder.condition.time",
            Notification::SessionOver { .. } => "kinder.over",
            Notification::AwaitingMovie
            | Notification::MoviePresented { .. }
            | Notification::CorrectionOffered { .. }
            | Notification::CorrectionWithdrawn
            | Notification::ReminderFlash { .. }
            | Notification::VotingClosed => "kinder.voting",
            Notification::Error { .. } => "kinder.error",
        }
    }

    /// The surface this notification renders into. Toasts have none and are
    /// always delivered.
    pub fn surface(&self) -> Option<Surface> {
        match self {
            Notification::PanelUpdated { .. } => Some(Surface::TopFlopPanel),
            Notification::MatchCountUpdated { .. } => Some(Surface::MatchBadge),
            Notification::VoteCountUpdated { .. } => Some(Surface::VoteBadge),
            Notification::TimeRemainingUpdated { .. } => Some(Surface::TimeBadge),
            Notification::AwaitingMovie
            | Notification::MoviePresented { .. }
            | Notification::CorrectionOffered { .. }
            | Notification::CorrectionWithdrawn
            | Notification::ReminderFlash { .. }
            | Notification::VotingClosed => Some(Surface::VotingArea),
            Notification::NewMatch { .. }
            | Notification::MatchRecalled { .. }
            | Notification::SessionOver { .. }
            | Notification::Error { .. } => None,
        }
    }
}

/// Receiver side of engine notifications.
pub trait NotificationSink {
    fn emit(&mut self, notification: Notification);
}

impl NotificationSink for Vec<Notification> {
    fn emit(&mut self, notification: Notification) {
        self.push(notification);
    }
}

impl NotificationSink for mpsc::Sender<Notification> {
    fn emit(&mut self, notification: Notification) {
        // A dropped receiver means the presenter is gone; nothing to update.
        let _ = self.send(notification);
    }
}

/// Adapts a closure into a sink.
pub struct CallbackSink<F>(pub F);

impl<F: FnMut(Notification)> NotificationSink for CallbackSink<F> {
    fn emit(&mut self, notification: Notification) {
        (self.0)(notification);
    }
}
