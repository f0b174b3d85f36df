//! # kinder-core
//!
//! Client-resident engine for group "swipe to vote on a movie" sessions.
//! It turns a repeatedly polled session snapshot into ranked top/flop
//! lists, perfect-match announcements, end-of-session decisions, and a
//! sequential voting cursor.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime dependency. Hosts drive time through
//!   `tick(now)` and may split a refresh into `begin_refresh` / `complete_refresh`
//!   around their own awaited fetch.
//! - **Not thread-safe**: One engine per participant per session, owned by one thread.
//! - **Injected collaborators**: Data comes from a [`SnapshotSource`]; updates leave
//!   through a [`NotificationSink`]. No global state.
//! - **Flicker-free**: Identical snapshots produce no notifications.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use kinder_core::{load_engine_config, KinderEngine};
//!
//! let config = load_engine_config(None)?;
//! let (tx, rx) = std::sync::mpsc::channel();
//! let mut engine = KinderEngine::new(config, session_id, me, Box::new(source), Box::new(tx));
//! engine.start(Utc::now())?;
//! ```

pub mod config;
pub mod cursor;
pub mod end_condition;
pub mod engine;
pub mod error;
pub mod matches;
pub mod movies;
pub mod names;
pub mod notify;
pub mod ranking;
pub mod replay;
pub mod roster;
pub mod source;
pub mod surface;
pub mod timer;

// Re-export commonly used items at crate root
pub use config::*;
pub use cursor::{CursorState, FlashPhase, ShowOutcome, VotingCursor};
pub use end_condition::{
    ConditionState, ConditionStates, EndCause, EndConditionEvaluator, Severity, TimeTier,
};
pub use engine::{KinderEngine, RefreshOutcome, RefreshTicket};
pub use error::{KinderError, Result, SourceError};
pub use matches::{MatchDetector, MatchLedger, MatchReport, MatchTransition};
pub use movies::MovieCache;
pub use names::{random_session_name, session_name};
pub use notify::{CallbackSink, Notification, NotificationSink};
pub use ranking::{
    rank_top_flop, BoardUpdate, Capacities, PanelEntry, PanelOp, Ranking, SelectedSet, Side,
    TopFlopBoard,
};
pub use replay::{load_replay_script, run_replay, ReplayScript, ReplaySource, ReplaySummary};
pub use roster::Roster;
pub use source::SnapshotSource;
pub use surface::{Surface, Surfaces};
pub use timer::{Scheduler, TimerHandle, TimerKind};

pub use kinder_protocol as protocol;
