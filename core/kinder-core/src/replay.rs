//! Offline replay of a recorded session.
//!
//! A replay script is a JSON document holding the data a live source would
//! serve (movies, users, the next-movie queue) and a timeline of steps. Each
//! step first advances the engine clock to its `at`, firing due timers, then
//! performs its action.
//!
//! ```json
//! {
//!   "session_id": 1,
//!   "participant": 1,
//!   "movies": [{ "movie": "plex:42:en", "title": "Alien", "year": 1979 }],
//!   "next_movies": [{ "movie": "plex:42:en", "title": "Alien" }, { "over": "Times up!" }],
//!   "steps": [
//!     { "at": "2026-01-30T12:00:00Z", "action": "publish", "snapshot": { ... } },
//!     { "at": "2026-01-30T12:00:00Z", "action": "start" },
//!     { "at": "2026-01-30T12:00:04Z", "action": "decide", "vote": "PRO" }
//!   ]
//! }
//! ```

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use kinder_protocol::{
    MovieDetail, MovieKey, NextMovie, Participant, ParticipantId, SessionStatusSnapshot,
    VoteDirection, VoteRequest, OVER_NO_MOVIES,
};
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::end_condition::EndCause;
use crate::engine::{KinderEngine, RefreshOutcome};
use crate::error::{KinderError, Result, SourceError};
use crate::notify::NotificationSink;
use crate::source::SnapshotSource;
use crate::surface::Surface;

#[derive(Debug, Clone, Deserialize)]
pub struct ReplayScript {
    pub session_id: u64,
    pub participant: ParticipantId,
    #[serde(default)]
    pub movies: Vec<MovieDetail>,
    #[serde(default)]
    pub users: Vec<Participant>,
    #[serde(default)]
    pub next_movies: Vec<NextMovie>,
    #[serde(default)]
    pub steps: Vec<ReplayStep>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplayStep {
    #[serde(with = "kinder_protocol::timestamp")]
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub action: ReplayAction,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReplayAction {
    /// Makes `snapshot` what the source serves from now on.
    Publish { snapshot: SessionStatusSnapshot },
    Start,
    Refresh,
    /// Only advances the clock.
    Tick,
    Decide { vote: VoteDirection },
    Correct,
    DismissCorrection,
    TearDown { surface: Surface },
    /// The movie can no longer be resolved.
    Remove { movie: MovieKey },
}

pub fn load_replay_script(path: &Path) -> Result<ReplayScript> {
    let content = fs_err::read_to_string(path).map_err(|source| KinderError::ReplayRead {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| KinderError::ReplayMalformed {
        path: path.to_path_buf(),
        source,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// Source
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
struct ReplayState {
    snapshot: Option<SessionStatusSnapshot>,
    movies: HashMap<MovieKey, MovieDetail>,
    users: HashMap<ParticipantId, Participant>,
    next: VecDeque<NextMovie>,
    submitted: Vec<VoteRequest>,
}

/// Serves a script's data. Shared with the runner through `Rc` so steps can
/// publish new snapshots while the engine owns its handle.
#[derive(Debug, Default)]
pub struct ReplaySource {
    state: RefCell<ReplayState>,
}

impl ReplaySource {
    pub fn from_script(script: &ReplayScript) -> Self {
        let state = ReplayState {
            snapshot: None,
            movies: script
                .movies
                .iter()
                .map(|movie| (movie.movie.clone(), movie.clone()))
                .collect(),
            users: script
                .users
                .iter()
                .map(|user| (user.user_id, user.clone()))
                .collect(),
            next: script.next_movies.iter().cloned().collect(),
            submitted: Vec::new(),
        };
        Self {
            state: RefCell::new(state),
        }
    }

    pub fn publish(&self, snapshot: SessionStatusSnapshot) {
        self.state.borrow_mut().snapshot = Some(snapshot);
    }

    pub fn remove_movie(&self, movie: &MovieKey) {
        self.state.borrow_mut().movies.remove(movie);
    }

    pub fn submitted(&self) -> Vec<VoteRequest> {
        self.state.borrow().submitted.clone()
    }
}

impl SnapshotSource for ReplaySource {
    fn session_status(&self, session_id: u64) -> std::result::Result<SessionStatusSnapshot, SourceError> {
        self.state
            .borrow()
            .snapshot
            .clone()
            .ok_or_else(|| SourceError::transport("session_status", format!("no snapshot published for session {}", session_id)))
    }

    fn next_movie(
        &self,
        _session_id: u64,
        _user_id: ParticipantId,
    ) -> std::result::Result<NextMovie, SourceError> {
        let mut state = self.state.borrow_mut();
        Ok(state.next.pop_front().unwrap_or_else(|| NextMovie::Over {
            over: OVER_NO_MOVIES.to_string(),
        }))
    }

    fn submit_vote(&self, vote: &VoteRequest) -> std::result::Result<(), SourceError> {
        self.state.borrow_mut().submitted.push(vote.clone());
        Ok(())
    }

    fn movie(&self, key: &MovieKey) -> std::result::Result<MovieDetail, SourceError> {
        self.state
            .borrow()
            .movies
            .get(key)
            .cloned()
            .ok_or_else(|| SourceError::not_found(format!("movie {}", key)))
    }

    fn user(&self, user_id: ParticipantId) -> std::result::Result<Participant, SourceError> {
        self.state
            .borrow()
            .users
            .get(&user_id)
            .cloned()
            .ok_or_else(|| SourceError::not_found(format!("user {}", user_id)))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Runner
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaySummary {
    pub steps: usize,
    pub votes_submitted: usize,
    pub end_cause: Option<EndCause>,
}

/// Drives an engine through every step of `script`.
///
/// User actions that fail (a decision with nothing presented, a transport
/// error) are logged and the replay carries on, the way a live client would.
pub fn run_replay(
    script: ReplayScript,
    config: EngineConfig,
    sink: Box<dyn NotificationSink>,
) -> Result<ReplaySummary> {
    let source = Rc::new(ReplaySource::from_script(&script));
    let mut engine = KinderEngine::new(
        config,
        script.session_id,
        script.participant,
        Box::new(Rc::clone(&source)),
        sink,
    );

    let mut clock: Option<DateTime<Utc>> = None;
    let steps = script.steps.len();
    for (index, step) in script.steps.into_iter().enumerate() {
        if clock.is_some_and(|previous| step.at < previous) {
            warn!(step = index, at = %step.at, "Replay step goes back in time");
        }
        clock = Some(step.at);
        engine.tick(step.at);

        let result = match step.action {
            ReplayAction::Publish { snapshot } => {
                source.publish(snapshot);
                Ok(())
            }
            ReplayAction::Start => engine.start(step.at),
            ReplayAction::Refresh => {
                if engine.refresh(step.at) == RefreshOutcome::Skipped {
                    warn!(step = index, "Refresh skipped");
                }
                Ok(())
            }
            ReplayAction::Tick => Ok(()),
            ReplayAction::Decide { vote } => engine.decide(vote, step.at),
            ReplayAction::Correct => engine.correct(step.at),
            ReplayAction::DismissCorrection => {
                engine.dismiss_correction();
                Ok(())
            }
            ReplayAction::TearDown { surface } => {
                engine.tear_down(surface);
                Ok(())
            }
            ReplayAction::Remove { movie } => {
                source.remove_movie(&movie);
                Ok(())
            }
        };
        if let Err(err) = result {
            warn!(step = index, error = %err, "Replay step failed");
        }
    }

    let summary = ReplaySummary {
        steps,
        votes_submitted: source.submitted().len(),
        end_cause: engine.end_cause().cloned(),
    };
    engine.shutdown();
    info!(
        steps = summary.steps,
        votes = summary.votes_submitted,
        over = summary.end_cause.as_ref().map(EndCause::reason),
        "Replay finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::Notification;
    use std::sync::mpsc;

    const SCRIPT: &str = r#"{
        "session_id": 1,
        "participant": 1,
        "movies": [
            { "movie": "plex:a:en", "title": "Alpha", "year": 1999 },
            { "movie": "plex:b:en", "title": "Beta" }
        ],
        "users": [{ "user_id": 1, "name": "ada" }, { "user_id": 2, "name": "grace" }],
        "next_movies": [
            { "movie": "plex:a:en", "title": "Alpha", "year": 1999 },
            { "over": "Max votes reached!" }
        ],
        "steps": [
            { "at": "2026-01-30T12:00:00Z", "action": "publish", "snapshot": {
                "session": { "session_id": 1, "start_date": "Fri, 30 Jan 2026 12:00:00 GMT",
                             "end_conditions": { "max_minutes": 0, "max_votes": 1, "max_matches": 0 } },
                "votes": [{ "movie": "plex:b:en", "pro_voter": [2], "con_voter": [] }],
                "user_ids": [1, 2]
            } },
            { "at": "2026-01-30T12:00:00Z", "action": "start" },
            { "at": "2026-01-30T12:00:02Z", "action": "decide", "vote": "PRO" },
            { "at": "2026-01-30T12:00:05Z", "action": "tick" }
        ]
    }"#;

    #[test]
    fn replays_a_short_session() {
        let script: ReplayScript = serde_json::from_str(SCRIPT).unwrap();
        let (tx, rx) = mpsc::channel();

        let summary = run_replay(script, EngineConfig::default(), Box::new(tx)).unwrap();
        assert_eq!(summary.steps, 4);
        assert_eq!(summary.votes_submitted, 1);
        assert_eq!(
            summary.end_cause,
            Some(EndCause::server("Max votes reached!"))
        );

        let notes: Vec<Notification> = rx.try_iter().collect();
        assert!(notes
            .iter()
            .any(|n| matches!(n, Notification::PanelUpdated { attention: true, .. })));
        assert!(notes.iter().any(|n| matches!(n, Notification::SessionOver { .. })));
    }

    #[test]
    fn load_reports_malformed_script() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("replay.json");
        fs_err::write(&path, "{ \"session_id\": ").expect("write script");

        let err = load_replay_script(&path).unwrap_err();
        assert!(matches!(err, KinderError::ReplayMalformed { .. }));
    }

    #[test]
    fn load_reports_missing_script() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let err = load_replay_script(&temp_dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, KinderError::ReplayRead { .. }));
    }

    #[test]
    fn missing_snapshot_is_a_transport_failure() {
        let source = ReplaySource::default();
        let err = source.session_status(1).unwrap_err();
        assert!(!err.is_resolution_failure());
    }
}
