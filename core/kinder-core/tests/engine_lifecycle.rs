//! Integration tests driving a full engine through a session.

use std::rc::Rc;
use std::sync::mpsc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use kinder_core::protocol::{
    EndConditions, MovieDetail, MovieKey, NextMovie, ParticipantId, Session,
    SessionStatusSnapshot, VoteDirection, VoteTally,
};
use kinder_core::{
    CursorState, EndCause, EngineConfig, FlashPhase, KinderEngine, Notification, PanelOp,
    ReminderConfig, ReplayScript, ReplaySource, Surface,
};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 30, 20, 0, 0).unwrap()
}

fn key(id: &str) -> MovieKey {
    MovieKey::new("plex", id, "en")
}

fn movie(id: &str) -> MovieDetail {
    MovieDetail {
        movie: key(id),
        title: format!("Film {}", id),
        year: Some(1990),
        plot: None,
        runtime: Some(100),
        thumbnail: None,
        trailer: vec![],
    }
}

fn tally(id: &str, pros: &[u64], cons: &[u64]) -> VoteTally {
    VoteTally {
        movie: key(id),
        pro_voter: pros.iter().copied().map(ParticipantId).collect(),
        con_voter: cons.iter().copied().map(ParticipantId).collect(),
        last_vote: None,
    }
}

fn status(end_conditions: EndConditions, votes: Vec<VoteTally>, users: &[u64]) -> SessionStatusSnapshot {
    SessionStatusSnapshot {
        session: Session {
            session_id: 9,
            name: "quiet river".to_string(),
            start_date: t0(),
            end_conditions,
            movie_provider: vec!["plex".to_string()],
            creator_id: Some(ParticipantId(1)),
            seed: Some(7),
        },
        votes,
        user_ids: users.iter().copied().map(ParticipantId).collect(),
    }
}

struct Fixture {
    engine: KinderEngine,
    source: Rc<ReplaySource>,
    rx: mpsc::Receiver<Notification>,
}

impl Fixture {
    fn new(config: EngineConfig, ids: &[&str], queue: &[&str]) -> Self {
        let mut next_movies: Vec<NextMovie> = queue.iter().map(|id| NextMovie::Movie(movie(id))).collect();
        next_movies.push(NextMovie::Over {
            over: "No more movies left!".to_string(),
        });
        let script = ReplayScript {
            session_id: 9,
            participant: ParticipantId(1),
            movies: ids.iter().map(|id| movie(id)).collect(),
            users: vec![],
            next_movies,
            steps: vec![],
        };
        let source = Rc::new(ReplaySource::from_script(&script));
        let (tx, rx) = mpsc::channel();
        let engine = KinderEngine::new(
            config,
            9,
            ParticipantId(1),
            Box::new(Rc::clone(&source)),
            Box::new(tx),
        );
        Self { engine, source, rx }
    }

    fn drain(&self) -> Vec<Notification> {
        self.rx.try_iter().collect()
    }
}

fn quiet_config() -> EngineConfig {
    EngineConfig {
        top_count: 2,
        flop_count: 1,
        reminder: ReminderConfig::disabled(),
        ..EngineConfig::default()
    }
}

#[test]
fn test_refresh_twice_with_same_snapshot_is_idempotent() {
    let mut s = Fixture::new(quiet_config(), &["a", "b", "c"], &[]);
    let conditions = EndConditions {
        max_minutes: 90,
        max_votes: 30,
        max_matches: 3,
    };
    s.source.publish(status(
        conditions,
        vec![
            tally("a", &[1, 2], &[]),
            tally("b", &[], &[1, 2]),
            tally("c", &[2], &[1]),
        ],
        &[1, 2],
    ));

    s.engine.refresh(t0());
    assert!(!s.drain().is_empty());
    let selected = s.engine.board().selected().clone();

    s.engine.refresh(t0());
    assert!(s.drain().is_empty());
    assert_eq!(s.engine.board().selected(), &selected);
}

#[test]
fn test_sparse_top_lends_slots_to_flop() {
    let mut s = Fixture::new(quiet_config(), &["a", "x", "y", "z"], &[]);
    s.source.publish(status(
        EndConditions::default(),
        vec![
            tally("a", &[1], &[]),
            tally("x", &[], &[1, 2]),
            tally("y", &[], &[1]),
            tally("z", &[], &[1, 2, 3]),
        ],
        &[1, 2, 3],
    ));
    s.engine.refresh(t0());

    assert_eq!(s.engine.board().top().len(), 1);
    let flop: Vec<&str> = s.engine.board().flop().iter().map(|e| e.movie.id()).collect();
    assert_eq!(flop, vec!["z", "x"]);
}

#[test]
fn test_match_then_recall_across_polls() {
    let config = quiet_config();
    let poll = config.poll_interval();
    let mut s = Fixture::new(config, &["x"], &[]);
    s.source
        .publish(status(EndConditions::default(), vec![tally("x", &[1, 2], &[])], &[1, 2]));
    s.engine.start(t0()).unwrap();

    let notes = s.drain();
    assert_eq!(
        notes
            .iter()
            .filter(|n| matches!(n, Notification::NewMatch { .. }))
            .count(),
        1
    );
    assert_eq!(s.engine.ledger().last_announced(&key("x")), Some(2));

    s.source
        .publish(status(EndConditions::default(), vec![tally("x", &[1], &[])], &[1, 2]));
    s.engine.tick(t0() + poll);

    let notes = s.drain();
    assert!(notes.contains(&Notification::MatchRecalled { movie: key("x") }));
    assert!(notes.iter().any(|n| matches!(
        n,
        Notification::PanelUpdated { top, attention: true, .. }
            if matches!(top.as_slice(), [PanelOp::Replace { index: 0, .. }])
    )));
    assert_eq!(s.engine.ledger().last_announced(&key("x")), Some(1));
}

#[test]
fn test_unresolvable_movie_is_skipped_silently() {
    let mut s = Fixture::new(quiet_config(), &["kept"], &[]);
    s.source.publish(status(
        EndConditions::default(),
        vec![tally("deleted", &[1, 2], &[]), tally("kept", &[1], &[])],
        &[1, 2],
    ));
    s.engine.refresh(t0());

    let notes = s.drain();
    assert!(!notes.iter().any(|n| matches!(n, Notification::Error { .. })));
    let top: Vec<&str> = s.engine.board().top().iter().map(|e| e.movie.id()).collect();
    assert_eq!(top, vec!["kept"]);
}

#[test]
fn test_time_over_wins_and_silences_match_budget() {
    let conditions = EndConditions {
        max_minutes: 1,
        max_votes: 0,
        max_matches: 1,
    };
    let mut s = Fixture::new(quiet_config(), &["x"], &["x"]);
    s.source.publish(status(conditions, vec![], &[1, 2]));
    s.engine.start(t0() + Duration::seconds(50)).unwrap();
    assert_eq!(s.engine.cursor_state(), CursorState::AwaitingDecision);

    s.engine.tick(t0() + Duration::seconds(60));
    let notes = s.drain();
    assert!(notes.contains(&Notification::SessionOver {
        cause: EndCause::Time,
        announced: true,
    }));
    assert!(notes.contains(&Notification::VotingClosed));
    assert!(!s.engine.surfaces().is_mounted(Surface::MatchBadge));

    // A match arriving afterwards is still toasted but does not end the
    // session a second time.
    s.source
        .publish(status(conditions, vec![tally("x", &[1, 2], &[])], &[1, 2]));
    s.engine.refresh(t0() + Duration::seconds(61));
    let notes = s.drain();
    assert!(notes.iter().any(|n| matches!(n, Notification::NewMatch { .. })));
    assert!(!notes
        .iter()
        .any(|n| matches!(n, Notification::SessionOver { .. })));
    assert_eq!(s.engine.end_cause(), Some(&EndCause::Time));
}

#[test]
fn test_vote_budget_does_not_end_session_by_itself() {
    let conditions = EndConditions {
        max_minutes: 0,
        max_votes: 1,
        max_matches: 0,
    };
    let mut s = Fixture::new(quiet_config(), &["a", "b"], &["a", "b"]);
    s.source.publish(status(conditions, vec![], &[1, 2]));
    s.engine.start(t0()).unwrap();
    s.drain();
    s.engine.decide(VoteDirection::Pro, t0()).unwrap();

    assert!(!s.engine.is_over());
    assert_eq!(s.engine.cursor_state(), CursorState::AwaitingDecision);
    // Reaching the budget only stops the display.
    assert!(!s
        .drain()
        .iter()
        .any(|n| matches!(n, Notification::VoteCountUpdated { .. })));
    assert!(s.engine.surfaces().is_mounted(Surface::VoteBadge));
}

#[test]
fn test_reminder_flashes_while_waiting() {
    let config = EngineConfig {
        reminder: ReminderConfig {
            min_ms: 1_000,
            max_ms: 5_000,
            offset_ms: 500,
            flash_ms: 200,
        },
        ..EngineConfig::default()
    };
    let mut s = Fixture::new(config, &["a"], &["a"]);
    s.source.publish(status(EndConditions::default(), vec![], &[1]));
    s.engine.start(t0()).unwrap();
    s.drain();

    s.engine.tick(t0() + Duration::milliseconds(1_000));
    s.engine.tick(t0() + Duration::milliseconds(1_200));
    let phases: Vec<FlashPhase> = s
        .drain()
        .into_iter()
        .filter_map(|n| match n {
            Notification::ReminderFlash { phase } => Some(phase),
            _ => None,
        })
        .collect();
    assert_eq!(phases, vec![FlashPhase::First, FlashPhase::Second]);
    assert_eq!(s.engine.cursor().reminder_delay_ms(), 1_000);
}

#[test]
fn test_tearing_down_voting_area_clears_reminder() {
    let mut s = Fixture::new(EngineConfig::default(), &["a"], &["a"]);
    s.source.publish(status(EndConditions::default(), vec![], &[1]));
    s.engine.start(t0()).unwrap();
    let with_reminder = s.engine.pending_timers();

    s.engine.tear_down(Surface::VotingArea);
    assert_eq!(s.engine.pending_timers(), with_reminder - 1);
    assert_eq!(s.engine.cursor_state(), CursorState::Ended);
}

#[test]
fn test_tearing_down_time_badge_stops_countdown() {
    let conditions = EndConditions {
        max_minutes: 10,
        max_votes: 0,
        max_matches: 0,
    };
    let mut s = Fixture::new(quiet_config(), &["a"], &["a"]);
    s.source.publish(status(conditions, vec![], &[1, 2]));
    s.engine.start(t0()).unwrap();
    let with_countdown = s.engine.pending_timers();
    s.drain();

    s.engine.tear_down(Surface::TimeBadge);
    assert_eq!(s.engine.pending_timers(), with_countdown - 1);

    for second in 1..=5 {
        s.engine.tick(t0() + Duration::seconds(second));
    }
    assert!(!s
        .drain()
        .iter()
        .any(|n| matches!(n, Notification::TimeRemainingUpdated { .. })));
    assert!(!s.engine.is_over());
}
