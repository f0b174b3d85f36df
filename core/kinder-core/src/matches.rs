//! Perfect-match detection across refreshes.
//!
//! A movie is a perfect match when every listed participant voted pro. The
//! ledger remembers the pro count last announced for each movie so a match is
//! announced once per increase and recalled once when it stops holding.

use std::collections::HashMap;

use kinder_protocol::{MovieKey, ParticipantId};
use tracing::{debug, info};

use crate::ranking::SelectedSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerEntry {
    pub announced_pros: usize,
    /// The last announcement is still standing (not yet recalled).
    pub unanimous: bool,
}

/// Announced matches for the lifetime of one session. Entries are never
/// removed.
#[derive(Debug, Default)]
pub struct MatchLedger {
    entries: HashMap<MovieKey, LedgerEntry>,
}

impl MatchLedger {
    pub fn last_announced(&self, movie: &MovieKey) -> Option<usize> {
        self.entries.get(movie).map(|entry| entry.announced_pros)
    }

    pub fn get(&self, movie: &MovieKey) -> Option<&LedgerEntry> {
        self.entries.get(movie)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchTransition {
    NewMatch { movie: MovieKey, pro_count: usize },
    Recalled { movie: MovieKey },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchReport {
    /// Selected movies that are unanimous right now.
    pub match_count: usize,
    pub transitions: Vec<MatchTransition>,
}

#[derive(Debug, Default)]
pub struct MatchDetector {
    ledger: MatchLedger,
}

impl MatchDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ledger(&self) -> &MatchLedger {
        &self.ledger
    }

    /// Updates the ledger from one refresh's selection.
    ///
    /// Returns `None` when the acting participant is not yet listed in
    /// `user_ids`; the snapshot has not settled and nothing is evaluated.
    pub fn detect(
        &mut self,
        selected: &SelectedSet,
        user_ids: &[ParticipantId],
        acting: ParticipantId,
    ) -> Option<MatchReport> {
        if user_ids.len() <= 1 {
            return Some(MatchReport::default());
        }
        if !user_ids.contains(&acting) {
            debug!(participant = %acting, "Acting participant not in snapshot; skipping match check");
            return None;
        }

        let participants = user_ids.len();
        let mut report = MatchReport::default();

        for entry in selected.iter().rev() {
            let movie = &entry.tally.movie;
            let pros = entry.tally.pros();
            let unanimous = pros == participants;

            if unanimous {
                report.match_count += 1;
            }

            match self.ledger.entries.get_mut(movie) {
                None if unanimous => {
                    self.ledger.entries.insert(
                        movie.clone(),
                        LedgerEntry {
                            announced_pros: pros,
                            unanimous: true,
                        },
                    );
                    info!(movie = %movie, pro_count = pros, "New match");
                    report.transitions.push(MatchTransition::NewMatch {
                        movie: movie.clone(),
                        pro_count: pros,
                    });
                }
                None => {}
                Some(ledger) if unanimous && pros > ledger.announced_pros => {
                    ledger.announced_pros = pros;
                    ledger.unanimous = true;
                    info!(movie = %movie, pro_count = pros, "New match");
                    report.transitions.push(MatchTransition::NewMatch {
                        movie: movie.clone(),
                        pro_count: pros,
                    });
                }
                Some(ledger) => {
                    let retracted = ledger.announced_pros > pros;
                    if retracted {
                        ledger.announced_pros = pros;
                    }
                    if ledger.unanimous && (retracted || !unanimous) {
                        ledger.unanimous = false;
                        info!(movie = %movie, pro_count = pros, "Match recalled");
                        report.transitions.push(MatchTransition::Recalled {
                            movie: movie.clone(),
                        });
                    }
                }
            }
        }

        Some(report)
    }
}
