//! Top/flop ranking of a session snapshot.
//!
//! Ranking runs in two passes over the snapshot's tallies:
//!
//! 1. **Top**: tallies with at least one pro vote and no more cons than pros,
//!    ordered by pros descending, then cons ascending.
//! 2. **Flop**: tallies with at least one con vote and no more pros than cons
//!    that did not make the top list, ordered by cons descending, then pros
//!    ascending. Unused top slots are lent to the flop list.
//!
//! Sorting is stable, so ties keep the source order (most recent vote first).
//! A movie that cannot be resolved is skipped without using up a slot.
//!
//! [`TopFlopBoard`] keeps the rows shown on the previous refresh and turns
//! each new ranking into positional patches, so unchanged rows are never
//! re-rendered.

use std::collections::HashSet;

use kinder_protocol::{MovieDetail, MovieKey, SessionStatusSnapshot, VoteTally};
use serde::Serialize;

use crate::error::SourceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capacities {
    pub top: usize,
    pub flop: usize,
}

impl Capacities {
    pub fn new(top: usize, flop: usize) -> Self {
        Self { top, flop }
    }

    /// Flop slots for a refresh where `top_selected` top rows were filled.
    pub fn effective_flop(&self, top_selected: usize) -> usize {
        self.flop + self.top.saturating_sub(top_selected)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Top,
    Flop,
}

/// What makes a rendered row "the same row" across refreshes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryIdentity {
    pub movie: MovieKey,
    pub side: Side,
    pub pros: usize,
    pub cons: usize,
    pub participants: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PanelEntry {
    pub movie: MovieKey,
    pub side: Side,
    pub title: String,
    pub pros: usize,
    pub cons: usize,
    pub participants: usize,
}

impl PanelEntry {
    fn new(side: Side, tally: &VoteTally, detail: &MovieDetail, participants: usize) -> Self {
        Self {
            movie: tally.movie.clone(),
            side,
            title: detail.display_title(),
            pros: tally.pros(),
            cons: tally.cons(),
            participants,
        }
    }

    pub fn identity(&self) -> EntryIdentity {
        EntryIdentity {
            movie: self.movie.clone(),
            side: self.side,
            pros: self.pros,
            cons: self.cons,
            participants: self.participants,
        }
    }

    /// Votes cast on this movie out of the current participant count.
    pub fn votes_label(&self) -> String {
        format!("{}/{}", self.pros + self.cons, self.participants)
    }
}

/// One positional change to a panel side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PanelOp {
    Replace { index: usize, entry: PanelEntry },
    Append { index: usize, entry: PanelEntry },
    Remove { index: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedEntry {
    pub side: Side,
    pub tally: VoteTally,
}

/// Movies chosen on one refresh, in selection order (top first).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectedSet {
    entries: Vec<SelectedEntry>,
}

impl SelectedSet {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, movie: &MovieKey) -> bool {
        self.get(movie).is_some()
    }

    pub fn get(&self, movie: &MovieKey) -> Option<&VoteTally> {
        self.entries
            .iter()
            .find(|entry| &entry.tally.movie == movie)
            .map(|entry| &entry.tally)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SelectedEntry> {
        self.entries.iter()
    }

    fn push(&mut self, side: Side, tally: VoteTally) {
        self.entries.push(SelectedEntry { side, tally });
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ranking {
    pub top: Vec<PanelEntry>,
    pub flop: Vec<PanelEntry>,
    pub selected: SelectedSet,
}

pub fn is_top_eligible(tally: &VoteTally) -> bool {
    tally.pros() > 0 && tally.cons() <= tally.pros()
}

pub fn is_flop_eligible(tally: &VoteTally) -> bool {
    tally.cons() > 0 && tally.pros() <= tally.cons()
}

/// Ranks a snapshot into top and flop rows.
///
/// `resolve` returns `Ok(None)` for movies that cannot be resolved; any error
/// aborts the ranking. The snapshot itself is never modified.
pub fn rank_top_flop<F>(
    snapshot: &SessionStatusSnapshot,
    capacities: Capacities,
    mut resolve: F,
) -> Result<Ranking, SourceError>
where
    F: FnMut(&MovieKey) -> Result<Option<MovieDetail>, SourceError>,
{
    let participants = snapshot.participant_count();
    let mut pass = SelectionPass {
        claimed: HashSet::new(),
        unresolved: HashSet::new(),
        selected: SelectedSet::default(),
        participants,
    };

    let mut top_candidates: Vec<&VoteTally> = snapshot
        .votes
        .iter()
        .filter(|tally| is_top_eligible(tally))
        .collect();
    top_candidates.sort_by(|a, b| b.pros().cmp(&a.pros()).then(a.cons().cmp(&b.cons())));
    let top = pass.take(Side::Top, top_candidates, capacities.top, &mut resolve)?;

    let mut flop_candidates: Vec<&VoteTally> = snapshot
        .votes
        .iter()
        .filter(|tally| is_flop_eligible(tally) && !pass.claimed.contains(&tally.movie))
        .collect();
    flop_candidates.sort_by(|a, b| b.cons().cmp(&a.cons()).then(a.pros().cmp(&b.pros())));
    let flop_capacity = capacities.effective_flop(top.len());
    let flop = pass.take(Side::Flop, flop_candidates, flop_capacity, &mut resolve)?;

    Ok(Ranking {
        top,
        flop,
        selected: pass.selected,
    })
}

struct SelectionPass {
    claimed: HashSet<MovieKey>,
    unresolved: HashSet<MovieKey>,
    selected: SelectedSet,
    participants: usize,
}

impl SelectionPass {
    fn take<F>(
        &mut self,
        side: Side,
        candidates: Vec<&VoteTally>,
        capacity: usize,
        resolve: &mut F,
    ) -> Result<Vec<PanelEntry>, SourceError>
    where
        F: FnMut(&MovieKey) -> Result<Option<MovieDetail>, SourceError>,
    {
        let mut rows = Vec::new();
        for tally in candidates {
            if rows.len() >= capacity {
                break;
            }
            if self.claimed.contains(&tally.movie) || self.unresolved.contains(&tally.movie) {
                continue;
            }
            match resolve(&tally.movie)? {
                Some(detail) => {
                    self.claimed.insert(tally.movie.clone());
                    rows.push(PanelEntry::new(side, tally, &detail, self.participants));
                    self.selected.push(side, tally.clone());
                }
                None => {
                    self.unresolved.insert(tally.movie.clone());
                }
            }
        }
        Ok(rows)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Board
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardUpdate {
    pub top: Vec<PanelOp>,
    pub flop: Vec<PanelOp>,
    /// The selection changed in a way worth drawing the eye to.
    pub attention: bool,
}

impl BoardUpdate {
    pub fn is_empty(&self) -> bool {
        self.top.is_empty() && self.flop.is_empty() && !self.attention
    }
}

/// Rows currently shown, plus the selection they came from.
#[derive(Debug, Default)]
pub struct TopFlopBoard {
    top: Vec<PanelEntry>,
    flop: Vec<PanelEntry>,
    selected: SelectedSet,
}

impl TopFlopBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn top(&self) -> &[PanelEntry] {
        &self.top
    }

    pub fn flop(&self) -> &[PanelEntry] {
        &self.flop
    }

    pub fn selected(&self) -> &SelectedSet {
        &self.selected
    }

    pub fn apply(&mut self, ranking: Ranking) -> BoardUpdate {
        let attention = needs_attention(&self.selected, &ranking.selected);
        let top = patch_rows(&mut self.top, ranking.top);
        let mut flop = patch_rows(&mut self.flop, ranking.flop);

        let top_keys: HashSet<MovieKey> = self.top.iter().map(|row| row.movie.clone()).collect();
        for index in (0..self.flop.len()).rev() {
            if top_keys.contains(&self.flop[index].movie) {
                self.flop.remove(index);
                flop.push(PanelOp::Remove { index });
            }
        }

        self.selected = ranking.selected;
        BoardUpdate {
            top,
            flop,
            attention,
        }
    }
}

fn patch_rows(current: &mut Vec<PanelEntry>, next: Vec<PanelEntry>) -> Vec<PanelOp> {
    let mut ops = Vec::new();
    let next_len = next.len();

    for (index, entry) in next.into_iter().enumerate() {
        let unchanged = current.get(index).map(|row| row.identity() == entry.identity());
        match unchanged {
            Some(true) => {}
            Some(false) => {
                current[index] = entry.clone();
                ops.push(PanelOp::Replace { index, entry });
            }
            None => {
                current.push(entry.clone());
                ops.push(PanelOp::Append { index, entry });
            }
        }
    }

    while current.len() > next_len {
        current.pop();
        ops.push(PanelOp::Remove {
            index: current.len(),
        });
    }
    ops
}

fn needs_attention(previous: &SelectedSet, next: &SelectedSet) -> bool {
    if previous.is_empty() {
        return !next.is_empty();
    }
    if next.len() > previous.len() {
        return true;
    }
    previous.iter().any(|old| match next.get(&old.tally.movie) {
        None => true,
        Some(new) => new.pros() != old.tally.pros() || new.cons() != old.tally.cons(),
    })
}
