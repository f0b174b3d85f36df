//! Presentation surfaces the engine may update.
//!
//! The presentation collaborator owns the actual widgets. The engine only
//! tracks which ones still exist, so a late update aimed at a torn-down
//! surface is dropped at a single place instead of failing somewhere deep.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Surface {
    TopFlopPanel,
    TimeBadge,
    VoteBadge,
    MatchBadge,
    VotingArea,
}

impl Surface {
    pub const ALL: [Surface; 5] = [
        Surface::TopFlopPanel,
        Surface::TimeBadge,
        Surface::VoteBadge,
        Surface::MatchBadge,
        Surface::VotingArea,
    ];

    /// Badges replaced by the "vote is over" banner when a session ends.
    pub const END_CONDITION_BADGES: [Surface; 3] =
        [Surface::TimeBadge, Surface::VoteBadge, Surface::MatchBadge];
}

#[derive(Debug, Clone)]
pub struct Surfaces {
    mounted: HashSet<Surface>,
}

impl Default for Surfaces {
    fn default() -> Self {
        Self::all_mounted()
    }
}

impl Surfaces {
    pub fn all_mounted() -> Self {
        Self {
            mounted: Surface::ALL.into_iter().collect(),
        }
    }

    pub fn is_mounted(&self, surface: Surface) -> bool {
        self.mounted.contains(&surface)
    }

    /// Returns true if the surface was mounted before the call.
    pub fn tear_down(&mut self, surface: Surface) -> bool {
        self.mounted.remove(&surface)
    }

    pub fn tear_down_end_condition_badges(&mut self) {
        for surface in Surface::END_CONDITION_BADGES {
            self.mounted.remove(&surface);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tear_down_reports_prior_presence() {
        let mut surfaces = Surfaces::all_mounted();
        assert!(surfaces.tear_down(Surface::TimeBadge));
        assert!(!surfaces.tear_down(Surface::TimeBadge));
        assert!(!surfaces.is_mounted(Surface::TimeBadge));
    }

    #[test]
    fn end_of_session_keeps_panel_and_voting_area() {
        let mut surfaces = Surfaces::all_mounted();
        surfaces.tear_down_end_condition_badges();
        assert!(surfaces.is_mounted(Surface::TopFlopPanel));
        assert!(surfaces.is_mounted(Surface::VotingArea));
        assert!(!surfaces.is_mounted(Surface::MatchBadge));
    }
}
