//! Participant lookups for a session.

use std::collections::HashMap;

use kinder_protocol::{Participant, ParticipantId, SessionStatusSnapshot};
use tracing::debug;

use crate::error::SourceError;
use crate::source::SnapshotSource;

/// Caches `user` lookups. Names do not change during a session.
#[derive(Debug, Default)]
pub struct Roster {
    known: HashMap<ParticipantId, Participant>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(
        &mut self,
        source: &dyn SnapshotSource,
        id: ParticipantId,
    ) -> Result<Participant, SourceError> {
        if let Some(participant) = self.known.get(&id) {
            return Ok(participant.clone());
        }
        let participant = source.user(id)?;
        self.known.insert(id, participant.clone());
        Ok(participant)
    }

    /// Resolves a snapshot's participants plus its creator, in order and
    /// without duplicates. Users that no longer exist are left out.
    pub fn members(
        &mut self,
        source: &dyn SnapshotSource,
        snapshot: &SessionStatusSnapshot,
    ) -> Result<Vec<Participant>, SourceError> {
        let mut ids: Vec<ParticipantId> = Vec::with_capacity(snapshot.user_ids.len() + 1);
        for id in snapshot.user_ids.iter().copied().chain(snapshot.session.creator_id) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }

        let mut members = Vec::with_capacity(ids.len());
        for id in ids {
            match self.resolve(source, id) {
                Ok(participant) => members.push(participant),
                Err(err) if err.is_resolution_failure() => {
                    debug!(user = %id, "Participant no longer exists");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(members)
    }

    pub fn find_by_name(
        &mut self,
        source: &dyn SnapshotSource,
        snapshot: &SessionStatusSnapshot,
        name: &str,
    ) -> Result<Option<Participant>, SourceError> {
        let members = self.members(source, snapshot)?;
        Ok(members.into_iter().find(|member| member.name == name))
    }

    /// Joining under a name the session already knows is a rejoin.
    pub fn is_rejoin(
        &mut self,
        source: &dyn SnapshotSource,
        snapshot: &SessionStatusSnapshot,
        name: &str,
    ) -> Result<bool, SourceError> {
        Ok(self.find_by_name(source, snapshot, name)?.is_some())
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }
}
