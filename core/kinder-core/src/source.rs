//! The snapshot source seam.
//!
//! Everything the engine learns about a session comes through this trait:
//! the polled status snapshot, the next candidate movie, movie details and
//! participants. Implementations own the transport; the engine never talks to
//! the network directly.

use std::rc::Rc;
use std::sync::Arc;

use kinder_protocol::{
    MovieDetail, MovieKey, NextMovie, Participant, ParticipantId, SessionStatusSnapshot,
    VoteRequest,
};

use crate::error::SourceError;

/// Collaborator that answers session queries.
///
/// Implementors should:
/// - Report deleted or unknown entities as [`SourceError::NotFound`]
/// - Report everything else that went wrong as [`SourceError::Transport`]
/// - Return a fresh full snapshot on every `session_status` call
pub trait SnapshotSource {
    fn session_status(&self, session_id: u64) -> Result<SessionStatusSnapshot, SourceError>;

    fn next_movie(
        &self,
        session_id: u64,
        user_id: ParticipantId,
    ) -> Result<NextMovie, SourceError>;

    fn submit_vote(&self, vote: &VoteRequest) -> Result<(), SourceError>;

    fn movie(&self, key: &MovieKey) -> Result<MovieDetail, SourceError>;

    fn user(&self, user_id: ParticipantId) -> Result<Participant, SourceError>;
}

impl<T: SnapshotSource + ?Sized> SnapshotSource for Rc<T> {
    fn session_status(&self, session_id: u64) -> Result<SessionStatusSnapshot, SourceError> {
        (**self).session_status(session_id)
    }

    fn next_movie(
        &self,
        session_id: u64,
        user_id: ParticipantId,
    ) -> Result<NextMovie, SourceError> {
        (**self).next_movie(session_id, user_id)
    }

    fn submit_vote(&self, vote: &VoteRequest) -> Result<(), SourceError> {
        (**self).submit_vote(vote)
    }

    fn movie(&self, key: &MovieKey) -> Result<MovieDetail, SourceError> {
        (**self).movie(key)
    }

    fn user(&self, user_id: ParticipantId) -> Result<Participant, SourceError> {
        (**self).user(user_id)
    }
}

impl<T: SnapshotSource + ?Sized> SnapshotSource for Arc<T> {
    fn session_status(&self, session_id: u64) -> Result<SessionStatusSnapshot, SourceError> {
        (**self).session_status(session_id)
    }

    fn next_movie(
        &self,
        session_id: u64,
        user_id: ParticipantId,
    ) -> Result<NextMovie, SourceError> {
        (**self).next_movie(session_id, user_id)
    }

    fn submit_vote(&self, vote: &VoteRequest) -> Result<(), SourceError> {
        (**self).submit_vote(vote)
    }

    fn movie(&self, key: &MovieKey) -> Result<MovieDetail, SourceError> {
        (**self).movie(key)
    }

    fn user(&self, user_id: ParticipantId) -> Result<Participant, SourceError> {
        (**self).user(user_id)
    }
}
