//! Per-engine cache of resolved movie details.

use std::collections::HashMap;

use kinder_protocol::{MovieDetail, MovieKey};
use tracing::debug;

use crate::error::SourceError;
use crate::source::SnapshotSource;

/// Resolved details keyed by movie. Failed lookups are not remembered, so a
/// movie that was unavailable on one refresh is tried again on the next.
#[derive(Debug, Default)]
pub struct MovieCache {
    entries: HashMap<MovieKey, MovieDetail>,
}

impl MovieCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// `Ok(None)` means the movie cannot be resolved and should be skipped.
    pub fn resolve(
        &mut self,
        source: &dyn SnapshotSource,
        key: &MovieKey,
    ) -> Result<Option<MovieDetail>, SourceError> {
        if let Some(detail) = self.entries.get(key) {
            return Ok(Some(detail.clone()));
        }

        match source.movie(key) {
            Ok(detail) => {
                self.entries.insert(key.clone(), detail.clone());
                Ok(Some(detail))
            }
            Err(err) if err.is_resolution_failure() => {
                debug!(movie = %key, error = %err, "Movie unresolvable; skipping");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Fetches fresh details, bypassing and then refreshing the cache.
    pub fn refetch(
        &mut self,
        source: &dyn SnapshotSource,
        key: &MovieKey,
    ) -> Result<MovieDetail, SourceError> {
        let detail = source.movie(key)?;
        self.entries.insert(key.clone(), detail.clone());
        Ok(detail)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
