//! Wire types and parsing for kinder voting sessions.
//!
//! This crate is shared by the engine and every snapshot source so both sides
//! agree on the JSON schema. Sources stay authoritative for the data; the
//! engine only reads it.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod timestamp;

/// Reasons the server reports when no further movie is handed out.
pub const OVER_TIME: &str = "Times up!";
pub const OVER_MATCHES: &str = "Max matches reached!";
pub const OVER_NO_MOVIES: &str = "No more movies left!";

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid JSON for {context}: {source}")]
    InvalidJson {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid movie key: {0}")]
    InvalidMovieKey(String),

    #[error("unrecognized timestamp: {0}")]
    InvalidTimestamp(String),
}

// ═══════════════════════════════════════════════════════════════════════════════
// Identities
// ═══════════════════════════════════════════════════════════════════════════════

/// Canonical identity of a movie reference.
///
/// The provider name is lower-cased on construction so that `Plex` and `plex`
/// references to the same title collapse to one key. The string form is
/// `source:id:language`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawMovieKey")]
pub struct MovieKey {
    source: String,
    id: String,
    language: String,
}

impl MovieKey {
    pub fn new(
        source: impl Into<String>,
        id: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into().trim().to_lowercase(),
            id: id.into().trim().to_string(),
            language: language.into().trim().to_string(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn language(&self) -> &str {
        &self.language
    }
}

impl fmt::Display for MovieKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.source, self.id, self.language)
    }
}

impl FromStr for MovieKey {
    type Err = ProtocolError;

    /// Parses `source:id:language`. The id may itself contain colons; the
    /// first separator ends the source and the last one starts the language.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (source, rest) = value
            .split_once(':')
            .ok_or_else(|| ProtocolError::InvalidMovieKey(value.to_string()))?;
        let (id, language) = rest
            .rsplit_once(':')
            .ok_or_else(|| ProtocolError::InvalidMovieKey(value.to_string()))?;
        if source.trim().is_empty() || id.trim().is_empty() {
            return Err(ProtocolError::InvalidMovieKey(value.to_string()));
        }
        Ok(MovieKey::new(source, id, language))
    }
}

// Sources send numeric ids for some providers and strings for others.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

// Either the object form or the `source:id:language` string form.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawMovieKey {
    Parts {
        source: String,
        id: RawId,
        #[serde(default)]
        language: String,
    },
    Text(String),
}

impl TryFrom<RawMovieKey> for MovieKey {
    type Error = ProtocolError;

    fn try_from(raw: RawMovieKey) -> Result<Self, Self::Error> {
        match raw {
            RawMovieKey::Parts {
                source,
                id,
                language,
            } => {
                let id = match id {
                    RawId::Text(text) => text,
                    RawId::Number(number) => number.to_string(),
                };
                Ok(MovieKey::new(source, id, language))
            }
            RawMovieKey::Text(text) => text.parse(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub u64);

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    #[serde(alias = "id")]
    pub user_id: ParticipantId,
    pub name: String,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Session
// ═══════════════════════════════════════════════════════════════════════════════

/// Termination budgets. Any value `<= 0` disables that condition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndConditions {
    #[serde(default)]
    pub max_minutes: i64,
    #[serde(default)]
    pub max_votes: i64,
    #[serde(default)]
    pub max_matches: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(alias = "id")]
    pub session_id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(with = "timestamp")]
    pub start_date: DateTime<Utc>,
    #[serde(default)]
    pub end_conditions: EndConditions,
    #[serde(default)]
    pub movie_provider: Vec<String>,
    #[serde(default)]
    pub creator_id: Option<ParticipantId>,
    #[serde(default)]
    pub seed: Option<u64>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Votes and snapshots
// ═══════════════════════════════════════════════════════════════════════════════

/// Per-movie vote tally as reported by the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    #[serde(alias = "movie_id")]
    pub movie: MovieKey,
    #[serde(default)]
    pub pro_voter: Vec<ParticipantId>,
    #[serde(default, alias = "contra_voter")]
    pub con_voter: Vec<ParticipantId>,
    #[serde(default, with = "timestamp::option")]
    pub last_vote: Option<DateTime<Utc>>,
}

impl VoteTally {
    pub fn pros(&self) -> usize {
        self.pro_voter.len()
    }

    pub fn cons(&self) -> usize {
        self.con_voter.len()
    }

    pub fn has_voted(&self, participant: ParticipantId) -> bool {
        self.pro_voter.contains(&participant) || self.con_voter.contains(&participant)
    }

    /// Pro and con voter lists are expected to be disjoint.
    pub fn is_disjoint(&self) -> bool {
        self.pro_voter.iter().all(|id| !self.con_voter.contains(id))
    }
}

/// Full read of a session's voting state. Never a delta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatusSnapshot {
    pub session: Session,
    #[serde(default)]
    pub votes: Vec<VoteTally>,
    #[serde(default)]
    pub user_ids: Vec<ParticipantId>,
}

impl SessionStatusSnapshot {
    pub fn participant_count(&self) -> usize {
        self.user_ids.len()
    }

    /// Movies the participant has a recorded vote for.
    pub fn voted_by(&self, participant: ParticipantId) -> impl Iterator<Item = &MovieKey> + '_ {
        self.votes
            .iter()
            .filter(move |tally| tally.has_voted(participant))
            .map(|tally| &tally.movie)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Movies
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovieDetail {
    #[serde(alias = "movie_id")]
    pub movie: MovieKey,
    pub title: String,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub plot: Option<String>,
    #[serde(default)]
    pub runtime: Option<u32>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub trailer: Vec<String>,
}

impl MovieDetail {
    /// `Title (Year)`, or the bare title when the year is unknown.
    pub fn display_title(&self) -> String {
        match self.year {
            Some(year) if year > 0 => format!("{} ({})", self.title, year),
            _ => self.title.clone(),
        }
    }
}

/// Response to a next-movie request: either a candidate or the reason the
/// session is over for this participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NextMovie {
    Over { over: String },
    Movie(MovieDetail),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VoteDirection {
    Pro,
    Contra,
}

impl VoteDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteDirection::Pro => "pro",
            VoteDirection::Contra => "contra",
        }
    }
}

/// Payload of a single vote submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRequest {
    pub session_id: u64,
    pub user_id: ParticipantId,
    pub movie_id: MovieKey,
    pub vote: VoteDirection,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Parsing
// ═══════════════════════════════════════════════════════════════════════════════

pub fn parse_snapshot(payload: &str) -> Result<SessionStatusSnapshot, ProtocolError> {
    serde_json::from_str(payload).map_err(|source| ProtocolError::InvalidJson {
        context: "session status",
        source,
    })
}

pub fn parse_next_movie(payload: &str) -> Result<NextMovie, ProtocolError> {
    serde_json::from_str(payload).map_err(|source| ProtocolError::InvalidJson {
        context: "next movie",
        source,
    })
}

pub fn parse_movie(payload: &str) -> Result<MovieDetail, ProtocolError> {
    serde_json::from_str(payload).map_err(|source| ProtocolError::InvalidJson {
        context: "movie",
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATUS: &str = r#"{
        "session": {
            "name": "movienight",
            "seed": 226498123,
            "session_id": 1,
            "start_date": "Sun, 25 May 2025 12:01:23 GMT",
            "end_conditions": { "max_minutes": 30, "max_votes": 0, "max_matches": 2 },
            "movie_provider": ["plex"]
        },
        "user_ids": [1, 2, 3],
        "votes": [
            {
                "movie_id": { "source": "PLEX", "id": 42 },
                "pro_voter": [1, 2],
                "con_voter": [3],
                "last_vote": "2025-05-25 12:03:10.123456"
            }
        ]
    }"#;

    #[test]
    fn movie_key_normalizes_source_case() {
        let a = MovieKey::new("Plex", "42", "de");
        let b = MovieKey::new("plex", "42", "de");
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "plex:42:de");
    }

    #[test]
    fn movie_key_parses_ids_with_colons() {
        let key: MovieKey = "jellyfin:abc:def:en".parse().unwrap();
        assert_eq!(key.source(), "jellyfin");
        assert_eq!(key.id(), "abc:def");
        assert_eq!(key.language(), "en");
    }

    #[test]
    fn movie_key_rejects_missing_parts() {
        assert!("plex".parse::<MovieKey>().is_err());
        assert!(":42:en".parse::<MovieKey>().is_err());
    }

    #[test]
    fn parses_status_with_legacy_fields() {
        let status = parse_snapshot(STATUS).unwrap();
        assert_eq!(status.session.session_id, 1);
        assert_eq!(status.session.end_conditions.max_matches, 2);
        assert_eq!(status.participant_count(), 3);
        let tally = &status.votes[0];
        assert_eq!(tally.movie, MovieKey::new("plex", "42", ""));
        assert_eq!(tally.pros(), 2);
        assert_eq!(tally.cons(), 1);
        assert!(tally.last_vote.is_some());
        assert!(tally.is_disjoint());
        assert_eq!(status.voted_by(ParticipantId(3)).count(), 1);
    }

    #[test]
    fn next_movie_distinguishes_over() {
        let over = parse_next_movie(r#"{"over": "Times up!"}"#).unwrap();
        assert_eq!(
            over,
            NextMovie::Over {
                over: OVER_TIME.to_string()
            }
        );

        let movie = parse_next_movie(
            r#"{"movie_id": {"source": "tmdb", "id": "7", "language": "en"}, "title": "Heat", "year": 1995}"#,
        )
        .unwrap();
        match movie {
            NextMovie::Movie(detail) => assert_eq!(detail.display_title(), "Heat (1995)"),
            other => panic!("expected movie, got {:?}", other),
        }
    }

    #[test]
    fn display_title_without_year() {
        let detail = parse_movie(r#"{"movie": {"source": "kodi", "id": 3}, "title": "Alien"}"#)
            .unwrap();
        assert_eq!(detail.display_title(), "Alien");
    }

    #[test]
    fn movie_key_accepts_string_form() {
        let key: MovieKey = serde_json::from_str("\"Plex:42:en\"").unwrap();
        assert_eq!(key, MovieKey::new("plex", "42", "en"));
        assert!(serde_json::from_str::<MovieKey>("\"plex\"").is_err());
    }

    #[test]
    fn vote_direction_uses_server_names() {
        assert_eq!(serde_json::to_string(&VoteDirection::Contra).unwrap(), "\"CONTRA\"");
    }

    #[test]
    fn rejects_malformed_status() {
        assert!(matches!(
            parse_snapshot("{\"votes\": []}"),
            Err(ProtocolError::InvalidJson { .. })
        ));
    }
}
