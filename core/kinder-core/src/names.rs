//! Random `adjective subject` session names.

use rand::seq::SliceRandom;
use rand::Rng;

pub const ADJECTIVES: [&str; 20] = [
    "happy", "sad", "bright", "dark", "quick", "slow", "beautiful", "ugly", "tall", "short",
    "loud", "quiet", "smooth", "rough", "warm", "cold", "soft", "hard", "rich", "poor",
];

pub const SUBJECTS: [&str; 23] = [
    "cat", "dog", "car", "house", "tree", "book", "computer", "phone", "ocean", "mountain",
    "city", "river", "flower", "bird", "star", "planet", "child", "sailor", "friend",
    "stranger", "night", "afternoon", "sunset",
];

/// Picks a name not in `taken`. `None` once every combination is used.
pub fn random_session_name<R: Rng + ?Sized>(taken: &[String], rng: &mut R) -> Option<String> {
    let mut candidates: Vec<(&str, &str)> = ADJECTIVES
        .iter()
        .flat_map(|adjective| SUBJECTS.iter().map(move |subject| (*adjective, *subject)))
        .collect();
    candidates.shuffle(rng);

    candidates
        .into_iter()
        .map(|(adjective, subject)| format!("{} {}", adjective, subject))
        .find(|name| !taken.contains(name))
}

pub fn session_name(taken: &[String]) -> Option<String> {
    random_session_name(taken, &mut rand::thread_rng())
}
