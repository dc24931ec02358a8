//! Candidate scoring and selection.

use crate::catalog::MediaMetadata;
use crate::provider::Candidate;

const MULTI_AUDIO_MARKERS: &[&str] = &["dual audio", "dual-audio", "multi audio", "multi-audio"];

const MULTI_AUDIO_BONUS: i64 = 100;

/// Resolution markers, highest first. Only the first match counts.
const RESOLUTION_BONUSES: &[(&[&str], i64)] = &[
    (&["2160p", "4k"], 50),
    (&["1080p"], 40),
    (&["720p"], 20),
];

/// Score a candidate by name markers plus a small availability nudge.
pub fn score(candidate: &Candidate) -> i64 {
    let name = candidate.name.to_lowercase();
    let mut total = 0;

    if MULTI_AUDIO_MARKERS.iter().any(|m| name.contains(m)) {
        total += MULTI_AUDIO_BONUS;
    }

    if let Some((_, bonus)) = RESOLUTION_BONUSES
        .iter()
        .find(|(markers, _)| markers.iter().any(|m| name.contains(m)))
    {
        total += bonus;
    }

    total + i64::from(candidate.seeders / 10)
}

/// Pick the highest scoring candidate with at least `min_availability` seeders.
///
/// Ties go to the earliest candidate. Returns `None` when nothing qualifies.
pub fn select_best(candidates: &[Candidate], min_availability: u32) -> Option<&Candidate> {
    let mut best: Option<(&Candidate, i64)> = None;
    for candidate in candidates {
        if candidate.seeders < min_availability {
            continue;
        }
        let s = score(candidate);
        match best {
            Some((_, best_score)) if s <= best_score => {}
            _ => best = Some((candidate, s)),
        }
    }
    best.map(|(c, _)| c)
}

/// Catalog search results come back ordered by relevance; take the first.
pub fn most_relevant(results: &[MediaMetadata]) -> Option<&MediaMetadata> {
    results.first()
}
