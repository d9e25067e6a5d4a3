//! Pair airport codes found by the scanner into route candidates.
//!
//! Origin and destination are assumed to be both ICAO (4 letters) or both
//! IATA (3 letters), never mixed. When routes appear obvious to the human
//! eye, the codes are next to each other (`KPDXKSEA`), separated by a single
//! character (`KPDX#KSEA`) or, more rarely, by two separators
//! (`KPDX, KSEA`). Since end offsets point at the last character of a
//! match, adjacent 4-letter codes are 4 characters apart.

use super::{AirportMatch, ResolvedRoute, RouteCandidate};

/// Marker for a continuing leg advisory, not an origin/destination pair
const CONTINUING_LEG: &str = "/WR";

/// How far before a match the continuing leg marker is searched for
const MARKER_WINDOW: usize = 6;

fn after_marker(text: &[u8], m: &AirportMatch) -> bool {
    let start = m.start();
    text[start.saturating_sub(MARKER_WINDOW)..start]
        .windows(CONTINUING_LEG.len())
        .any(|w| w == CONTINUING_LEG.as_bytes())
}

/// The two characters between `a` and `b` (6 apart) are separators
fn separated(text: &[u8], a: &AirportMatch) -> bool {
    text[a.end + 1..a.end + 3]
        .iter()
        .all(|c| !c.is_ascii_alphabetic())
}

fn pairs<'a, F>(
    matches: &[&'a AirportMatch],
    mut accept: F,
) -> Vec<RouteCandidate>
where
    F: FnMut(&'a AirportMatch, usize) -> bool,
{
    let mut candidates = Vec::new();
    for (i, first) in matches.iter().enumerate() {
        for second in &matches[i + 1..] {
            if first.code == second.code {
                continue;
            }
            let d = first.end.abs_diff(second.end);
            if accept(*first, d) {
                candidates.push(RouteCandidate {
                    origin: first.code.clone(),
                    destination: second.code.clone(),
                    separation: d,
                });
            }
        }
    }
    candidates
}

/// All route candidates in `text`, before the tie-break.
///
/// 4-letter codes are tried first since they produce far fewer false
/// positives; 3-letter codes are only considered when no 4-letter pair is
/// found, and only with zero or one character in between.
pub fn candidates(text: &str, matches: &[AirportMatch]) -> Vec<RouteCandidate> {
    let bytes = text.as_bytes();

    let fours: Vec<&AirportMatch> =
        matches.iter().filter(|m| m.code.len() == 4).collect();
    let candidates = pairs(&fours, |first, d| {
        let close = match d {
            4 | 5 => true,
            6 => separated(bytes, first),
            _ => false,
        };
        close && !after_marker(bytes, first)
    });
    if !candidates.is_empty() {
        return candidates;
    }

    let threes: Vec<&AirportMatch> =
        matches.iter().filter(|m| m.code.len() == 3).collect();
    pairs(&threes, |first, d| {
        (d == 3 || d == 4) && !after_marker(bytes, first)
    })
}

/// Keep the candidates with the smallest separation.
pub fn closest(candidates: Vec<RouteCandidate>) -> Vec<RouteCandidate> {
    let Some(min) = candidates.iter().map(|c| c.separation).min() else {
        return candidates;
    };
    candidates
        .into_iter()
        .filter(|c| c.separation == min)
        .collect()
}

/// The most likely routes mentioned in `text`.
///
/// Most of the time, there is exactly one; more than one route means the
/// text is ambiguous.
pub fn resolve(text: &str, matches: &[AirportMatch]) -> Vec<ResolvedRoute> {
    let mut routes: Vec<ResolvedRoute> = Vec::new();
    let closest = closest(candidates(text, matches));
    for route in closest.into_iter().map(ResolvedRoute::from) {
        if !routes.contains(&route) {
            routes.push(route);
        }
    }
    routes
}
