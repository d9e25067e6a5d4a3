pub mod infer;
pub mod scanner;

use std::fmt::Display;

use serde::Serialize;

/// One occurrence of an airport code in a text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AirportMatch {
    /// Offset of the last character of the match
    pub end: usize,
    pub code: String,
}

impl AirportMatch {
    /// Offset of the first character of the match
    pub fn start(&self) -> usize {
        self.end + 1 - self.code.len()
    }
}

/// A pair of airport codes found close to each other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteCandidate {
    pub origin: String,
    pub destination: String,
    /// Distance between the end offsets of both matches
    pub separation: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ResolvedRoute {
    pub origin: String,
    pub destination: String,
}

impl From<RouteCandidate> for ResolvedRoute {
    fn from(candidate: RouteCandidate) -> Self {
        ResolvedRoute {
            origin: candidate.origin,
            destination: candidate.destination,
        }
    }
}

impl Display for ResolvedRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.origin, self.destination)
    }
}
