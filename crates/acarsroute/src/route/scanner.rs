use std::collections::BTreeMap;
use std::time::Instant;

use aho_corasick::{AhoCorasick, MatchKind};
use tracing::info;

use super::AirportMatch;
use crate::Error;

/// A multi-pattern matcher over a fixed set of airport codes.
///
/// There is one automaton per code length, so that a 3-letter code never
/// hides a 4-letter code it overlaps with (`AKP` in `AKPDX`). Matches of
/// the same length do not overlap. Matches of different lengths do, e.g.
/// `PDX` is reported inside `KPDX`.
#[derive(Debug, Clone)]
pub struct AirportScanner {
    automata: Vec<(AhoCorasick, Vec<String>)>,
}

impl AirportScanner {
    pub fn new<I, S>(codes: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut codes: Vec<String> = codes
            .into_iter()
            .map(|code| code.as_ref().trim().to_string())
            .filter(|code| !code.is_empty())
            .collect();
        codes.sort();
        codes.dedup();
        let mut by_length: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        for code in codes {
            by_length.entry(code.len()).or_default().push(code);
        }
        let automata = by_length
            .into_values()
            .map(|codes| -> Result<_, Error> {
                let automaton = AhoCorasick::builder()
                    .match_kind(MatchKind::LeftmostFirst)
                    .build(&codes)?;
                Ok((automaton, codes))
            })
            .collect::<Result<Vec<_>, Error>>()?;
        Ok(AirportScanner { automata })
    }

    /// Same as [`AirportScanner::new`], reporting how long it took.
    pub fn timed<I, S>(codes: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let now = Instant::now();
        let scanner = Self::new(codes)?;
        info!(
            "airport automaton ({} codes) prepared in {:?}",
            scanner.len(),
            now.elapsed()
        );
        Ok(scanner)
    }

    /// All codes found in `text`, ordered by end offset, shorter codes
    /// first on ties.
    pub fn scan(&self, text: &str) -> Vec<AirportMatch> {
        let mut matches: Vec<AirportMatch> = self
            .automata
            .iter()
            .flat_map(|(automaton, codes)| {
                automaton.find_iter(text).map(move |m| AirportMatch {
                    end: m.end() - 1,
                    code: codes[m.pattern().as_usize()].clone(),
                })
            })
            .collect();
        matches.sort_by_key(|m| (m.end, m.code.len()));
        matches
    }

    pub fn len(&self) -> usize {
        self.automata.iter().map(|(_, codes)| codes.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.automata.is_empty()
    }
}
