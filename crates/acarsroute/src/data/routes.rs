use std::collections::{BTreeSet, HashMap, HashSet};

use csv::StringRecord;

use super::Airports;

/// Known routes per normalized callsign.
///
/// A route is a dash-separated list of legs (`KPDX-KSEA-KSLC`); several
/// routes known for the same callsign are kept pipe-separated.
#[derive(Debug, Default)]
pub struct Routes {
    known: HashMap<String, String>,
    /// Every (earlier leg, later leg) combination, with canonical codes
    pairs: HashSet<(String, String)>,
    /// Every airport code appearing in a route, with its IATA counterpart
    airports: BTreeSet<String>,
}

/// Airport codes which are too common in free text to be scanned for.
/// They still take part in known routes.
const UNSCANNED: &[&str] = &["AIR"];

fn is_airport_code(code: &str) -> bool {
    (code.len() == 3 || code.len() == 4)
        && code.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}

impl Routes {
    pub fn from_routes<I, S>(routes: I, airports: &Airports) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: AsRef<str>,
    {
        let mut table = Routes::default();
        for (callsign, route) in routes {
            let (callsign, route) = (callsign.as_ref().trim(), route.as_ref().trim());
            if callsign.is_empty() || route.is_empty() {
                continue;
            }
            let legs: Vec<&str> =
                route.split('-').filter(|leg| is_airport_code(leg)).collect();
            if legs.is_empty() {
                continue;
            }
            for leg in &legs {
                let iata = airports.iata(leg);
                for code in std::iter::once(*leg).chain(iata) {
                    if !UNSCANNED.contains(&code) {
                        table.airports.insert(code.to_string());
                    }
                }
            }
            for (i, origin) in legs.iter().enumerate() {
                for destination in &legs[i + 1..] {
                    table.pairs.insert((
                        airports.canonical(origin).to_string(),
                        airports.canonical(destination).to_string(),
                    ));
                }
            }
            let canonical = legs
                .iter()
                .map(|leg| airports.canonical(leg))
                .collect::<Vec<_>>()
                .join("-");
            match table.known.get_mut(callsign) {
                Some(known) => {
                    if !known.split('|').any(|r| r == canonical) {
                        known.push('|');
                        known.push_str(&canonical);
                    }
                }
                None => {
                    table.known.insert(callsign.to_string(), canonical);
                }
            }
        }
        table
    }

    pub(crate) fn from_rows(rows: Vec<StringRecord>, airports: &Airports) -> Self {
        Self::from_routes(
            rows.iter()
                .filter_map(|row| Some((row.get(0)?, row.get(4)?))),
            airports,
        )
    }

    /// The known routes for a callsign, pipe-separated
    pub fn known(&self, callsign: &str) -> Option<&str> {
        self.known.get(callsign).map(String::as_str)
    }

    /// Does any known route of `callsign` fly from `origin` to `destination`
    /// (possibly with intermediate legs)? Codes must be canonical.
    pub fn contains(&self, callsign: &str, origin: &str, destination: &str) -> bool {
        let Some(known) = self.known(callsign) else {
            return false;
        };
        known.split('|').any(|route| {
            let legs: Vec<&str> = route.split('-').collect();
            legs.iter()
                .position(|leg| *leg == origin)
                .is_some_and(|i| legs[i + 1..].contains(&destination))
        })
    }

    /// Is (origin, destination) a leg combination of any known route?
    pub fn is_known_pair(&self, origin: &str, destination: &str) -> bool {
        self.pairs
            .contains(&(origin.to_string(), destination.to_string()))
    }

    /// Airport codes the scanner should look for
    pub fn airports(&self) -> &BTreeSet<String> {
        &self.airports
    }

    pub fn pairs_len(&self) -> usize {
        self.pairs.len()
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn routes() -> Routes {
        let airports = Airports::from_pairs([
            ("KPDX", "PDX"),
            ("KSEA", "SEA"),
            ("KSLC", "SLC"),
        ]);
        Routes::from_routes(
            [
                ("DAL456", "KSEA-KSLC"),
                ("DAL789", "KPDX-KSEA-KSLC"),
                ("DAL789", "KSLC-KPDX"),
                ("DAL789", "KSLC-KPDX"),
                ("AAL1", "Airportcodes"),
                ("", "KPDX-KSEA"),
            ],
            &airports,
        )
    }

    #[test]
    fn test_known() {
        let routes = routes();
        assert_eq!(routes.len(), 2);
        assert_eq!(routes.known("DAL789"), Some("KPDX-KSEA-KSLC|KSLC-KPDX"));
        assert_eq!(routes.known("UAL1"), None);

        assert!(routes.contains("DAL789", "KPDX", "KSLC"));
        assert!(routes.contains("DAL789", "KSEA", "KSLC"));
        assert!(routes.contains("DAL789", "KSLC", "KPDX"));
        assert!(!routes.contains("DAL456", "KSLC", "KSEA"));
        assert!(!routes.contains("UAL1", "KSEA", "KSLC"));
    }

    #[test]
    fn test_pairs() {
        let routes = routes();
        assert!(routes.is_known_pair("KPDX", "KSEA"));
        assert!(routes.is_known_pair("KPDX", "KSLC"));
        assert!(routes.is_known_pair("KSLC", "KPDX"));
        assert!(!routes.is_known_pair("KSEA", "KPDX"));
        assert!(!routes.is_known_pair("PDX", "SEA"));
        assert_eq!(routes.pairs_len(), 4);

        let airports: Vec<&str> =
            routes.airports().iter().map(String::as_str).collect();
        assert_eq!(airports, ["KPDX", "KSEA", "KSLC", "PDX", "SEA", "SLC"]);
    }

    #[test]
    fn test_unscanned() {
        let airports = Airports::from_pairs([("KSEA", "SEA"), ("PAIR", "AIR")]);
        let routes = Routes::from_routes([("ASA1", "AIR-SEA"), ("ASA2", "PAIR-KSEA")], &airports);
        let scanned: Vec<&str> =
            routes.airports().iter().map(String::as_str).collect();
        assert_eq!(scanned, ["KSEA", "PAIR", "SEA"]);
        assert_eq!(routes.known("ASA1"), Some("PAIR-KSEA"));
        assert!(routes.is_known_pair("PAIR", "KSEA"));
    }
}
