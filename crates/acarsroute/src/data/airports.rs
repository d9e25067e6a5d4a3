use std::collections::HashMap;

use csv::StringRecord;

/// ICAO (4-letter) and IATA (3-letter) airport codes, and the mapping of
/// any code to the canonical code used in route strings.
#[derive(Debug, Default, Clone)]
pub struct Airports {
    to_iata: HashMap<String, String>,
    to_icao: HashMap<String, String>,
    canonical: HashMap<String, String>,
}

impl Airports {
    /// Build the tables from `(icao, iata)` pairs. IATA codes canonicalize
    /// to their ICAO counterpart, ICAO codes are kept as they are.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: Into<String>,
    {
        let mut airports = Airports::default();
        for (icao, iata) in pairs {
            let (icao, iata) = (icao.into(), iata.into());
            if icao.is_empty() {
                continue;
            }
            if !iata.is_empty() {
                airports.to_iata.insert(icao.clone(), iata.clone());
                airports.canonical.insert(iata.clone(), icao.clone());
                airports.to_icao.insert(iata, icao);
            }
        }
        airports
    }

    pub(crate) fn from_rows(rows: Vec<StringRecord>) -> Self {
        Self::from_pairs(rows.iter().filter_map(|row| {
            Some((row.get(2)?.trim(), row.get(3)?.trim()))
        }))
    }

    /// Override the canonical form of a code.
    pub fn with_canonical(mut self, code: &str, canonical: &str) -> Self {
        self.canonical
            .insert(code.to_string(), canonical.to_string());
        self
    }

    pub fn canonical<'a>(&'a self, code: &'a str) -> &'a str {
        self.canonical.get(code).map_or(code, String::as_str)
    }

    pub fn iata(&self, icao: &str) -> Option<&str> {
        self.to_iata.get(icao).map(String::as_str)
    }

    pub fn icao(&self, iata: &str) -> Option<&str> {
        self.to_icao.get(iata).map(String::as_str)
    }

    /// Number of airports with both an ICAO and an IATA code
    pub fn len(&self) -> usize {
        self.to_iata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_iata.is_empty()
    }
}
