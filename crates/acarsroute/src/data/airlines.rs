use std::collections::HashMap;
use std::fmt::Display;

use csv::StringRecord;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use tracing::{debug, warn};

/// Grammar of a callsign, as described in the VRS standing data:
/// <https://github.com/vradarserver/standing-data/blob/main/routes/schema-01/README.md>
static CALLSIGN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<code>[A-Z]{2,3}|[A-Z][0-9]|[0-9][A-Z])(?P<number>[0-9]+[A-Z]*)$")
        .unwrap()
});

static LEADING_ZEROS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^0+([0-9].*)$").unwrap());

#[derive(Debug, Clone)]
pub struct Airline {
    pub code: String,
    pub name: String,
    pub icao: String,
    pub iata: String,
    /// Flight numbers used for positioning flights
    pub positioning: Option<Regex>,
    /// Flight numbers used for charter flights
    pub charter: Option<Regex>,
}

/// A callsign broken into an airline code and a flight number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Callsign {
    pub code: String,
    pub number: String,
}

impl Display for Callsign {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.code, self.number)
    }
}

#[derive(Debug, Default)]
pub struct Airlines {
    by_code: HashMap<String, Airline>,
    /// IATA code -> airline code (the first airline listed wins)
    by_iata: HashMap<String, String>,
}

fn pattern(code: &str, pattern: &str) -> Option<Regex> {
    if pattern.is_empty() {
        return None;
    }
    match RegexBuilder::new(pattern).case_insensitive(true).build() {
        Ok(re) => Some(re),
        Err(e) => {
            warn!("ignoring flight pattern {} for {}: {}", pattern, code, e);
            None
        }
    }
}

impl Airlines {
    pub fn from_airlines<I: IntoIterator<Item = Airline>>(airlines: I) -> Self {
        let mut table = Airlines::default();
        for airline in airlines {
            if !airline.iata.is_empty() {
                table
                    .by_iata
                    .entry(airline.iata.clone())
                    .or_insert_with(|| airline.code.clone());
            }
            table.by_code.insert(airline.code.clone(), airline);
        }
        table
    }

    pub(crate) fn from_rows(rows: Vec<StringRecord>) -> Self {
        Self::from_airlines(rows.iter().filter_map(|row| {
            let field = |i: usize| row.get(i).unwrap_or_default().trim();
            let code = field(0);
            if code.is_empty() {
                return None;
            }
            Some(Airline {
                code: code.to_string(),
                name: field(1).to_string(),
                icao: field(2).to_string(),
                iata: field(3).to_string(),
                positioning: pattern(code, field(4)),
                charter: pattern(code, field(5)),
            })
        }))
    }

    pub fn get(&self, code: &str) -> Option<&Airline> {
        self.by_code.get(code)
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }

    /// Break a callsign into airline code and flight number.
    ///
    /// IATA airline codes are replaced by the ICAO code of the airline when
    /// the airline is known, `NW` is read as `DAL`, and leading zeros are
    /// removed from the flight number.
    pub fn normalize(&self, callsign: &str) -> Option<Callsign> {
        let captures = CALLSIGN.captures(callsign.trim())?;
        let mut code = captures["code"].to_string();
        let mut number = captures["number"].to_string();

        if !self.by_code.contains_key(&code) {
            if let Some(airline) = self
                .by_iata
                .get(&code)
                .and_then(|code| self.by_code.get(code))
            {
                if !airline.icao.is_empty() {
                    code = airline.icao.clone();
                }
            }
            // Northwest merged into Delta, some crews still use the old code
            if code == "NW" {
                code = "DAL".to_string();
            }
        }
        if let Some(stripped) = LEADING_ZEROS.captures(&number) {
            number = stripped[1].to_string();
        }
        Some(Callsign { code, number })
    }

    /// Normalize a callsign and reject the ones we do not want to attribute
    /// routes to: unparsable callsigns, positioning and charter flights.
    pub fn validate(&self, callsign: &str) -> Option<String> {
        let normalized = self.normalize(callsign)?;
        if let Some(airline) = self.by_code.get(&normalized.code) {
            if let Some(re) = &airline.charter {
                if re.is_match(&normalized.number) {
                    debug!("{} matched charter pattern {}", callsign, re);
                    return None;
                }
            }
            if let Some(re) = &airline.positioning {
                if re.is_match(&normalized.number) {
                    debug!("{} matched positioning pattern {}", callsign, re);
                    return None;
                }
            }
        }
        Some(normalized.to_string())
    }
}
