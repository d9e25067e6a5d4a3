//! Reference tables, loaded once at startup from the VRS standing data
//! (<https://github.com/vradarserver/standing-data>).
//!
//! The expected layout below the data directory is:
//!
//! - `airports/schema-01/**/*.csv`: `Code,Name,ICAO,IATA,...`
//! - `airlines/schema-01/**/*.csv`: `Code,Name,ICAO,IATA,PositioningFlightPattern,CharterFlightPattern`
//! - `routes/schema-01/**/*.csv`: `Callsign,Code,Number,AirlineCode,AirportCodes`
//!
//! A missing table is not an error: it is reported and left empty, which
//! only degrades the quality of the matching.

pub mod airlines;
pub mod airports;
pub mod routes;

use std::path::{Path, PathBuf};

use csv::StringRecord;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::Error;

pub use airlines::{Airline, Airlines, Callsign};
pub use airports::Airports;
pub use routes::Routes;

/// All the read-only lookup tables used by the record handler and the
/// verification worker.
#[derive(Debug, Default)]
pub struct Reference {
    pub airports: Airports,
    pub airlines: Airlines,
    pub routes: Routes,
}

impl Reference {
    pub fn new(airports: Airports, airlines: Airlines, routes: Routes) -> Self {
        Reference {
            airports,
            airlines,
            routes,
        }
    }

    pub fn load<P: AsRef<Path>>(dir: P) -> Reference {
        let dir = dir.as_ref();
        let airports = Airports::from_rows(table(dir, "airports"));
        let airlines = Airlines::from_rows(table(dir, "airlines"));
        let routes = Routes::from_rows(table(dir, "routes"), &airports);
        info!(
            "loaded {} airports, {} airlines, {} routes ({} route airports, {} route pairs)",
            airports.len(),
            airlines.len(),
            routes.len(),
            routes.airports().len(),
            routes.pairs_len(),
        );
        Reference::new(airports, airlines, routes)
    }

    /// Validate a raw callsign, see [`Airlines::validate`].
    pub fn callsign(&self, raw: &str) -> Option<String> {
        self.airlines.validate(raw)
    }
}

/// All rows of all csv files for one table, logging (and skipping) what
/// cannot be read.
fn table(dir: &Path, name: &str) -> Vec<StringRecord> {
    let root = dir.join(name).join("schema-01");
    if !root.is_dir() {
        warn!("{} not found, {} table left empty", root.display(), name);
        return Vec::new();
    }
    let mut rows = Vec::new();
    for path in csv_files(&root) {
        match read_rows(&path) {
            Ok(mut records) => rows.append(&mut records),
            Err(e) => warn!("{}", e),
        }
    }
    rows
}

fn csv_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "csv"))
        .collect();
    files.sort();
    files
}

pub(crate) fn read_rows(path: &Path) -> Result<Vec<StringRecord>, Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|source| Error::Csv {
            path: path.to_path_buf(),
            source,
        })?;
    reader
        .records()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| Error::Csv {
            path: path.to_path_buf(),
            source,
        })
}
