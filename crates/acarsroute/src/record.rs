//! Records as produced by dumpvdl2 in JSON mode, and what to do with them.
//!
//! Only the `vdl2.avlc` part of a record is considered: its raw JSON text
//! is what airport codes are searched in, the link layer source address
//! identifies the aircraft and the ACARS payload carries the callsign.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::Value;
use tracing::{debug, info};

use crate::data::Reference;
use crate::route::scanner::AirportScanner;
use crate::route::{infer, ResolvedRoute};

#[derive(Debug, Deserialize)]
pub struct Record {
    pub vdl2: Option<Vdl2>,
}

#[derive(Debug, Deserialize)]
pub struct Vdl2 {
    pub avlc: Option<Box<RawValue>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Avlc {
    pub src: Option<Station>,
    pub acars: Option<Acars>,
    pub xid: Option<Xid>,
}

#[derive(Debug, Deserialize)]
pub struct Station {
    pub addr: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Acars {
    pub flight: Option<String>,
    pub label: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Xid {
    pub vdl_params: Option<Value>,
}

impl Avlc {
    pub fn hex(&self) -> Option<&str> {
        self.src
            .as_ref()?
            .addr
            .as_deref()
            .map(str::trim)
            .filter(|addr| !addr.is_empty())
    }

    pub fn flight(&self) -> Option<&str> {
        self.acars.as_ref()?.flight.as_deref().map(str::trim)
    }

    pub fn label(&self) -> Option<&str> {
        self.acars.as_ref()?.label.as_deref()
    }

    /// The destination airport declared in the XID parameters, if any.
    ///
    /// Parameters come either as an object (`{"dst_airport": "KSEA"}`) or
    /// as a list of `{"name": ..., "value": ...}` entries.
    pub fn declared_destination(&self) -> Option<&str> {
        match self.xid.as_ref()?.vdl_params.as_ref()? {
            Value::Object(params) => params.get("dst_airport")?.as_str(),
            Value::Array(params) => params
                .iter()
                .find(|p| p.get("name").and_then(Value::as_str) == Some("dst_airport"))?
                .get("value")?
                .as_str(),
            _ => None,
        }
    }
}

/// Who sent a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlightIdentity {
    pub hex: String,
    pub raw_callsign: Option<String>,
    /// Only set if the raw callsign is valid
    pub callsign: Option<String>,
}

/// A route to verify, as pushed on the work queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkItem {
    pub callsign: String,
    pub hex: String,
    /// `ORIGIN-DESTINATION`, with canonical codes
    pub route: String,
}

impl WorkItem {
    /// Key of the verified route cache for this flight
    pub fn key(&self) -> String {
        format!("{}-{}", self.callsign, self.hex)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Malformed,
    NotVdl2,
    MissingHex,
    MissingCallsign,
    InvalidCallsign,
}

/// What became of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The record could not be attributed to a flight
    Dropped(DropReason),
    /// No airport pair in the text
    NoRoute(FlightIdentity),
    /// Airport pairs were found, but none is part of a known route
    Implausible(FlightIdentity, Vec<ResolvedRoute>),
    /// More than one plausible route
    Ambiguous(FlightIdentity, Vec<ResolvedRoute>),
    /// The route is already known for this callsign
    Confirmed(WorkItem),
    /// The route must be verified
    Escalate(WorkItem),
}

pub struct RecordHandler {
    scanner: AirportScanner,
    reference: Arc<Reference>,
    showtime: bool,
}

impl RecordHandler {
    pub fn new(scanner: AirportScanner, reference: Arc<Reference>) -> Self {
        RecordHandler {
            scanner,
            reference,
            showtime: false,
        }
    }

    /// Build the scanner over the airports of all known routes.
    pub fn from_reference(reference: Arc<Reference>) -> Result<Self, crate::Error> {
        let scanner = AirportScanner::new(reference.routes.airports())?;
        Ok(Self::new(scanner, reference))
    }

    /// Report the time spent looking for routes in each record
    pub fn with_showtime(mut self, showtime: bool) -> Self {
        self.showtime = showtime;
        self
    }

    pub fn handle(&self, bytes: &[u8]) -> Verdict {
        let record: Record = match serde_json::from_slice(bytes) {
            Ok(record) => record,
            Err(e) => {
                debug!("cannot parse record: {} -- {}", e, String::from_utf8_lossy(bytes));
                return Verdict::Dropped(DropReason::Malformed);
            }
        };
        let Some(raw) = record.vdl2.and_then(|vdl2| vdl2.avlc) else {
            return Verdict::Dropped(DropReason::NotVdl2);
        };
        let avlc: Avlc = match serde_json::from_str(raw.get()) {
            Ok(avlc) => avlc,
            Err(e) => {
                debug!("unexpected avlc content: {}", e);
                return Verdict::Dropped(DropReason::Malformed);
            }
        };
        debug!("--> {}", raw.get());

        let Some(hex) = avlc.hex() else {
            return Verdict::Dropped(DropReason::MissingHex);
        };
        let Some(flight) = avlc.flight() else {
            debug!("hex:{} no callsign", hex);
            return Verdict::Dropped(DropReason::MissingCallsign);
        };
        let Some(callsign) = self.reference.callsign(flight) else {
            debug!("hex:{} invalid callsign {}", hex, flight);
            return Verdict::Dropped(DropReason::InvalidCallsign);
        };
        let identity = FlightIdentity {
            hex: hex.to_uppercase(),
            raw_callsign: Some(flight.to_string()),
            callsign: Some(callsign.clone()),
        };

        let now = Instant::now();
        let routes = self.routes(raw.get());
        if self.showtime {
            info!("checked in {:?}", now.elapsed());
        }
        if routes.is_empty() {
            return Verdict::NoRoute(identity);
        }

        let airports = &self.reference.airports;
        let mut plausible: Vec<ResolvedRoute> = Vec::new();
        for route in &routes {
            let route = ResolvedRoute {
                origin: airports.canonical(&route.origin).to_string(),
                destination: airports.canonical(&route.destination).to_string(),
            };
            if self.reference.routes.is_known_pair(&route.origin, &route.destination)
                && !plausible.contains(&route)
            {
                plausible.push(route);
            }
        }

        let context = Context(&avlc);
        match plausible.len() {
            0 => {
                debug!("{}: unlikely route {:?}{}", callsign, routes, context);
                Verdict::Implausible(identity, routes)
            }
            1 => {
                let route = plausible.remove(0);
                let known = self
                    .reference
                    .routes
                    .contains(&callsign, &route.origin, &route.destination);
                let item = WorkItem {
                    callsign,
                    hex: identity.hex,
                    route: route.to_string(),
                };
                if known {
                    debug!("{} -> {} : confirmed{}", item.callsign, item.route, context);
                    Verdict::Confirmed(item)
                } else {
                    debug!("{} -> {} : to verify{}", item.callsign, item.route, context);
                    Verdict::Escalate(item)
                }
            }
            _ => {
                info!("{}: ambiguous routes {:?}{}", callsign, plausible, context);
                Verdict::Ambiguous(identity, plausible)
            }
        }
    }

    /// Scan a text and pair the airport codes found.
    pub fn routes(&self, text: &str) -> Vec<ResolvedRoute> {
        infer::resolve(text, &self.scanner.scan(text))
    }
}

/// Extra information for log lines
struct Context<'a>(&'a Avlc);

impl std::fmt::Display for Context<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(destination) = self.0.declared_destination() {
            write!(f, " declared destination: {}", destination)?;
        }
        if let Some(label) = self.0.label() {
            write!(f, " from label {}", label)?;
        }
        Ok(())
    }
}
