use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Last known callsign of each aircraft, keyed by hex address.
///
/// This cache lives in the worker only: it is not shared between
/// processes, so several workers may look up the same aircraft.
#[derive(Debug)]
pub struct CallsignCache {
    ttl: Duration,
    entries: HashMap<String, (String, Instant)>,
}

fn normalize_hex(hex: &str) -> String {
    hex.trim().to_uppercase()
}

impl CallsignCache {
    pub fn new(ttl: Duration) -> Self {
        CallsignCache {
            ttl,
            entries: HashMap::new(),
        }
    }

    /// The cached callsign, if it has not expired yet.
    pub fn get(&self, hex: &str) -> Option<&str> {
        self.entries
            .get(&normalize_hex(hex))
            .filter(|(_, until)| *until > Instant::now())
            .map(|(callsign, _)| callsign.as_str())
    }

    pub fn needs_lookup(&self, hex: &str) -> bool {
        self.get(hex).is_none()
    }

    /// Store a callsign reported for `hex`, with a fresh expiry time.
    /// Blank callsigns are ignored.
    pub fn insert(&mut self, hex: &str, callsign: &str) {
        let callsign = callsign.trim().to_uppercase();
        if callsign.is_empty() {
            return;
        }
        self.entries
            .insert(normalize_hex(hex), (callsign, Instant::now() + self.ttl));
    }

    /// Forget expired entries
    pub fn prune(&mut self) {
        let now = Instant::now();
        self.entries.retain(|_, (_, until)| *until > now);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
