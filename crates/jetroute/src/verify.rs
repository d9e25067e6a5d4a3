use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use acarsroute::prelude::*;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::cache::CallsignCache;
use crate::lookup::AircraftLookup;
use crate::ratelimit::RateLimiter;
use crate::store::{Store, StoreError};

/// Name of the work queue in the store
pub const QUEUE: &str = "jetroute:verify";

#[derive(Debug, Clone)]
pub struct Settings {
    pub queue: String,
    /// Time between two polling cycles
    pub interval: Duration,
    /// Maximum number of work items per cycle
    pub batch: usize,
    /// Minimum time between two calls to the lookup API
    pub spacing: Duration,
    /// Lifetime of verified routes and of looked up callsigns
    pub ttl: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            queue: QUEUE.to_string(),
            interval: Duration::from_secs(5),
            batch: 20,
            spacing: Duration::from_secs(5),
            ttl: Duration::from_secs(15 * 60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The callsign has no known route
    UnknownCallsign,
    /// The route is not among the known routes of the callsign
    Mismatch { known: String },
    Confirmed,
}

/// What happened during one cycle, mostly for logging.
#[derive(Debug, Default)]
pub struct Report {
    pub popped: usize,
    pub duplicates: usize,
    pub malformed: usize,
    /// Already verified with the same route
    pub settled: usize,
    /// Failed reads and writes of verified routes
    pub store_errors: usize,
    /// Whether the lookup API was called
    pub looked_up: bool,
    /// No callsign found for the hex address, dropped
    pub unresolved: Vec<WorkItem>,
    /// The callsign reported by the lookup API and the outcome
    pub verified: Vec<(WorkItem, String, Outcome)>,
}

/// Background task checking escalated routes against the callsign the
/// aircraft actually broadcasts.
pub struct VerificationWorker<S, L> {
    store: Arc<S>,
    lookup: L,
    reference: Arc<Reference>,
    limiter: RateLimiter,
    callsigns: CallsignCache,
    settings: Settings,
}

impl<S: Store, L: AircraftLookup> VerificationWorker<S, L> {
    pub fn new(store: Arc<S>, lookup: L, reference: Arc<Reference>, settings: Settings) -> Self {
        VerificationWorker {
            store,
            lookup,
            reference,
            limiter: RateLimiter::new(settings.spacing),
            callsigns: CallsignCache::new(settings.ttl),
            settings,
        }
    }

    /// Poll the queue forever.
    pub async fn run(mut self) {
        info!(
            "verification worker polling {} every {:?}",
            self.settings.queue, self.settings.interval
        );
        let mut ticker = tokio::time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.cycle().await {
                Ok(report) if report.popped > 0 => debug!(
                    popped = report.popped,
                    duplicates = report.duplicates,
                    malformed = report.malformed,
                    settled = report.settled,
                    store_errors = report.store_errors,
                    looked_up = report.looked_up,
                    verified = report.verified.len(),
                    unresolved = report.unresolved.len(),
                    callsigns = self.callsigns.len(),
                    "verification cycle"
                ),
                Ok(_) => {}
                Err(e) => warn!("verification cycle failed: {}", e),
            }
            self.callsigns.prune();
        }
    }

    /// Process one batch of work items.
    ///
    /// Only a failure to pop from the queue is an error: once items are
    /// popped, store failures are logged and every item is still verified.
    pub async fn cycle(&mut self) -> Result<Report, StoreError> {
        let payloads = self
            .store
            .pop(&self.settings.queue, self.settings.batch)
            .await?;
        let mut report = Report {
            popped: payloads.len(),
            ..Report::default()
        };

        let mut seen = HashSet::new();
        let mut items = Vec::new();
        for payload in payloads {
            if !seen.insert(payload.clone()) {
                report.duplicates += 1;
                continue;
            }
            match serde_json::from_str::<WorkItem>(&payload) {
                Ok(item) => items.push(item),
                Err(e) => {
                    debug!("malformed work item {:?}: {}", payload, e);
                    report.malformed += 1;
                }
            }
        }

        let mut pending = Vec::new();
        for item in items {
            match self.store.get(&item.key()).await {
                Ok(Some(route)) if route == item.route => {
                    debug!("{} -> {} : already verified", item.key(), item.route);
                    report.settled += 1;
                }
                Ok(Some(route)) => {
                    debug!("{} : route changed from {} to {}", item.key(), route, item.route);
                    pending.push(item);
                }
                Ok(None) => pending.push(item),
                // verified again at worst
                Err(e) => {
                    warn!("cannot read verified route of {}: {}", item.key(), e);
                    report.store_errors += 1;
                    pending.push(item);
                }
            }
        }

        let hexes: BTreeSet<String> = pending
            .iter()
            .map(|item| item.hex.to_uppercase())
            .filter(|hex| self.callsigns.needs_lookup(hex))
            .collect();
        if !hexes.is_empty() {
            let hexes: Vec<String> = hexes.into_iter().collect();
            let aircraft = {
                let _permit = self.limiter.acquire().await;
                match self.lookup.lookup(&hexes).await {
                    Ok(aircraft) => aircraft,
                    Err(e) => {
                        warn!("lookup of {} aircraft failed: {}", hexes.len(), e);
                        Vec::new()
                    }
                }
            };
            report.looked_up = true;
            for entry in &aircraft {
                if let Some(flight) = &entry.flight {
                    self.callsigns.insert(&entry.hex, flight);
                }
            }
        }

        for item in pending {
            let Some(current) = self.callsigns.get(&item.hex).map(str::to_string) else {
                info!("hex:{} no callsign, dropping {} -> {}", item.hex, item.callsign, item.route);
                report.unresolved.push(item);
                continue;
            };
            let outcome = self.verify(&current, &item.route);
            match &outcome {
                Outcome::UnknownCallsign => {
                    info!("{} -> {} : unknown callsign", current, item.route)
                }
                Outcome::Mismatch { known } => {
                    info!("{} -> {} : does not match {}", current, item.route, known)
                }
                Outcome::Confirmed => info!("{} -> {} : confirmed", current, item.route),
            }
            if let Err(e) = self
                .store
                .set_ex(&item.key(), item.route.clone(), self.settings.ttl)
                .await
            {
                warn!("cannot save verified route {} -> {}: {}", item.key(), item.route, e);
                report.store_errors += 1;
            }
            report.verified.push((item, current, outcome));
        }

        Ok(report)
    }

    /// Compare a route with what is known of the callsign.
    fn verify(&self, callsign: &str, route: &str) -> Outcome {
        let callsign = self
            .reference
            .airlines
            .normalize(callsign)
            .map_or_else(|| callsign.to_string(), |c| c.to_string());
        let routes = &self.reference.routes;
        let Some(known) = routes.known(&callsign) else {
            return Outcome::UnknownCallsign;
        };
        let matches = match route.split_once('-') {
            Some((origin, destination)) => routes.contains(&callsign, origin, destination),
            None => known.split('|').any(|known| known == route),
        };
        if matches {
            Outcome::Confirmed
        } else {
            Outcome::Mismatch {
                known: known.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::{Aircraft, LookupError};
    use crate::store::MemoryStore;
    use acarsroute::data::{Airline, Airlines, Airports, Routes};
    use std::sync::Mutex;
    use tokio::time::Instant;

    type Calls = Arc<Mutex<Vec<(Instant, Vec<String>)>>>;

    #[derive(Default)]
    struct Mock {
        aircraft: Vec<Aircraft>,
        fail: bool,
        calls: Calls,
    }

    impl AircraftLookup for Mock {
        async fn lookup(&self, hexes: &[String]) -> Result<Vec<Aircraft>, LookupError> {
            self.calls
                .lock()
                .unwrap()
                .push((Instant::now(), hexes.to_vec()));
            if self.fail {
                return Err(LookupError::Status(503));
            }
            Ok(self.aircraft.clone())
        }
    }

    fn aircraft(hex: &str, flight: &str) -> Aircraft {
        Aircraft {
            hex: hex.to_string(),
            flight: Some(flight.to_string()),
        }
    }

    fn reference() -> Arc<Reference> {
        let airports = Airports::from_pairs([("KPDX", "PDX"), ("KSEA", "SEA"), ("KSLC", "SLC")])
            .with_canonical("KPDX", "PDX")
            .with_canonical("KSEA", "SEA");
        let airlines = Airlines::from_airlines([Airline {
            code: "DAL".to_string(),
            name: "Delta Air Lines".to_string(),
            icao: "DAL".to_string(),
            iata: "DL".to_string(),
            positioning: None,
            charter: None,
        }]);
        let routes = Routes::from_routes([("ASA1", "KPDX-KSEA"), ("DAL456", "KSEA-KSLC")], &airports);
        Arc::new(Reference::new(airports, airlines, routes))
    }

    fn settings() -> Settings {
        Settings {
            spacing: Duration::from_millis(100),
            ..Settings::default()
        }
    }

    fn item(callsign: &str, hex: &str, route: &str) -> WorkItem {
        WorkItem {
            callsign: callsign.to_string(),
            hex: hex.to_string(),
            route: route.to_string(),
        }
    }

    async fn enqueue(store: &MemoryStore, item: &WorkItem) {
        store
            .push(QUEUE, serde_json::to_string(item).unwrap())
            .await
            .unwrap();
    }

    /// A store whose reads and writes of verified routes fail a number
    /// of times before reaching the memory store.
    #[derive(Default)]
    struct Flaky {
        inner: MemoryStore,
        get_failures: Mutex<usize>,
        set_failures: Mutex<usize>,
    }

    fn failed(counter: &Mutex<usize>) -> Result<(), StoreError> {
        let mut left = counter.lock().unwrap();
        if *left == 0 {
            return Ok(());
        }
        *left -= 1;
        Err(redis::RedisError::from((redis::ErrorKind::IoError, "connection reset")).into())
    }

    impl Store for Flaky {
        async fn push(&self, list: &str, value: String) -> Result<(), StoreError> {
            self.inner.push(list, value).await
        }

        async fn pop(&self, list: &str, count: usize) -> Result<Vec<String>, StoreError> {
            self.inner.pop(list, count).await
        }

        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            failed(&self.get_failures)?;
            self.inner.get(key).await
        }

        async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
            failed(&self.set_failures)?;
            self.inner.set_ex(key, value, ttl).await
        }
    }

    #[tokio::test]
    async fn test_end_to_end() {
        let reference = reference();
        let handler = RecordHandler::from_reference(reference.clone()).unwrap();
        let record = serde_json::json!({
            "vdl2": {"avlc": {
                "src": {"addr": "A1B2C3", "type": "Aircraft"},
                "acars": {"flight": "DAL123", "label": "H1", "msg_text": "KPDXKSEA"}
            }}
        });
        let Verdict::Escalate(escalated) = handler.handle(record.to_string().as_bytes()) else {
            panic!("expected an escalation");
        };
        assert_eq!(escalated, item("DAL123", "A1B2C3", "PDX-SEA"));

        let store = Arc::new(MemoryStore::new());
        enqueue(&store, &escalated).await;
        let mock = Mock {
            aircraft: vec![aircraft("a1b2c3", "DAL123  ")],
            ..Mock::default()
        };
        let calls = mock.calls.clone();
        let mut worker = VerificationWorker::new(store.clone(), mock, reference, settings());
        let report = worker.cycle().await.unwrap();

        assert_eq!(calls.lock().unwrap().len(), 1);
        assert_eq!(calls.lock().unwrap()[0].1, ["A1B2C3"]);
        assert_eq!(
            report.verified,
            [(escalated, "DAL123".to_string(), Outcome::UnknownCallsign)]
        );
        assert_eq!(
            store.get("DAL123-A1B2C3").await.unwrap().as_deref(),
            Some("PDX-SEA")
        );
        let ttl = store.expires_in("DAL123-A1B2C3").unwrap();
        assert!(ttl > Duration::from_secs(890) && ttl <= Duration::from_secs(900));
        assert_eq!(store.len(QUEUE), 0);
    }

    #[tokio::test]
    async fn test_already_verified() {
        let store = Arc::new(MemoryStore::new());
        store
            .set_ex("DAL123-A1B2C3", "PDX-SEA".to_string(), Duration::from_secs(900))
            .await
            .unwrap();
        enqueue(&store, &item("DAL123", "A1B2C3", "PDX-SEA")).await;
        let mock = Mock::default();
        let calls = mock.calls.clone();
        let mut worker = VerificationWorker::new(store, mock, reference(), settings());
        let report = worker.cycle().await.unwrap();

        assert!(calls.lock().unwrap().is_empty());
        assert_eq!(report.settled, 1);
        assert!(!report.looked_up);
        assert!(report.verified.is_empty());
    }

    #[tokio::test]
    async fn test_route_changed() {
        let store = Arc::new(MemoryStore::new());
        store
            .set_ex("DAL456-A1B2C3", "PDX-SEA".to_string(), Duration::from_secs(900))
            .await
            .unwrap();
        enqueue(&store, &item("DAL456", "A1B2C3", "SEA-KSLC")).await;
        let mock = Mock {
            aircraft: vec![aircraft("A1B2C3", "DL0456")],
            ..Mock::default()
        };
        let mut worker = VerificationWorker::new(store.clone(), mock, reference(), settings());
        let report = worker.cycle().await.unwrap();

        assert_eq!(report.settled, 0);
        assert_eq!(report.verified.len(), 1);
        // DL0456 is DAL456, known for SEA-KSLC
        assert_eq!(report.verified[0].1, "DL0456");
        assert_eq!(report.verified[0].2, Outcome::Confirmed);
        assert_eq!(
            store.get("DAL456-A1B2C3").await.unwrap().as_deref(),
            Some("SEA-KSLC")
        );
    }

    #[tokio::test]
    async fn test_mismatch() {
        let store = Arc::new(MemoryStore::new());
        enqueue(&store, &item("DAL456", "A1B2C3", "PDX-SEA")).await;
        let mock = Mock {
            aircraft: vec![aircraft("A1B2C3", "DAL456")],
            ..Mock::default()
        };
        let mut worker = VerificationWorker::new(store.clone(), mock, reference(), settings());
        let report = worker.cycle().await.unwrap();

        assert_eq!(
            report.verified[0].2,
            Outcome::Mismatch {
                known: "SEA-KSLC".to_string()
            }
        );
        // cached anyway, so that it is not escalated again
        assert_eq!(
            store.get("DAL456-A1B2C3").await.unwrap().as_deref(),
            Some("PDX-SEA")
        );
    }

    #[tokio::test]
    async fn test_duplicates() {
        let store = Arc::new(MemoryStore::new());
        for _ in 0..3 {
            enqueue(&store, &item("DAL123", "A1B2C3", "PDX-SEA")).await;
        }
        enqueue(&store, &item("ASA1", "AB0001", "PDX-SEA")).await;
        store.push(QUEUE, "{not json".to_string()).await.unwrap();
        let mock = Mock {
            aircraft: vec![aircraft("A1B2C3", "DAL123"), aircraft("AB0001", "ASA1")],
            ..Mock::default()
        };
        let calls = mock.calls.clone();
        let mut worker = VerificationWorker::new(store, mock, reference(), settings());
        let report = worker.cycle().await.unwrap();

        assert_eq!(report.popped, 5);
        assert_eq!(report.duplicates, 2);
        assert_eq!(report.malformed, 1);
        assert_eq!(report.verified.len(), 2);
        assert_eq!(report.verified[1].2, Outcome::Confirmed);
        // one call for both aircraft
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, ["A1B2C3", "AB0001"]);
    }

    #[tokio::test]
    async fn test_batch_size() {
        let store = Arc::new(MemoryStore::new());
        for i in 0..25 {
            enqueue(&store, &item(&format!("DAL{}", i + 1), "A1B2C3", "PDX-SEA")).await;
        }
        let mut worker = VerificationWorker::new(store.clone(), Mock::default(), reference(), settings());
        let report = worker.cycle().await.unwrap();
        assert_eq!(report.popped, 20);
        assert_eq!(store.len(QUEUE), 5);
    }

    #[tokio::test]
    async fn test_lookup_failure() {
        let store = Arc::new(MemoryStore::new());
        enqueue(&store, &item("DAL123", "A1B2C3", "PDX-SEA")).await;
        let mock = Mock {
            fail: true,
            ..Mock::default()
        };
        let mut worker = VerificationWorker::new(store.clone(), mock, reference(), settings());
        let report = worker.cycle().await.unwrap();

        assert!(report.looked_up);
        assert_eq!(report.unresolved.len(), 1);
        assert!(report.verified.is_empty());
        // dropped, neither requeued nor cached
        assert_eq!(store.len(QUEUE), 0);
        assert_eq!(store.get("DAL123-A1B2C3").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_rate_limit() {
        let store = Arc::new(MemoryStore::new());
        let mock = Mock::default();
        let calls = mock.calls.clone();
        let settings = settings();
        let spacing = settings.spacing;
        let mut worker = VerificationWorker::new(store.clone(), mock, reference(), settings);

        // nothing is ever resolved, so every cycle calls the API
        for hex in ["A1B2C3", "AB0001", "AB0002"] {
            enqueue(&store, &item("DAL123", hex, "PDX-SEA")).await;
            worker.cycle().await.unwrap();
        }
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        for pair in calls.windows(2) {
            assert!(pair[1].0 - pair[0].0 >= spacing);
        }
    }

    #[tokio::test]
    async fn test_callsign_cache() {
        let store = Arc::new(MemoryStore::new());
        let mock = Mock {
            aircraft: vec![aircraft("A1B2C3", "DAL123")],
            ..Mock::default()
        };
        let calls = mock.calls.clone();
        let mut worker = VerificationWorker::new(store.clone(), mock, reference(), settings());

        enqueue(&store, &item("DAL123", "A1B2C3", "PDX-SEA")).await;
        worker.cycle().await.unwrap();
        enqueue(&store, &item("DAL123", "A1B2C3", "PDX-SLC")).await;
        let report = worker.cycle().await.unwrap();

        assert_eq!(calls.lock().unwrap().len(), 1);
        assert!(!report.looked_up);
        assert_eq!(report.verified.len(), 1);
    }

    #[tokio::test]
    async fn test_store_read_failure() {
        let store = Arc::new(Flaky {
            get_failures: Mutex::new(1),
            ..Flaky::default()
        });
        for (callsign, hex) in [("DAL123", "A1B2C3"), ("DAL456", "AB0001"), ("ASA1", "AB0002")] {
            store
                .push(QUEUE, serde_json::to_string(&item(callsign, hex, "PDX-SEA")).unwrap())
                .await
                .unwrap();
        }
        let mock = Mock {
            aircraft: vec![
                aircraft("A1B2C3", "DAL123"),
                aircraft("AB0001", "DAL456"),
                aircraft("AB0002", "ASA1"),
            ],
            ..Mock::default()
        };
        let mut worker = VerificationWorker::new(store.clone(), mock, reference(), settings());
        let report = worker.cycle().await.unwrap();

        assert_eq!(report.store_errors, 1);
        assert_eq!(report.verified.len(), 3);
        for key in ["DAL123-A1B2C3", "DAL456-AB0001", "ASA1-AB0002"] {
            assert_eq!(store.inner.get(key).await.unwrap().as_deref(), Some("PDX-SEA"));
        }
    }

    #[tokio::test]
    async fn test_store_write_failure() {
        let store = Arc::new(Flaky {
            set_failures: Mutex::new(1),
            ..Flaky::default()
        });
        for hex in ["A1B2C3", "AB0001"] {
            store
                .push(QUEUE, serde_json::to_string(&item("DAL123", hex, "PDX-SEA")).unwrap())
                .await
                .unwrap();
        }
        let mock = Mock {
            aircraft: vec![aircraft("A1B2C3", "DAL123"), aircraft("AB0001", "DAL123")],
            ..Mock::default()
        };
        let mut worker = VerificationWorker::new(store.clone(), mock, reference(), settings());
        let report = worker.cycle().await.unwrap();

        assert_eq!(report.store_errors, 1);
        assert_eq!(report.verified.len(), 2);
        assert_eq!(store.inner.get("DAL123-A1B2C3").await.unwrap(), None);
        assert_eq!(
            store.inner.get("DAL123-AB0001").await.unwrap().as_deref(),
            Some("PDX-SEA")
        );
    }
}
