use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

pub const DEFAULT_API: &str = "https://api.airplanes.live/v2/hex";

const TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("malformed response: {0}")]
    Body(#[from] serde_json::Error),
}

/// What the lookup API knows about an aircraft.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Aircraft {
    pub hex: String,
    pub flight: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Response {
    #[serde(default)]
    ac: Vec<Aircraft>,
}

/// Find the current callsign of aircraft from their hex addresses.
pub trait AircraftLookup: Send + Sync {
    fn lookup(
        &self,
        hexes: &[String],
    ) -> impl Future<Output = Result<Vec<Aircraft>, LookupError>> + Send;
}

/// Client of an ADS-B exchange style API, `GET {base}/{hex},{hex},...`
pub struct HttpLookup {
    client: reqwest::Client,
    base: String,
}

impl HttpLookup {
    pub fn new(base: &str) -> Result<Self, LookupError> {
        let client = reqwest::Client::builder()
            .timeout(TIMEOUT)
            .user_agent(concat!("jetroute/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(client, base))
    }

    pub fn with_client(client: reqwest::Client, base: &str) -> Self {
        HttpLookup {
            client,
            base: base.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, hexes: &[String]) -> String {
        format!("{}/{}", self.base, hexes.join(","))
    }
}

fn parse(body: &[u8]) -> Result<Vec<Aircraft>, LookupError> {
    let response: Response = serde_json::from_slice(body)?;
    Ok(response.ac)
}

impl AircraftLookup for HttpLookup {
    async fn lookup(&self, hexes: &[String]) -> Result<Vec<Aircraft>, LookupError> {
        let url = self.url(hexes);
        debug!("GET {}", url);
        let response = self.client.get(&url).send().await.map_err(|e| {
            warn!(url = %url, is_timeout = e.is_timeout(), "lookup failed: {}", e);
            e
        })?;
        if !response.status().is_success() {
            return Err(LookupError::Status(response.status().as_u16()));
        }
        let body = response.bytes().await?;
        parse(&body)
    }
}
