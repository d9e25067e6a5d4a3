#![doc = include_str!("../readme.md")]

mod cache;
mod lookup;
mod ratelimit;
mod store;
mod verify;

use std::error::Error;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use acarsroute::prelude::*;
use acarsroute::source::{records, tcp};
use clap::{ArgAction, Command, CommandFactory, Parser, ValueHint};
use clap_complete::{generate, Generator, Shell};
use futures_util::pin_mut;
use serde::Deserialize;
use tokio::fs;
use tokio::io::AsyncRead;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use lookup::{AircraftLookup, HttpLookup, DEFAULT_API};
use store::{MemoryStore, RedisStore, Store};
use verify::{Settings, VerificationWorker};

const DEFAULT_PORT: u16 = 15555;
const DEFAULT_DATA: &str = "./standing-data";

#[derive(Debug, Default, Deserialize, Parser)]
#[command(
    name = "jetroute",
    version,
    about = "Infer flight routes from ACARS/VDL2 messages and verify them"
)]
#[serde(default)]
struct Options {
    /// Host of the JSON feed (standard input is read if not set)
    #[arg(long, value_hint = ValueHint::Hostname)]
    host: Option<String>,

    /// Port of the JSON feed (default: 15555)
    #[arg(long)]
    port: Option<u16>,

    /// More details in the logs (-v, -vv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Report the time spent preparing and checking records
    #[arg(long, default_value = "false")]
    showtime: bool,

    /// The feed sends one JSON record per line
    #[arg(long, default_value = "false")]
    lines: bool,

    /// Directory of the VRS standing data (default: ./standing-data)
    #[arg(long, value_hint = ValueHint::DirPath)]
    data: Option<PathBuf>,

    /// Redis URL for the work queue and the verified routes
    /// (kept in memory if not set)
    #[arg(long, value_hint = ValueHint::Url)]
    redis: Option<String>,

    /// Base URL of the aircraft lookup API
    #[arg(long, value_hint = ValueHint::Url)]
    api: Option<String>,

    /// Seconds between two polls of the work queue
    #[arg(long)]
    interval: Option<u64>,

    /// Maximum number of work items per poll
    #[arg(long)]
    batch: Option<usize>,

    /// Shell completion generation
    #[arg(long = "completion", value_enum)]
    #[serde(skip)]
    completion: Option<Shell>,
}

impl Options {
    /// Command line arguments take precedence over the configuration file.
    fn merge(&mut self, cli: Options) {
        if cli.host.is_some() {
            self.host = cli.host;
        }
        if cli.port.is_some() {
            self.port = cli.port;
        }
        self.verbose = self.verbose.max(cli.verbose);
        self.showtime |= cli.showtime;
        self.lines |= cli.lines;
        if cli.data.is_some() {
            self.data = cli.data;
        }
        if cli.redis.is_some() {
            self.redis = cli.redis;
        }
        if cli.api.is_some() {
            self.api = cli.api;
        }
        if cli.interval.is_some() {
            self.interval = cli.interval;
        }
        if cli.batch.is_some() {
            self.batch = cli.batch;
        }
    }

    fn settings(&self) -> Settings {
        let default = Settings::default();
        Settings {
            interval: self
                .interval
                .map_or(default.interval, Duration::from_secs),
            batch: self.batch.unwrap_or(default.batch),
            ..default
        }
    }

    fn filter(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Load environment variables from a .env file
    dotenv::dotenv().ok();

    let mut options = Options::default();

    let mut cfg_path = dirs::config_dir().unwrap_or_default();
    cfg_path.push("jetroute");
    cfg_path.push("config.toml");

    if cfg_path.exists() {
        let string = fs::read_to_string(cfg_path).await?;
        options = toml::from_str(&string)?;
    }

    if let Ok(config_file) = std::env::var("JETROUTE_CONFIG") {
        let string = fs::read_to_string(config_file).await?;
        options = toml::from_str(&string)?;
    }

    let cli_options = Options::parse();

    // Generate completion instructions
    if let Some(generator) = cli_options.completion {
        let mut cmd = Options::command();
        print_completions(generator, &mut cmd);
        return Ok(());
    }

    options.merge(cli_options);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(options.filter())),
        )
        .init();

    let data = options.data.clone().unwrap_or_else(|| DEFAULT_DATA.into());
    let reference = Arc::new(Reference::load(&data));

    let codes = reference.routes.airports();
    let scanner = if options.showtime {
        AirportScanner::timed(codes)?
    } else {
        AirportScanner::new(codes)?
    };
    let handler = RecordHandler::new(scanner, reference.clone())
        .with_showtime(options.showtime);

    let lookup = HttpLookup::new(options.api.as_deref().unwrap_or(DEFAULT_API))?;

    match &options.redis {
        Some(url) => {
            let store = Arc::new(RedisStore::connect(url).await?);
            serve(&options, handler, store, lookup, reference).await
        }
        None => {
            warn!("No redis URL, the work queue and the verified routes are kept in memory");
            let store = Arc::new(MemoryStore::new());
            serve(&options, handler, store, lookup, reference).await
        }
    }
}

/// Start the verification worker and feed it from the configured source.
async fn serve<S, L>(
    options: &Options,
    handler: RecordHandler,
    store: Arc<S>,
    lookup: L,
    reference: Arc<Reference>,
) -> Result<(), Box<dyn Error>>
where
    S: Store + 'static,
    L: AircraftLookup + 'static,
{
    let settings = options.settings();
    let queue = settings.queue.clone();
    let worker = VerificationWorker::new(store.clone(), lookup, reference, settings);
    tokio::spawn(worker.run());

    match &options.host {
        Some(host) => {
            let address = format!("{}:{}", host, options.port.unwrap_or(DEFAULT_PORT));
            let stream = tcp(&address).await?;
            let framer: Box<dyn Framer> = if options.lines {
                Box::new(LineFramer::new())
            } else {
                Box::new(BraceFramer::new())
            };
            ingest(stream, framer, &handler, store.as_ref(), &queue).await?;
            error!("Connection to {} closed", address);
            Err(format!("connection to {} closed", address).into())
        }
        None => {
            info!("Reading records from standard input");
            let framer = Box::new(LineFramer::new());
            ingest(tokio::io::stdin(), framer, &handler, store.as_ref(), &queue).await
        }
    }
}

/// Handle every record of a source, queueing the routes to verify.
async fn ingest<R, S>(
    reader: R,
    framer: Box<dyn Framer>,
    handler: &RecordHandler,
    store: &S,
    queue: &str,
) -> Result<(), Box<dyn Error>>
where
    R: AsyncRead + Unpin,
    S: Store,
{
    let records = records(reader, framer);
    pin_mut!(records);
    while let Some(record) = records.next().await {
        let record = record?;
        if let Verdict::Escalate(item) = handler.handle(&record) {
            let payload = serde_json::to_string(&item)?;
            if let Err(e) = store.push(queue, payload).await {
                warn!("Cannot queue {} -> {}: {}", item.key(), item.route, e);
            }
        }
    }
    Ok(())
}

fn print_completions<G: Generator>(generator: G, cmd: &mut Command) {
    generate(generator, cmd, cmd.get_name().to_string(), &mut io::stdout());
}
