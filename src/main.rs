//! SolarEdge Monitoring Service - Main Daemon
//!
//! Collects PV telemetry for every site on a SolarEdge account and writes
//! it to stdout as line protocol:
//! 1. Discovers sites and inverters once (cached in installinfo.json)
//! 2. Resumes per-stream checkpoints from lastupdated.json
//! 3. Either backfills history within the daily API quota, or fetches the
//!    previous day's data at the daily cutoff
//!
//! Usage:
//!   solmon_service           # daily update loop, runs at the cutoff forever
//!   solmon_service history   # quota-aware historical backfill, then exit
//!   solmon_service debug     # one update cycle now, then exit
//!
//! Environment:
//!   SOLMON_API_KEY        - monitoring API key (required)
//!   SOLMON_SITE_USERNAME  - website login for panel playback (optional)
//!   SOLMON_SITE_PASSWORD
//!   SOLMON_STATE_DIR      - where state files live (default: $HOME)
//!   SOLMON_CONFIG         - config file (default: ./solmon.toml)
//!   RUST_LOG              - log filter (default: info); logs go to stderr

use solmon_service::backfill::Backfill;
use solmon_service::checkpoint::{self, CHECKPOINT_FILE, CheckpointStore};
use solmon_service::clock::{Clock, SystemClock};
use solmon_service::config::{AppConfig, Credentials};
use solmon_service::daemon::{Daemon, RunMode};
use solmon_service::ingest::SolarEdgeClient;
use solmon_service::ingest::playback::{COOKIE_FILE, WebSession};
use solmon_service::installation::{self, INSTALLATION_FILE};
use solmon_service::line_protocol::MetricSink;
use solmon_service::quota::QuotaGovernor;
use solmon_service::retry::RetryingFetcher;
use std::env;
use std::error::Error;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Update,
    History,
    Debug,
}

fn main() {
    // Parse command-line arguments
    let args: Vec<String> = env::args().collect();
    let command = match args.get(1).map(String::as_str) {
        None => Command::Update,
        Some("history") if args.len() == 2 => Command::History,
        Some("debug") if args.len() == 2 => Command::Debug,
        Some(other) => {
            if args.len() > 2 {
                eprintln!("Too many arguments");
            } else {
                eprintln!("Unknown argument: {}", other);
            }
            eprintln!("Usage: {} [history|debug]", args[0]);
            std::process::exit(1);
        }
    };

    // stdout carries metrics only
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run(command) {
        error!(error = %e, "fatal");
        std::process::exit(1);
    }
}

fn run(command: Command) -> Result<(), Box<dyn Error>> {
    let config = AppConfig::load()?;
    let credentials = Credentials::from_env()?;
    let state_dir = config.state_dir()?;
    info!(?command, state_dir = %state_dir.display(), "solmon_service starting");

    let web = WebSession {
        base_url: config.api.web_base_url.clone(),
        credentials: credentials.web.clone(),
        cookie_path: state_dir.join(COOKIE_FILE),
        timeout: config.request_timeout(),
    };
    let client = SolarEdgeClient::new(&config.api.base_url, &credentials.api_key, config.request_timeout(), web);

    let sites = installation::load_or_discover(&state_dir.join(INSTALLATION_FILE), &client)?;

    let clock = SystemClock;
    let default_checkpoint = checkpoint::yesterday_at(clock.now(), config.cutoff()?);
    let store = CheckpointStore::load(&state_dir.join(CHECKPOINT_FILE), &sites, default_checkpoint)?;
    let sink = MetricSink::stdout();

    match command {
        Command::History => {
            let fetcher = RetryingFetcher::new(
                config.retry_policy(),
                Some(QuotaGovernor::new(config.quota.daily_call_limit)),
            );
            let report = Backfill::new(&client, &clock, &sites, store, sink, fetcher).run()?;
            if !report.abandoned.is_empty() {
                return Err(format!("backfill gave up on {} site stream(s)", report.abandoned.len()).into());
            }
        }
        Command::Debug => {
            Daemon::new(config.daemon_config()?, &client, &clock, &sites, store, sink).run(RunMode::OneShot)?;
        }
        Command::Update => {
            Daemon::new(config.daemon_config()?, &client, &clock, &sites, store, sink).run(RunMode::Continuous)?;
        }
    }
    Ok(())
}
