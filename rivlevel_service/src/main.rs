//! River Level Service - Main Daemon
//!
//! A server-side daemon that continuously:
//! 1. Scrapes the NWS river pages for each configured gauge
//! 2. Resolves year-less observation dates against each page's scrape date
//! 3. Stores de-duplicated readings in partitioned CSV containers
//! 4. Projects the level at the configured location and publishes a status
//!    message at an interval set by the worst flood action on the reach
//! 5. Optionally serves the latest cycle over HTTP
//!
//! Usage:
//!   cargo run --release                         # Start daemon
//!   cargo run --release -- --endpoint 8080      # Start with HTTP endpoint on port 8080
//!   cargo run --release -- --once --dry-run     # One cycle, log the message only
//!
//! Environment:
//!   RIVLEVEL_CONFIG     - config path when --config is not given
//!   PUBLISH_WEBHOOK_URL - publication webhook (dry run when unset)
//!   PUBLISH_TOKEN       - bearer token for the webhook

use chrono::Utc;
use clap::Parser;
use rivlevel_service::config::{self, Settings};
use rivlevel_service::daemon::Daemon;
use rivlevel_service::endpoint;
use rivlevel_service::ingest::page::HttpPageFetcher;
use rivlevel_service::logging::{self, DataSource, LogLevel};
use rivlevel_service::publish::{LogPublisher, PublishState, Publisher, WEBHOOK_URL_VAR, WebhookPublisher};
use rivlevel_service::store::CsvReadingStore;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "rivlevel_service", about = "Scrape river gauges and publish projected levels")]
struct Args {
    /// Path to gauges.toml
    #[arg(long)]
    config: Option<PathBuf>,

    /// Serve /status and /health on this port
    #[arg(long)]
    endpoint: Option<u16>,

    /// Run a single scrape and publish check, then exit
    #[arg(long)]
    once: bool,

    /// Log status messages instead of publishing them
    #[arg(long)]
    dry_run: bool,
}

fn main() {
    dotenv::dotenv().ok();
    let args = Args::parse();

    println!("🌊 River Level Service");
    println!("======================\n");

    let path = config::config_path(args.config.as_deref());
    let settings = match config::load_config(&path) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("❌ Configuration error in {}: {}", path.display(), e);
            std::process::exit(1);
        }
    };
    println!("✓ Loaded {} gauges from {}", settings.gauges.len(), path.display());

    let level = LogLevel::parse(&settings.service.log_level);
    let log_file = settings
        .service
        .log_file
        .as_deref()
        .map(|base| logging::per_run_log_path(Path::new(base), Utc::now()));
    if let Err(e) = logging::init_logger(
        level.unwrap_or(LogLevel::Info),
        log_file.as_deref(),
        settings.service.console_timestamps,
    ) {
        eprintln!("❌ {}", e);
        std::process::exit(1);
    }

    logging::info(
        DataSource::Config,
        None,
        &format!("Loaded {} gauges from {}", settings.gauges.len(), path.display()),
    );
    if level.is_none() {
        logging::warn(
            DataSource::Config,
            None,
            &format!("Unknown log level '{}', using info", settings.service.log_level),
        );
    }
    if let Some(file) = &log_file {
        println!("📝 Logging to {}", file.display());
    }

    if let Err(e) = run(args, settings) {
        eprintln!("\n❌ Daemon error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args, settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let timeout = Duration::from_secs(settings.service.fetch_timeout_secs);
    let fetcher = HttpPageFetcher::new(timeout)?;
    let store = CsvReadingStore::new(settings.service.output_root.clone());
    let state = match &settings.publish.state_file {
        Some(path) => PublishState::load(path)?,
        None => PublishState::default(),
    };

    let publisher: Box<dyn Publisher> = if args.dry_run {
        println!("📝 Dry run: status messages are logged, not published");
        logging::info(DataSource::Config, None, "Dry run requested; using the log publisher");
        Box::new(LogPublisher)
    } else {
        match WebhookPublisher::from_env(timeout)? {
            Some(webhook) => Box::new(webhook),
            None => {
                println!("📝 {} not set: status messages are logged, not published", WEBHOOK_URL_VAR);
                logging::warn(
                    DataSource::Config,
                    None,
                    &format!("{} not set; using the log publisher", WEBHOOK_URL_VAR),
                );
                Box::new(LogPublisher)
            }
        }
    };

    println!("🔄 Scrape interval: {} minutes", settings.service.scrape_interval_minutes);
    println!(
        "   Projecting {} at mile {} from {} and {}",
        settings.publish.location_name,
        settings.reach.target_mile(),
        settings.reach.upstream(),
        settings.reach.downstream()
    );
    println!("   Storing readings under {}\n", settings.service.output_root.display());

    let mut daemon = Daemon::new(settings, fetcher, store, publisher, state);

    if let Some(port) = args.endpoint {
        println!("🚀 Starting HTTP endpoint server...");
        let status = daemon.status_handle();
        std::thread::spawn(move || {
            if let Err(e) = endpoint::start_endpoint_server(port, status) {
                eprintln!("❌ Endpoint server error: {}", e);
            }
        });
        println!("   Endpoint running on http://0.0.0.0:{}\n", port);
    }

    if args.once {
        let report = daemon.run_scrape_cycle(Utc::now());
        daemon.run_publish_check(Utc::now());
        println!(
            "✓ Stored {} readings, {} gauges failed, {} duplicate observations",
            report.stored,
            report.failed.len(),
            report.duplicates()
        );
        return Ok(());
    }

    println!("🚀 Starting daemon loop...");
    println!("   Press Ctrl+C to stop\n");
    loop {
        let wait = daemon.tick(Utc::now());
        let secs = u64::try_from(wait.num_seconds()).unwrap_or(0).max(1);
        std::thread::sleep(Duration::from_secs(secs));
    }
}
