//! Replay cached gauge pages
//!
//! Re-runs the page pipeline on `.rawhtml` files saved by the daemon
//! (`raw_cache_dir`) and prints every resolved reading. Useful for checking
//! year resolution on pages captured around new year.
//!
//! Usage:
//!   cargo run --bin replay_scrapes -- RAW_PAGES/*.rawhtml
//!   cargo run --bin replay_scrapes -- --gauge McAlpine page.html

use chrono::{DateTime, NaiveDateTime, Utc};
use clap::Parser;
use rivlevel_service::config;
use rivlevel_service::daemon::process_page;
use rivlevel_service::gauges::{find_gauge, gauge_from_cache_name};
use rivlevel_service::ingest::page::parse_document;
use rivlevel_service::logging::{self, LogLevel};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "replay_scrapes", about = "Re-parse cached gauge pages")]
struct Args {
    /// Cached pages, processed oldest first
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Path to gauges.toml
    #[arg(long)]
    config: Option<PathBuf>,

    /// Gauge for files whose name does not identify one
    #[arg(long)]
    gauge: Option<String>,
}

/// Capture time from the cache file name, falling back to modification time.
fn capture_time(path: &Path) -> Option<DateTime<Utc>> {
    let from_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.strip_suffix(".rawhtml"))
        .and_then(|stem| stem.rsplit_once('_'))
        .and_then(|(stamp, _)| NaiveDateTime::parse_from_str(stamp, "%Y-%m-%d_%H%M%SUTC").ok())
        .map(|naive| naive.and_utc());

    from_name.or_else(|| {
        let modified = fs::metadata(path).and_then(|m| m.modified()).ok()?;
        Some(DateTime::<Utc>::from(modified))
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let settings = config::load_config(&config::config_path(args.config.as_deref()))?;
    logging::init_logger(LogLevel::Warning, None, false)?;

    println!("🔁 Replaying {} cached pages", args.files.len());
    println!("=============================\n");

    let mut files: Vec<(DateTime<Utc>, PathBuf)> = Vec::new();
    for path in args.files {
        match capture_time(&path) {
            Some(capture) => files.push((capture, path)),
            None => eprintln!("⚠ {}: cannot determine capture time, skipped", path.display()),
        }
    }
    files.sort();

    for (capture, path) in files {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        let gauge = match &args.gauge {
            Some(gauge) => find_gauge(&settings.gauges, gauge),
            None => gauge_from_cache_name(&settings.gauges, name),
        };
        let Some(gauge) = gauge else {
            eprintln!("⚠ {}: no configured gauge matches, skipped", path.display());
            continue;
        };

        let html = fs::read_to_string(&path)?;
        let page = parse_document(&html);
        let outcome = process_page(gauge, &page, capture, settings.service.duplicate_policy);

        println!(
            "📄 {} [{}] scrape date {}{}",
            path.display(),
            gauge.name,
            outcome.scrape_date.instant.format("%Y-%m-%d %H:%M:%S UTC"),
            if outcome.scrape_date.is_degraded() { " (degraded)" } else { "" }
        );
        for reading in &outcome.readings {
            let flow = reading
                .flow_kcfs
                .map(|f| format!("{:.1} kcfs", f))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "   {}  {:<9} {:>7.2} ft  {}",
                reading.timestamp.format("%Y-%m-%d %H:%M"),
                reading.kind.label(),
                reading.level_ft,
                flow
            );
        }
        if !outcome.duplicates.is_empty() {
            println!("   ✗ {} duplicate observations", outcome.duplicates.len());
        }
        if outcome.unresolved > 0 {
            println!("   ✗ {} records with unresolvable dates", outcome.unresolved);
        }
        println!();
    }

    Ok(())
}
