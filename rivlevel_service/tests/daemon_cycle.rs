/// Integration tests for the scrape cycle and publish check
///
/// The daemon runs against captured gauge pages served from memory, a CSV
/// store in a temporary directory and a publisher that records messages.
/// Clocks are injected; nothing here touches the network.

use chrono::{DateTime, Duration, TimeZone, Utc};
use rivlevel_service::alert::thresholds::FloodAction;
use rivlevel_service::config::{Settings, parse_config};
use rivlevel_service::daemon::Daemon;
use rivlevel_service::ingest::page::{FetchError, PageFetcher};
use rivlevel_service::publish::{PublishError, PublishState, Publisher};
use rivlevel_service::store::CsvReadingStore;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const MARKLAND_PAGE: &str = include_str!("data/markland_page.html");
const MCALPINE_PAGE: &str = include_str!("data/mcalpine_page.html");

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

struct MemoryFetcher {
    pages: HashMap<String, String>,
}

impl MemoryFetcher {
    fn with_pages(pages: &[(&str, &str)]) -> Self {
        MemoryFetcher {
            pages: pages
                .iter()
                .map(|(url, html)| (url.to_string(), html.to_string()))
                .collect(),
        }
    }
}

impl PageFetcher for MemoryFetcher {
    fn fetch_html(&self, url: &str) -> Result<String, FetchError> {
        self.pages.get(url).cloned().ok_or(FetchError::Status(503))
    }
}

/// Serves both pages, failing each URL in `failing` once.
struct FlakyFetcher {
    pages: MemoryFetcher,
    failing: Arc<Mutex<HashSet<String>>>,
    calls: Arc<AtomicUsize>,
}

impl FlakyFetcher {
    fn failing_once(urls: &[&str]) -> Self {
        FlakyFetcher {
            pages: both_pages(),
            failing: Arc::new(Mutex::new(urls.iter().map(|u| u.to_string()).collect())),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl PageFetcher for FlakyFetcher {
    fn fetch_html(&self, url: &str) -> Result<String, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().unwrap().remove(url) {
            return Err(FetchError::Status(503));
        }
        self.pages.fetch_html(url)
    }
}

#[derive(Clone, Default)]
struct RecordingPublisher {
    sent: Rc<RefCell<Vec<String>>>,
    fail: bool,
}

impl Publisher for RecordingPublisher {
    fn publish(&mut self, message: &str) -> Result<(), PublishError> {
        if self.fail {
            return Err(PublishError::Status(500));
        }
        self.sent.borrow_mut().push(message.to_string());
        Ok(())
    }
}

fn settings(fetch_workers: usize, policy: &str) -> Settings {
    parse_config(&format!(
        r#"
        [service]
        gauge_delay_ms = 0
        fetch_workers = {fetch_workers}
        duplicate_policy = "{policy}"

        [publish]
        location_name = "Bushmans"
        target_mile = 584.0
        upstream = "Markland"
        downstream = "McAlpine"
        source_note = "Data source: http://portky.com/river.php"

        [[gauge]]
        name = "Markland"
        url = "mem://markland"
        mile_marker = 531.0
        datum_elevation_ft = 408.0
        thresholds = {{ first_action_ft = 49.0, minor_flood_ft = 51.0, moderate_flood_ft = 62.0, major_flood_ft = 74.0 }}

        [[gauge]]
        name = "McAlpine"
        url = "mem://mcalpine"
        mile_marker = 606.8
        datum_elevation_ft = 407.18
        thresholds = {{ first_action_ft = 21.0, minor_flood_ft = 23.0, moderate_flood_ft = 30.0, major_flood_ft = 38.0 }}
        "#
    ))
    .expect("test config should be valid")
}

fn both_pages() -> MemoryFetcher {
    MemoryFetcher::with_pages(&[("mem://markland", MARKLAND_PAGE), ("mem://mcalpine", MCALPINE_PAGE)])
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2019, 12, 4, 22, 6, 20).unwrap()
}

fn daemon<F: PageFetcher + Send + Sync + 'static>(
    settings: Settings,
    fetcher: F,
    root: &std::path::Path,
    publisher: RecordingPublisher,
) -> Daemon<F, CsvReadingStore, RecordingPublisher> {
    Daemon::new(settings, fetcher, CsvReadingStore::new(root), publisher, PublishState::default())
}

// ---------------------------------------------------------------------------
// Scrape cycle
// ---------------------------------------------------------------------------

#[test]
fn test_cycle_stores_each_gauge_in_its_own_container() {
    let dir = tempfile::tempdir().unwrap();
    let mut daemon = daemon(settings(1, "drop-newest"), both_pages(), dir.path(), RecordingPublisher::default());

    let report = daemon.run_scrape_cycle(now());
    assert!(report.failed.is_empty(), "failed: {:?}", report.failed);
    assert_eq!(report.stored, 8, "four readings per page");
    assert_eq!(report.duplicates(), 0);

    let day = dir.path().join("2019/12/04");
    let markland = fs::read_to_string(day.join("2019-12-04_220620UTC.csv"))
        .expect("Markland is captured first");
    let mcalpine = fs::read_to_string(day.join("2019-12-04_220621UTC.csv"))
        .expect("McAlpine capture is one second later");

    assert_eq!(markland.lines().count(), 5);
    assert!(markland.lines().skip(1).all(|l| l.starts_with("Markland,")));
    assert!(markland.contains("2019-12-06_01:00:00UTC"), "highest forecast on Dec 06");
    assert_eq!(mcalpine.lines().count(), 5);
    assert!(mcalpine.contains("2019-12-04_18:00:00UTC"));
}

#[test]
fn test_cycle_classifies_latest_per_gauge() {
    let dir = tempfile::tempdir().unwrap();
    let mut daemon = daemon(settings(1, "drop-newest"), both_pages(), dir.path(), RecordingPublisher::default());
    daemon.run_scrape_cycle(now());

    let latest = &daemon.classification().latest;
    assert_eq!(latest["Markland"].level_ft, 51.0);
    assert_eq!(latest["McAlpine"].level_ft, 27.8);
    assert_eq!(daemon.classification().highest_forecast["Markland"].level_ft, 52.4);
    assert_eq!(
        daemon.classification().highest_forecast["Markland"].timestamp,
        Utc.with_ymd_and_hms(2019, 12, 5, 19, 0, 0).unwrap(),
        "tie keeps the first reported forecast"
    );
}

#[test]
fn test_pooled_fetch_matches_sequential() {
    let sequential_dir = tempfile::tempdir().unwrap();
    let pooled_dir = tempfile::tempdir().unwrap();

    let mut sequential = daemon(settings(1, "drop-newest"), both_pages(), sequential_dir.path(), RecordingPublisher::default());
    let mut pooled = daemon(settings(4, "drop-newest"), both_pages(), pooled_dir.path(), RecordingPublisher::default());

    let a = sequential.run_scrape_cycle(now());
    let b = pooled.run_scrape_cycle(now());

    assert_eq!(a.stored, b.stored);
    let gauges_a: Vec<&str> = a.outcomes.iter().map(|o| o.gauge.as_str()).collect();
    let gauges_b: Vec<&str> = b.outcomes.iter().map(|o| o.gauge.as_str()).collect();
    assert_eq!(gauges_a, gauges_b, "outcomes stay in configured gauge order");
    assert_eq!(sequential.classification(), pooled.classification());
}

#[test]
fn test_fetch_failure_skips_gauge() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = MemoryFetcher::with_pages(&[("mem://markland", MARKLAND_PAGE)]);
    let mut daemon = daemon(settings(1, "drop-newest"), fetcher, dir.path(), RecordingPublisher::default());

    let report = daemon.run_scrape_cycle(now());
    assert_eq!(report.failed, vec!["McAlpine".to_string()]);
    assert_eq!(report.stored, 4);
    assert!(!daemon.classification().latest.contains_key("McAlpine"));
}

#[test]
fn test_fail_cycle_policy_stores_nothing_for_conflicting_page() {
    let dir = tempfile::tempdir().unwrap();
    let conflicting = MCALPINE_PAGE.replace("27.20ft", "27.25ft");
    let fetcher = MemoryFetcher::with_pages(&[("mem://markland", MARKLAND_PAGE), ("mem://mcalpine", &conflicting)]);
    let mut daemon = daemon(settings(1, "fail-cycle"), fetcher, dir.path(), RecordingPublisher::default());

    let report = daemon.run_scrape_cycle(now());
    assert_eq!(report.duplicates(), 1);
    assert_eq!(report.failed, vec!["McAlpine".to_string()]);
    assert_eq!(report.stored, 4, "Markland is unaffected");
    assert!(!dir.path().join("2019/12/04/2019-12-04_220621UTC.csv").exists());
}

// ---------------------------------------------------------------------------
// Publication
// ---------------------------------------------------------------------------

#[test]
fn test_publish_after_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let publisher = RecordingPublisher::default();
    let sent = Rc::clone(&publisher.sent);
    let mut daemon = daemon(settings(1, "drop-newest"), both_pages(), dir.path(), publisher);

    daemon.run_scrape_cycle(now());
    let wait = daemon.run_publish_check(now());

    assert_eq!(wait, Duration::seconds(4000), "minor flooding on the reach");
    let sent = sent.borrow();
    assert_eq!(sent.len(), 1);
    assert!(
        sent[0].starts_with(
            "Latest Observation: Markland 51.00 McAlpine 27.80 Calculated Level at Bushmans: 34.53"
        ),
        "message: {}",
        sent[0]
    );
    assert!(sent[0].contains("Highest Forecast: McAlpine 28.60"), "message: {}", sent[0]);
    assert!(sent[0].ends_with("::: Data source: http://portky.com/river.php"));

    let state = daemon.publish_state();
    assert_eq!(state.last_published, Some(now()));
    assert_eq!(state.last_action, Some(FloodAction::MinorFlood));
}

#[test]
fn test_publish_waits_out_interval() {
    let dir = tempfile::tempdir().unwrap();
    let publisher = RecordingPublisher::default();
    let sent = Rc::clone(&publisher.sent);
    let mut daemon = daemon(settings(1, "drop-newest"), both_pages(), dir.path(), publisher);

    daemon.run_scrape_cycle(now());
    daemon.run_publish_check(now());
    let wait = daemon.run_publish_check(now() + Duration::minutes(30));

    assert_eq!(wait, Duration::seconds(4000 - 1800));
    assert_eq!(sent.borrow().len(), 1, "no second message inside the interval");
}

#[test]
fn test_publish_skipped_without_both_gauges() {
    let dir = tempfile::tempdir().unwrap();
    let publisher = RecordingPublisher::default();
    let sent = Rc::clone(&publisher.sent);
    let fetcher = MemoryFetcher::with_pages(&[("mem://mcalpine", MCALPINE_PAGE)]);
    let mut daemon = daemon(settings(1, "drop-newest"), fetcher, dir.path(), publisher);

    daemon.run_scrape_cycle(now());
    let wait = daemon.run_publish_check(now());

    assert_eq!(wait, Duration::seconds(300), "retry window");
    assert!(sent.borrow().is_empty());
    assert_eq!(daemon.publish_state().last_published, None);
}

#[test]
fn test_failed_publish_retries_without_recording() {
    let dir = tempfile::tempdir().unwrap();
    let publisher = RecordingPublisher {
        fail: true,
        ..RecordingPublisher::default()
    };
    let mut daemon = daemon(settings(1, "drop-newest"), both_pages(), dir.path(), publisher);

    daemon.run_scrape_cycle(now());
    assert_eq!(daemon.run_publish_check(now()), Duration::seconds(300));
    assert_eq!(daemon.publish_state().last_published, None);
}

#[test]
fn test_tick_scrapes_then_publishes() {
    let dir = tempfile::tempdir().unwrap();
    let publisher = RecordingPublisher::default();
    let sent = Rc::clone(&publisher.sent);
    let mut daemon = daemon(settings(1, "drop-newest"), both_pages(), dir.path(), publisher);

    let wait = daemon.tick(now());
    assert_eq!(wait, Duration::seconds(4000), "publish interval is shorter than the scrape interval");
    assert_eq!(sent.borrow().len(), 1);

    let status = daemon.status_handle();
    let snapshot = status.lock().unwrap().clone().expect("snapshot after first tick");
    let projection = snapshot.projection.expect("projection in snapshot");
    assert!((projection.level_ft - 34.5317).abs() < 1e-3, "projection: {}", projection.level_ft);
    assert_eq!(snapshot.gauges.len(), 2);
    assert!(snapshot.message.is_some());
}

// ---------------------------------------------------------------------------
// Retries and freshness
// ---------------------------------------------------------------------------

#[test]
fn test_transient_fetch_failure_is_retried_within_retry_window() {
    let dir = tempfile::tempdir().unwrap();
    let publisher = RecordingPublisher::default();
    let sent = Rc::clone(&publisher.sent);
    let fetcher = FlakyFetcher::failing_once(&["mem://markland"]);
    let calls = Arc::clone(&fetcher.calls);
    let mut daemon = daemon(settings(1, "drop-newest"), fetcher, dir.path(), publisher);

    let wait = daemon.tick(now());
    assert_eq!(wait, Duration::seconds(300), "reach incomplete, retry soon");
    assert!(sent.borrow().is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let wait = daemon.tick(now() + wait);
    assert_eq!(calls.load(Ordering::SeqCst), 4, "pages fetched again on retry");
    assert_eq!(sent.borrow().len(), 1, "published once Markland came back");
    assert_eq!(wait, Duration::seconds(4000));
    assert_eq!(daemon.classification().latest["Markland"].level_ft, 51.0);
}

#[test]
fn test_failed_gauge_keeps_previous_latest_reading() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = FlakyFetcher::failing_once(&[]);
    let failing = Arc::clone(&fetcher.failing);
    let mut daemon = daemon(settings(1, "drop-newest"), fetcher, dir.path(), RecordingPublisher::default());

    daemon.run_scrape_cycle(now());
    assert_eq!(daemon.scrape_wait(now()), Duration::minutes(360));

    failing.lock().unwrap().insert("mem://mcalpine".to_string());
    let later = now() + Duration::minutes(360);
    let report = daemon.run_scrape_cycle(later);

    assert_eq!(report.failed, vec!["McAlpine".to_string()]);
    assert_eq!(
        daemon.classification().latest["McAlpine"].level_ft,
        27.8,
        "earlier McAlpine reading survives the failed fetch"
    );
    assert_eq!(daemon.scrape_wait(later), Duration::seconds(300), "failed gauge is retried early");
}

#[test]
fn test_due_publication_scrapes_fresh_pages() {
    let dir = tempfile::tempdir().unwrap();
    let publisher = RecordingPublisher::default();
    let sent = Rc::clone(&publisher.sent);
    let fetcher = FlakyFetcher::failing_once(&[]);
    let calls = Arc::clone(&fetcher.calls);
    let mut daemon = daemon(settings(1, "drop-newest"), fetcher, dir.path(), publisher);

    let wait = daemon.tick(now());
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    daemon.tick(now() + wait);
    assert_eq!(sent.borrow().len(), 2);
    assert_eq!(
        calls.load(Ordering::SeqCst),
        4,
        "second message is built from a new scrape, not the six-hour cycle"
    );
}
