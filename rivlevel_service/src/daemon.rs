/// Core daemon implementation for the river level service
///
/// One scrape cycle:
/// 1. Fetches every configured gauge page (sequentially with a fixed delay,
///    or on a bounded worker pool)
/// 2. Finds each page's scrape date and resolves its readings against it
/// 3. Classifies latest / highest readings per gauge
/// 4. Appends the de-duplicated readings to the store, one container per
///    gauge capture
///
/// A publish check projects the level at the location of interest and posts
/// a status message when the flood-action interval allows it.

use crate::alert::thresholds::{flood_action, publish_interval};
use crate::analysis::classify::{Classification, classify};
use crate::config::Settings;
use crate::dates::{ScrapeDate, extract_scrape_date_at, resolve_record};
use crate::endpoint::{GaugeStatus, ProjectionStatus, SharedStatus, StatusSnapshot, shared_status};
use crate::ingest::annotations::parse_annotations;
use crate::ingest::page::{FetchError, GaugePage, PageFetcher, cache_raw_html, parse_document};
use crate::ingest::tabular::parse_sections;
use crate::logging::{self, DataSource};
use crate::model::{DuplicateObservation, DuplicatePolicy, GaugeDefinition, ReadingSet, ResolvedReading};
use crate::publish::{PublishState, Publisher, build_status_message, reach_action};
use crate::scheduler::{Decision, next_scrape_in, publish_decision, retry_window};
use crate::store::{Partition, ReadingStore, StoreError, StoreRecord, next_capture_stamp};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, mpsc};
use std::time::Instant;
use threadpool::ThreadPool;

// ---------------------------------------------------------------------------
// Page processing
// ---------------------------------------------------------------------------

/// Everything one gauge page produced in a cycle.
#[derive(Debug, Clone)]
pub struct PageOutcome {
    pub gauge: String,
    pub scrape_date: ScrapeDate,
    /// De-duplicated readings, ordered by timestamp.
    pub readings: Vec<ResolvedReading>,
    pub classification: Classification,
    pub duplicates: Vec<DuplicateObservation>,
    /// Records whose date could not be resolved.
    pub unresolved: usize,
    /// A duplicate under `fail-cycle` abandoned the page.
    pub aborted: bool,
}

/// Runs the pure part of the pipeline on one parsed page. `capture` stands in
/// for the scrape date when the page carries none.
pub fn process_page(
    gauge: &GaugeDefinition,
    page: &GaugePage,
    capture: DateTime<Utc>,
    policy: DuplicatePolicy,
) -> PageOutcome {
    let scrape_date = extract_scrape_date_at(&page.comments, capture);

    let mut records = parse_annotations(&page.annotations, gauge);
    records.extend(parse_sections(&page.sections, gauge));

    let mut unresolved = 0;
    let mut resolved = Vec::with_capacity(records.len());
    for record in records {
        let fragment = record.datetime_fragment.clone();
        match resolve_record(record, scrape_date.instant) {
            Ok(reading) => resolved.push(reading),
            Err(e) => {
                unresolved += 1;
                logging::warn(
                    DataSource::Date,
                    Some(&gauge.name),
                    &format!("Dropping record '{}': {}", fragment, e),
                );
            }
        }
    }

    let classification = classify(&resolved);

    let mut set = ReadingSet::new(policy);
    let mut duplicates = Vec::new();
    let mut aborted = false;
    for reading in resolved {
        if let Err(duplicate) = set.insert(reading) {
            logging::error(DataSource::Parse, Some(&gauge.name), &duplicate.to_string());
            duplicates.push(duplicate);
            if policy == DuplicatePolicy::FailCycle {
                aborted = true;
                break;
            }
        }
    }

    PageOutcome {
        gauge: gauge.name.clone(),
        scrape_date,
        readings: if aborted { Vec::new() } else { set.into_sorted() },
        classification: if aborted { Classification::default() } else { classification },
        duplicates,
        unresolved,
        aborted,
    }
}

// ---------------------------------------------------------------------------
// Daemon State
// ---------------------------------------------------------------------------

struct Fetched {
    index: usize,
    /// Time from the start of the cycle until the page arrived.
    elapsed: std::time::Duration,
    result: Result<String, FetchError>,
}

/// Summary of one scrape cycle
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub outcomes: Vec<PageOutcome>,
    pub failed: Vec<String>,
    pub stored: usize,
}

impl CycleReport {
    pub fn duplicates(&self) -> usize {
        self.outcomes.iter().map(|o| o.duplicates.len()).sum()
    }
}

pub struct Daemon<F, S, P>
where
    F: PageFetcher + Send + Sync + 'static,
    S: ReadingStore,
    P: Publisher,
{
    settings: Settings,
    fetcher: Arc<F>,
    store: S,
    publisher: P,
    state: PublishState,
    status: SharedStatus,
    classification: Classification,
    scrape_dates: BTreeMap<String, ScrapeDate>,
    last_scrape: Option<DateTime<Utc>>,
    /// The last cycle had a failed gauge or left the reach without data.
    scrape_incomplete: bool,
    last_capture: Option<DateTime<Utc>>,
    last_message: Option<String>,
    last_duplicates: usize,
}

impl<F, S, P> Daemon<F, S, P>
where
    F: PageFetcher + Send + Sync + 'static,
    S: ReadingStore,
    P: Publisher,
{
    pub fn new(settings: Settings, fetcher: F, store: S, publisher: P, state: PublishState) -> Self {
        Self {
            settings,
            fetcher: Arc::new(fetcher),
            store,
            publisher,
            state,
            status: shared_status(),
            classification: Classification::default(),
            scrape_dates: BTreeMap::new(),
            last_scrape: None,
            scrape_incomplete: false,
            last_capture: None,
            last_message: None,
            last_duplicates: 0,
        }
    }

    pub fn status_handle(&self) -> SharedStatus {
        Arc::clone(&self.status)
    }

    pub fn publish_state(&self) -> &PublishState {
        &self.state
    }

    pub fn classification(&self) -> &Classification {
        &self.classification
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // --- Fetching -----------------------------------------------------------

    fn fetch_sequential(&self, started: Instant) -> Vec<Fetched> {
        let delay = std::time::Duration::from_millis(self.settings.service.gauge_delay_ms);
        let mut fetched = Vec::with_capacity(self.settings.gauges.len());
        for (index, gauge) in self.settings.gauges.iter().enumerate() {
            if index > 0 && !delay.is_zero() {
                std::thread::sleep(delay);
            }
            let result = self.fetcher.fetch_html(&gauge.url);
            fetched.push(Fetched {
                index,
                elapsed: started.elapsed(),
                result,
            });
        }
        fetched
    }

    fn fetch_pooled(&self, started: Instant, workers: usize) -> Vec<Fetched> {
        let pool = ThreadPool::new(workers.min(self.settings.gauges.len()).max(1));
        let (tx, rx) = mpsc::channel();

        for (index, gauge) in self.settings.gauges.iter().enumerate() {
            let tx = tx.clone();
            let fetcher = Arc::clone(&self.fetcher);
            let url = gauge.url.clone();
            pool.execute(move || {
                let result = fetcher.fetch_html(&url);
                let _ = tx.send(Fetched {
                    index,
                    elapsed: started.elapsed(),
                    result,
                });
            });
        }
        drop(tx);

        let mut fetched: Vec<Fetched> = rx.iter().collect();
        fetched.sort_by_key(|f| f.index);

        if fetched.len() < self.settings.gauges.len() {
            for (index, gauge) in self.settings.gauges.iter().enumerate() {
                if !fetched.iter().any(|f| f.index == index) {
                    logging::error(DataSource::Fetch, Some(&gauge.name), "Fetch worker died");
                }
            }
        }
        fetched
    }

    // --- Scrape cycle ---------------------------------------------------------

    fn store_readings(
        &mut self,
        capture: DateTime<Utc>,
        readings: &[ResolvedReading],
    ) -> Result<usize, StoreError> {
        let partition = Partition::for_capture(capture);
        let records: Vec<StoreRecord> = readings.iter().map(StoreRecord::from).collect();
        self.store.append_all(&partition, &records)
    }

    /// Fetches, parses and stores every gauge. Failures are logged per gauge
    /// and never stop the cycle.
    pub fn run_scrape_cycle(&mut self, now: DateTime<Utc>) -> CycleReport {
        let started = Instant::now();
        let workers = self.settings.service.fetch_workers;
        let fetched = if workers > 1 {
            self.fetch_pooled(started, workers)
        } else {
            self.fetch_sequential(started)
        };

        let policy = self.settings.service.duplicate_policy;
        let mut report = CycleReport::default();

        for Fetched { index, elapsed, result } in fetched {
            let gauge = self.settings.gauges[index].clone();

            let html = match result {
                Ok(html) => html,
                Err(e) => {
                    logging::log_fetch_failure(&gauge.name, &gauge.url, &e.to_string());
                    report.failed.push(gauge.name.clone());
                    continue;
                }
            };

            let arrived = now + Duration::from_std(elapsed).unwrap_or(Duration::zero());
            let capture = next_capture_stamp(self.last_capture, arrived);
            self.last_capture = Some(capture);

            if let Some(dir) = &self.settings.service.raw_cache_dir {
                if let Err(e) = cache_raw_html(dir, capture, &gauge.name, &html) {
                    logging::warn(DataSource::Fetch, Some(&gauge.name), &e.to_string());
                }
            }

            let page = parse_document(&html);
            let outcome = process_page(&gauge, &page, capture, policy);
            self.scrape_dates.insert(gauge.name.clone(), outcome.scrape_date);

            if outcome.aborted {
                logging::error(
                    DataSource::Parse,
                    Some(&gauge.name),
                    "Duplicate observation under fail-cycle policy; nothing stored",
                );
                report.failed.push(gauge.name.clone());
                report.outcomes.push(outcome);
                continue;
            }

            match self.store_readings(capture, &outcome.readings) {
                Ok(count) => {
                    logging::info(
                        DataSource::Store,
                        Some(&gauge.name),
                        &format!(
                            "Stored {} readings in {}",
                            count,
                            Partition::for_capture(capture).relative_path().display()
                        ),
                    );
                    report.stored += count;
                }
                Err(e) => {
                    logging::error(DataSource::Store, Some(&gauge.name), &e.to_string());
                    report.failed.push(gauge.name.clone());
                }
            }

            self.classification
                .replace_gauge(&gauge.name, outcome.classification.clone());
            report.outcomes.push(outcome);
        }

        let total = self.settings.gauges.len();
        logging::log_cycle_summary(total, total - report.failed.len(), report.failed.len());

        for name in &report.failed {
            if self.classification.latest.contains_key(name) {
                logging::warn(
                    DataSource::Fetch,
                    Some(name),
                    "Keeping latest reading from an earlier cycle",
                );
            }
        }

        self.scrape_incomplete = !report.failed.is_empty()
            || self.settings.reach.project_latest(&self.classification.latest).is_none();
        self.last_scrape = Some(now);
        self.last_duplicates = report.duplicates();
        self.refresh_status(now);
        report
    }

    // --- Publication ----------------------------------------------------------

    /// Publishes if due. Returns how long to wait before checking again.
    pub fn run_publish_check(&mut self, now: DateTime<Utc>) -> Duration {
        let retry = retry_window(self.settings.publish.retry_secs);

        let Some(projection) = self.settings.reach.project_latest(&self.classification.latest) else {
            logging::warn(
                DataSource::Publish,
                None,
                &format!(
                    "No latest reading for both {} and {}; skipping publication",
                    self.settings.reach.upstream(),
                    self.settings.reach.downstream()
                ),
            );
            return retry;
        };

        let action = reach_action(&self.classification.latest, &self.settings.gauges);
        let interval = publish_interval(action, &self.settings.publish.intervals_secs);

        match publish_decision(now, &self.state, interval) {
            Decision::Wait(wait) => {
                logging::debug(
                    DataSource::Publish,
                    None,
                    &format!("{} in effect; next message in {}s", action, wait.num_seconds()),
                );
                wait
            }
            Decision::PublishNow => {
                let message = build_status_message(&self.classification, &projection, &self.settings.publish);
                self.last_message = Some(message.clone());

                let wait = match self.publisher.publish(&message) {
                    Ok(()) => {
                        self.state.record(now, projection.level_ft, action);
                        if let Some(path) = &self.settings.publish.state_file {
                            if let Err(e) = self.state.save(path) {
                                logging::error(DataSource::Publish, None, &e.to_string());
                            }
                        }
                        interval
                    }
                    Err(e) => {
                        logging::error(DataSource::Publish, None, &e.to_string());
                        retry
                    }
                };
                self.refresh_status(now);
                wait
            }
        }
    }

    /// Time until the next scrape. An incomplete cycle is retried after
    /// `retry_secs` instead of the full scrape interval.
    pub fn scrape_wait(&self, now: DateTime<Utc>) -> Duration {
        let interval = if self.scrape_incomplete {
            retry_window(self.settings.publish.retry_secs)
        } else {
            let minutes = i64::try_from(self.settings.service.scrape_interval_minutes)
                .unwrap_or(i64::MAX / 60_000);
            Duration::minutes(minutes)
        };
        next_scrape_in(now, self.last_scrape, interval)
    }

    fn publish_due(&self, now: DateTime<Utc>) -> bool {
        let action = reach_action(&self.classification.latest, &self.settings.gauges);
        let interval = publish_interval(action, &self.settings.publish.intervals_secs);
        publish_decision(now, &self.state, interval) == Decision::PublishNow
    }

    /// Runs whatever is due and returns the time until the next thing is.
    /// A due publication always goes out on freshly scraped pages.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Duration {
        let fresh = self.last_scrape == Some(now);
        if self.scrape_wait(now) <= Duration::zero() || (self.publish_due(now) && !fresh) {
            self.run_scrape_cycle(now);
        }
        let publish_wait = self.run_publish_check(now);
        publish_wait.min(self.scrape_wait(now))
    }

    // --- Status ---------------------------------------------------------------

    fn refresh_status(&self, now: DateTime<Utc>) {
        let gauges = self
            .settings
            .gauges
            .iter()
            .map(|gauge| {
                let latest = self.classification.latest.get(&gauge.name);
                let scrape = self.scrape_dates.get(&gauge.name);
                GaugeStatus {
                    name: gauge.name.clone(),
                    level_ft: latest.map(|r| r.level_ft),
                    observed_at: latest.map(|r| r.timestamp),
                    action: latest.map(|r| flood_action(r.level_ft, &gauge.thresholds)),
                    highest_forecast_ft: self
                        .classification
                        .highest_forecast
                        .get(&gauge.name)
                        .map(|r| r.level_ft),
                    scrape_date: scrape.map(|s| s.instant),
                    scrape_date_degraded: scrape.is_some_and(|s| s.is_degraded()),
                }
            })
            .collect();

        let projection = self
            .settings
            .reach
            .project_latest(&self.classification.latest)
            .map(|p| ProjectionStatus {
                location: self.settings.publish.location_name.clone(),
                target_mile: p.target_mile,
                level_ft: p.level_ft,
            });

        let snapshot = StatusSnapshot {
            generated_at: now,
            gauges,
            projection,
            message: self.last_message.clone(),
            duplicates: self.last_duplicates,
        };

        match self.status.lock() {
            Ok(mut guard) => *guard = Some(snapshot),
            Err(poisoned) => *poisoned.into_inner() = Some(snapshot),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
