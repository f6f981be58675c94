/// rivlevel_service: Ohio River level scraping and projection service.
///
/// # Module structure
///
/// ```text
/// rivlevel_service
/// ├── model       — shared data types (GaugeDefinition, ResolvedReading, ReadingSet, …)
/// ├── config      — gauges.toml loader and startup validation
/// ├── gauges      — NWS river page URLs and gauge lookups
/// ├── logging     — tracing subscriber setup and fetch failure classification
/// ├── dates
/// │   ├── resolve — nearest-year resolution of year-less date fragments
/// │   └── scrape  — scrape date from page comments
/// ├── ingest
/// │   ├── page        — page fetching and HTML → GaugePage
/// │   ├── annotations — map annotation text → ParsedRecord
/// │   ├── tabular     — observed / forecast table rows → ParsedRecord
/// │   └── fixtures (test only) — captured gauge pages
/// ├── analysis
/// │   ├── classify    — latest / highest readings per gauge
/// │   └── projection  — level interpolated between two gauges
/// ├── alert
/// │   └── thresholds  — flood action levels and publish intervals
/// ├── store       — partitioned CSV reading store
/// ├── publish     — status message, publishers, persisted publish state
/// ├── scheduler   — when to scrape and publish next
/// ├── daemon      — scrape cycle and publish check orchestration
/// └── endpoint    — HTTP status endpoint
/// ```

pub mod alert;
pub mod analysis;
pub mod config;
pub mod daemon;
pub mod dates;
pub mod endpoint;
pub mod gauges;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod publish;
pub mod scheduler;
pub mod store;
