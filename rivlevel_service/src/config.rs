/// Service configuration loader - parses gauges.toml
///
/// Keeps gauge metadata, thresholds, schedule and publication settings out of
/// the code so the reach can be retuned without recompiling. Everything is
/// validated here; the rest of the service only ever sees a `Settings`.

use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::analysis::projection::Reach;
use crate::gauges;
use crate::model::{DuplicatePolicy, FloodThresholds, GaugeDefinition};

/// Default config file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "gauges.toml";

/// Environment variable overriding the config path.
pub const CONFIG_ENV_VAR: &str = "RIVLEVEL_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("no [[gauge]] entries configured")]
    NoGauges,

    #[error("gauge '{0}' is configured more than once")]
    DuplicateGauge(String),

    #[error("gauge '{0}' needs either url or point_id")]
    MissingUrl(String),

    #[error("gauge '{gauge}': thresholds must be strictly increasing ({detail})")]
    ThresholdOrder { gauge: String, detail: String },

    #[error("{role} gauge '{name}' is not configured")]
    UnknownGauge { role: &'static str, name: String },

    #[error("reach {upstream} -> {downstream} has non-positive pool length {pool_length}")]
    NonPositivePool {
        upstream: String,
        downstream: String,
        pool_length: f64,
    },

    #[error("publish.intervals_secs needs 5 positive entries, got {0:?}")]
    PublishIntervals(Vec<u64>),

    #[error("{0} must be greater than zero")]
    ZeroValue(&'static str),
}

// ---------------------------------------------------------------------------
// Raw TOML shape
// ---------------------------------------------------------------------------

/// `[service]`: schedule, storage and logging.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    pub scrape_interval_minutes: u64,
    /// Pause between sequential gauge fetches.
    pub gauge_delay_ms: u64,
    /// 1 fetches sequentially; more uses a worker pool.
    pub fetch_workers: usize,
    pub fetch_timeout_secs: u64,
    pub output_root: PathBuf,
    /// When set, every fetched page is kept as `<stamp>_<gauge>.rawhtml`.
    pub raw_cache_dir: Option<PathBuf>,
    pub duplicate_policy: DuplicatePolicy,
    pub log_level: String,
    /// Base name; each run writes its own stamped file next to it.
    pub log_file: Option<String>,
    pub console_timestamps: bool,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        ServiceSettings {
            scrape_interval_minutes: 360,
            gauge_delay_ms: 1000,
            fetch_workers: 1,
            fetch_timeout_secs: 60,
            output_root: PathBuf::from("CSV_DATA"),
            raw_cache_dir: None,
            duplicate_policy: DuplicatePolicy::DropNewest,
            log_level: "info".to_string(),
            log_file: None,
            console_timestamps: true,
        }
    }
}

/// `[source]`: the NWS river page the gauge URLs are built from.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    pub base_url: String,
    pub wfo: String,
    pub wfoid: u32,
    pub riverid: u32,
}

impl Default for SourceSettings {
    fn default() -> Self {
        SourceSettings {
            base_url: "https://water.weather.gov/ahps2/river.php".to_string(),
            wfo: "lmk".to_string(),
            wfoid: 18699,
            riverid: 204624,
        }
    }
}

/// `[publish]`: the location of interest and the status message.
#[derive(Debug, Clone, Deserialize)]
pub struct PublishSettings {
    pub location_name: String,
    pub target_mile: f64,
    pub upstream: String,
    pub downstream: String,
    /// Minimum seconds between messages, indexed by flood action
    /// (no flooding through major flood).
    #[serde(default = "default_intervals")]
    pub intervals_secs: Vec<u64>,
    #[serde(default = "default_retry_secs")]
    pub retry_secs: u64,
    #[serde(default = "default_max_length")]
    pub max_length: usize,
    #[serde(default)]
    pub source_note: Option<String>,
    #[serde(default)]
    pub state_file: Option<PathBuf>,
}

fn default_intervals() -> Vec<u64> {
    vec![18000, 9000, 4000, 2000, 1000]
}

fn default_retry_secs() -> u64 {
    300
}

fn default_max_length() -> usize {
    280
}

/// One `[[gauge]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct GaugeConfig {
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub point_id: Option<u32>,
    pub mile_marker: f64,
    pub datum_elevation_ft: f64,
    pub thresholds: ThresholdConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThresholdConfig {
    pub first_action_ft: f64,
    pub minor_flood_ft: f64,
    pub moderate_flood_ft: f64,
    pub major_flood_ft: f64,
}

impl From<&ThresholdConfig> for FloodThresholds {
    fn from(config: &ThresholdConfig) -> Self {
        FloodThresholds {
            first_action_ft: config.first_action_ft,
            minor_flood_ft: config.minor_flood_ft,
            moderate_flood_ft: config.moderate_flood_ft,
            major_flood_ft: config.major_flood_ft,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    service: ServiceSettings,
    #[serde(default)]
    source: SourceSettings,
    publish: PublishSettings,
    #[serde(default)]
    gauge: Vec<GaugeConfig>,
}

// ---------------------------------------------------------------------------
// Validated settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Settings {
    pub service: ServiceSettings,
    pub publish: PublishSettings,
    pub gauges: Vec<GaugeDefinition>,
    pub reach: Reach,
}

/// Resolves the config path: explicit argument, then `RIVLEVEL_CONFIG`, then
/// `gauges.toml` in the working directory.
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

pub fn load_config(path: &Path) -> Result<Settings, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&contents)
}

pub fn parse_config(contents: &str) -> Result<Settings, ConfigError> {
    let raw: RawConfig = toml::from_str(contents)?;

    if raw.gauge.is_empty() {
        return Err(ConfigError::NoGauges);
    }
    if raw.service.scrape_interval_minutes == 0 {
        return Err(ConfigError::ZeroValue("service.scrape_interval_minutes"));
    }
    if raw.service.fetch_workers == 0 {
        return Err(ConfigError::ZeroValue("service.fetch_workers"));
    }
    if raw.publish.max_length == 0 {
        return Err(ConfigError::ZeroValue("publish.max_length"));
    }
    if raw.publish.retry_secs == 0 {
        return Err(ConfigError::ZeroValue("publish.retry_secs"));
    }
    if raw.publish.intervals_secs.len() != 5 || raw.publish.intervals_secs.contains(&0) {
        return Err(ConfigError::PublishIntervals(raw.publish.intervals_secs));
    }

    let mut seen = HashSet::new();
    let mut gauges = Vec::with_capacity(raw.gauge.len());
    for entry in &raw.gauge {
        // Gauge names compare case-insensitively.
        if !seen.insert(entry.name.to_ascii_lowercase()) {
            return Err(ConfigError::DuplicateGauge(entry.name.clone()));
        }
        let thresholds = FloodThresholds::from(&entry.thresholds);
        validate_thresholds(&entry.name, &thresholds)?;

        let url = match (&entry.url, entry.point_id) {
            (Some(url), _) => url.clone(),
            (None, Some(point)) => gauges::river_page_url(&raw.source, point),
            (None, None) => return Err(ConfigError::MissingUrl(entry.name.clone())),
        };

        gauges.push(GaugeDefinition {
            name: entry.name.clone(),
            url,
            mile_marker: entry.mile_marker,
            datum_elevation_ft: entry.datum_elevation_ft,
            thresholds,
        });
    }

    let upstream = gauges::find_gauge(&gauges, &raw.publish.upstream).ok_or_else(|| {
        ConfigError::UnknownGauge {
            role: "upstream",
            name: raw.publish.upstream.clone(),
        }
    })?;
    let downstream = gauges::find_gauge(&gauges, &raw.publish.downstream).ok_or_else(|| {
        ConfigError::UnknownGauge {
            role: "downstream",
            name: raw.publish.downstream.clone(),
        }
    })?;
    let reach = Reach::new(upstream, downstream, raw.publish.target_mile)?;

    Ok(Settings {
        service: raw.service,
        publish: raw.publish,
        gauges,
        reach,
    })
}

pub fn validate_thresholds(gauge: &str, thresholds: &FloodThresholds) -> Result<(), ConfigError> {
    if thresholds.is_strictly_increasing() {
        return Ok(());
    }
    Err(ConfigError::ThresholdOrder {
        gauge: gauge.to_string(),
        detail: format!(
            "{} / {} / {} / {}",
            thresholds.first_action_ft,
            thresholds.minor_flood_ft,
            thresholds.moderate_flood_ft,
            thresholds.major_flood_ft
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [publish]
        location_name = "Bushmans"
        target_mile = 584.0
        upstream = "Markland"
        downstream = "McAlpine"

        [[gauge]]
        name = "Markland"
        point_id = 142935
        mile_marker = 531.0
        datum_elevation_ft = 408.0
        thresholds = { first_action_ft = 49.0, minor_flood_ft = 51.0, moderate_flood_ft = 62.0, major_flood_ft = 74.0 }

        [[gauge]]
        name = "McAlpine"
        url = "https://example.test/mcalpine"
        mile_marker = 606.8
        datum_elevation_ft = 407.18
        thresholds = { first_action_ft = 21.0, minor_flood_ft = 23.0, moderate_flood_ft = 30.0, major_flood_ft = 38.0 }
    "#;

    #[test]
    fn test_load_config_succeeds() {
        let settings = load_config(Path::new(DEFAULT_CONFIG_PATH))
            .expect("gauges.toml in the crate root should load");
        assert!(settings.gauges.len() >= 2, "Should have at least the two dams");
        assert_eq!(settings.publish.location_name, "Bushmans");
        assert_eq!(settings.reach.target_mile(), 584.0);
    }

    #[test]
    fn test_minimal_config_applies_defaults() {
        let settings = parse_config(MINIMAL).unwrap();
        assert_eq!(settings.service.fetch_workers, 1);
        assert_eq!(settings.service.duplicate_policy, DuplicatePolicy::DropNewest);
        assert_eq!(settings.publish.intervals_secs, vec![18000, 9000, 4000, 2000, 1000]);
        assert_eq!(settings.publish.max_length, 280);
    }

    #[test]
    fn test_point_id_builds_river_url() {
        let settings = parse_config(MINIMAL).unwrap();
        let markland = &settings.gauges[0];
        assert!(markland.url.contains("wfo=lmk"), "url: {}", markland.url);
        assert!(markland.url.contains("142935"), "url: {}", markland.url);
        assert_eq!(settings.gauges[1].url, "https://example.test/mcalpine");
    }

    #[test]
    fn test_threshold_conversion() {
        let config = ThresholdConfig {
            first_action_ft: 21.0,
            minor_flood_ft: 23.0,
            moderate_flood_ft: 30.0,
            major_flood_ft: 38.0,
        };
        let thresholds = FloodThresholds::from(&config);
        assert_eq!(thresholds.ordered(), [21.0, 23.0, 30.0, 38.0]);
    }

    #[test]
    fn test_rejects_unordered_thresholds() {
        let bad = MINIMAL.replace("minor_flood_ft = 23.0", "minor_flood_ft = 20.0");
        let err = parse_config(&bad).unwrap_err();
        assert!(
            matches!(err, ConfigError::ThresholdOrder { ref gauge, .. } if gauge == "McAlpine"),
            "got {:?}",
            err
        );
    }

    #[test]
    fn test_rejects_unknown_reach_gauge() {
        let bad = MINIMAL.replace("upstream = \"Markland\"", "upstream = \"Cannelton\"");
        assert!(matches!(
            parse_config(&bad),
            Err(ConfigError::UnknownGauge { role: "upstream", .. })
        ));
    }

    #[test]
    fn test_rejects_reversed_reach() {
        let bad = MINIMAL
            .replace("upstream = \"Markland\"", "upstream = \"X\"")
            .replace("downstream = \"McAlpine\"", "downstream = \"Markland\"")
            .replace("upstream = \"X\"", "upstream = \"McAlpine\"");
        assert!(matches!(
            parse_config(&bad),
            Err(ConfigError::NonPositivePool { .. })
        ));
    }

    #[test]
    fn test_rejects_duplicate_gauge_names() {
        let bad = MINIMAL.replace("name = \"McAlpine\"", "name = \"Markland\"");
        assert!(matches!(parse_config(&bad), Err(ConfigError::DuplicateGauge(_))));
    }

    #[test]
    fn test_rejects_gauge_names_differing_only_in_case() {
        let bad = MINIMAL.replace("name = \"McAlpine\"", "name = \"markland\"");
        match parse_config(&bad) {
            Err(ConfigError::DuplicateGauge(name)) => assert_eq!(name, "markland"),
            other => panic!("expected DuplicateGauge, got {:?}", other.map(|s| s.gauges.len())),
        }
    }

    #[test]
    fn test_rejects_wrong_interval_count() {
        let bad = MINIMAL.replace(
            "downstream = \"McAlpine\"",
            "downstream = \"McAlpine\"\nintervals_secs = [100, 50]",
        );
        assert!(matches!(parse_config(&bad), Err(ConfigError::PublishIntervals(_))));
    }

    #[test]
    fn test_explicit_config_path_wins() {
        let path = config_path(Some(Path::new("/tmp/other.toml")));
        assert_eq!(path, PathBuf::from("/tmp/other.toml"));
    }
}
