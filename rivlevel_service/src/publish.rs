/// Status publication.
///
/// Builds the bounded-length status message from the latest readings and
/// the projected level, hands it to a `Publisher`, and keeps the small piece
/// of state (when we last published, and at what level) that survives
/// restarts.

use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::alert::thresholds::{FloodAction, flood_action, most_severe};
use crate::analysis::classify::Classification;
use crate::analysis::projection::Projection;
use crate::config::PublishSettings;
use crate::gauges::find_gauge;
use crate::logging::{self, DataSource};
use crate::model::{GaugeDefinition, ResolvedReading};

pub const WEBHOOK_URL_VAR: &str = "PUBLISH_WEBHOOK_URL";
pub const TOKEN_VAR: &str = "PUBLISH_TOKEN";

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("publish request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("publish endpoint returned HTTP status {0}")]
    Status(u16),

    #[error("publish state {path}: {source}")]
    StateIo {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("publish state {path} is not valid JSON: {source}")]
    StateFormat {
        path: PathBuf,
        source: serde_json::Error,
    },
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Truncates to at most `max_chars` characters.
pub fn truncate_message(message: &str, max_chars: usize) -> String {
    match message.char_indices().nth(max_chars) {
        Some((cut, _)) => message[..cut].to_string(),
        None => message.to_string(),
    }
}

pub fn build_status_message(
    classification: &Classification,
    projection: &Projection,
    settings: &PublishSettings,
) -> String {
    let up = &projection.upstream;
    let down = &projection.downstream;
    let mut message = format!(
        "Latest Observation: {} {:.2} {} {:.2} Calculated Level at {}: {:.2}",
        up.name, up.level_ft, down.name, down.level_ft, settings.location_name, projection.level_ft
    );

    for gauge in [&up.name, &down.name] {
        if let Some(forecast) = classification.highest_forecast.get(gauge) {
            message.push_str(&format!(" Highest Forecast: {} {:.2}", gauge, forecast.level_ft));
        }
    }

    if let Some(note) = &settings.source_note {
        message.push_str(" ::: ");
        message.push_str(note);
    }

    truncate_message(&message, settings.max_length)
}

/// Most severe flood action among gauges with a latest reading.
pub fn reach_action(
    latest: &BTreeMap<String, ResolvedReading>,
    gauges: &[GaugeDefinition],
) -> FloodAction {
    most_severe(latest.values().filter_map(|reading| {
        let gauge = find_gauge(gauges, &reading.gauge)?;
        Some(flood_action(reading.level_ft, &gauge.thresholds))
    }))
}

// ---------------------------------------------------------------------------
// Persistent state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PublishState {
    pub last_published: Option<DateTime<Utc>>,
    pub last_level_ft: Option<f64>,
    pub last_action: Option<FloodAction>,
}

impl PublishState {
    /// Loads saved state; a missing file means nothing has been published.
    pub fn load(path: &Path) -> Result<Self, PublishError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(PublishError::StateIo {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_str(&text).map_err(|source| PublishError::StateFormat {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), PublishError> {
        let text = serde_json::to_string_pretty(self).map_err(|source| PublishError::StateFormat {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, text).map_err(|source| PublishError::StateIo {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn record(&mut self, at: DateTime<Utc>, level_ft: f64, action: FloodAction) {
        self.last_published = Some(at);
        self.last_level_ft = Some(level_ft);
        self.last_action = Some(action);
    }
}

// ---------------------------------------------------------------------------
// Publishers
// ---------------------------------------------------------------------------

pub trait Publisher {
    fn publish(&mut self, message: &str) -> Result<(), PublishError>;
}

impl<P: Publisher + ?Sized> Publisher for Box<P> {
    fn publish(&mut self, message: &str) -> Result<(), PublishError> {
        (**self).publish(message)
    }
}

/// Posts `{"status": message}` to a webhook.
pub struct WebhookPublisher {
    client: Client,
    url: String,
    token: Option<String>,
}

impl WebhookPublisher {
    pub fn new(url: String, token: Option<String>, timeout: Duration) -> Result<Self, PublishError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(WebhookPublisher { client, url, token })
    }

    /// Builds a publisher from `PUBLISH_WEBHOOK_URL` / `PUBLISH_TOKEN`.
    /// `None` when no webhook is configured.
    pub fn from_env(timeout: Duration) -> Result<Option<Self>, PublishError> {
        let Some(url) = std::env::var(WEBHOOK_URL_VAR).ok().filter(|u| !u.is_empty()) else {
            return Ok(None);
        };
        let token = std::env::var(TOKEN_VAR).ok().filter(|t| !t.is_empty());
        Self::new(url, token, timeout).map(Some)
    }
}

impl Publisher for WebhookPublisher {
    fn publish(&mut self, message: &str) -> Result<(), PublishError> {
        let mut request = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "status": message }));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send()?;
        if !response.status().is_success() {
            return Err(PublishError::Status(response.status().as_u16()));
        }
        logging::info(DataSource::Publish, None, &format!("Published: {}", message));
        Ok(())
    }
}

/// Dry-run publisher: logs the message instead of sending it.
#[derive(Debug, Default)]
pub struct LogPublisher;

impl Publisher for LogPublisher {
    fn publish(&mut self, message: &str) -> Result<(), PublishError> {
        logging::info(DataSource::Publish, None, &format!("[dry run] {}", message));
        Ok(())
    }
}
