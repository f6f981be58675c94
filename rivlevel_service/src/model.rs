/// Core data types for the river level service.
///
/// This module defines the shared domain model imported by all other modules:
/// gauge definitions, the parsed and resolved observation records that flow
/// through the scrape pipeline, and the `ReadingSet` that enforces the
/// one-reading-per-(timestamp, gauge) rule.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Gauge configuration types
// ---------------------------------------------------------------------------

/// Flood-action thresholds for a gauge, in feet.
///
/// Levels in ascending order:
///   first_action < minor_flood < moderate_flood < major_flood
#[derive(Debug, Clone, PartialEq)]
pub struct FloodThresholds {
    pub first_action_ft: f64,
    pub minor_flood_ft: f64,
    pub moderate_flood_ft: f64,
    pub major_flood_ft: f64,
}

impl FloodThresholds {
    /// Thresholds in ascending severity order.
    pub fn ordered(&self) -> [f64; 4] {
        [
            self.first_action_ft,
            self.minor_flood_ft,
            self.moderate_flood_ft,
            self.major_flood_ft,
        ]
    }

    pub fn is_strictly_increasing(&self) -> bool {
        self.ordered().windows(2).all(|w| w[0] < w[1])
    }
}

/// Static description of one monitored gauge. Loaded once at startup from
/// `gauges.toml` and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct GaugeDefinition {
    pub name: String,
    pub url: String,
    /// River-mile marker; increases downstream along the monitored reach.
    pub mile_marker: f64,
    /// Elevation of the gauge's zero level.
    pub datum_elevation_ft: f64,
    pub thresholds: FloodThresholds,
}

// ---------------------------------------------------------------------------
// Observation records
// ---------------------------------------------------------------------------

/// Semantic tag of a scraped record, taken from the leading token of the
/// annotation text (or from the table section name).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObservationKind {
    Observed,
    Forecast,
    Latest,
    Highest,
}

impl ObservationKind {
    pub fn label(&self) -> &'static str {
        match self {
            ObservationKind::Observed => "Observed",
            ObservationKind::Forecast => "Forecast",
            ObservationKind::Latest => "Latest",
            ObservationKind::Highest => "Highest",
        }
    }
}

impl fmt::Display for ObservationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Whether a record reports a measured value or a forecast one. Needed to
/// tell "Highest Observation" from "Highest Forecast".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Basis {
    Observation,
    Forecast,
}

/// One annotation or table row after parsing, before year resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRecord {
    pub kind: ObservationKind,
    pub basis: Basis,
    pub level_ft: f64,
    /// Flow in kcfs; only the tabular sections publish it.
    pub flow_kcfs: Option<f64>,
    /// Canonical year-less fragment, e.g. `"12/05 06:00PM"`.
    pub datetime_fragment: String,
    /// Year printed on the page next to the fragment, if any.
    pub stated_year: Option<i32>,
    pub gauge: String,
    pub mile_marker: f64,
    pub datum_elevation_ft: f64,
}

/// A record with a fully qualified UTC timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedReading {
    pub gauge: String,
    pub kind: ObservationKind,
    pub basis: Basis,
    pub level_ft: f64,
    pub flow_kcfs: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub mile_marker: f64,
    pub datum_elevation_ft: f64,
}

impl ResolvedReading {
    pub fn key(&self) -> ReadingKey {
        ReadingKey {
            timestamp: self.timestamp,
            gauge: self.gauge.clone(),
        }
    }

    /// Same observation reported twice: equal level, and equal flow when
    /// both sides know it.
    fn same_content(&self, other: &ResolvedReading) -> bool {
        let level_matches = (self.level_ft - other.level_ft).abs() < 1e-6;
        let flow_matches = match (self.flow_kcfs, other.flow_kcfs) {
            (Some(a), Some(b)) => (a - b).abs() < 1e-6,
            _ => true,
        };
        level_matches && flow_matches
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReadingKey {
    pub timestamp: DateTime<Utc>,
    pub gauge: String,
}

/// The minimal view of a gauge the slope projection needs.
#[derive(Debug, Clone, PartialEq)]
pub struct GaugeReading {
    pub name: String,
    pub level_ft: f64,
    pub mile_marker: f64,
    pub datum_elevation_ft: f64,
}

impl From<&ResolvedReading> for GaugeReading {
    fn from(reading: &ResolvedReading) -> Self {
        GaugeReading {
            name: reading.gauge.clone(),
            level_ft: reading.level_ft,
            mile_marker: reading.mile_marker,
            datum_elevation_ft: reading.datum_elevation_ft,
        }
    }
}

// ---------------------------------------------------------------------------
// Duplicate detection
// ---------------------------------------------------------------------------

/// Two records resolved to the same (timestamp, gauge) key but disagree.
#[derive(Debug, Clone, PartialEq, Error)]
#[error(
    "duplicate observation for {gauge} at {timestamp}: kept {existing_level_ft} ft ({existing_kind}), got {incoming_level_ft} ft ({incoming_kind})"
)]
pub struct DuplicateObservation {
    pub gauge: String,
    pub timestamp: DateTime<Utc>,
    pub existing_kind: ObservationKind,
    pub existing_level_ft: f64,
    pub incoming_kind: ObservationKind,
    pub incoming_level_ft: f64,
}

/// What to do with the data when a duplicate key is detected. The condition
/// is reported in every case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicatePolicy {
    /// Keep the reading that arrived first.
    #[default]
    DropNewest,
    /// Replace the stored reading with the one that arrived last.
    DropOldest,
    /// Abandon the gauge's cycle.
    FailCycle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
    Added,
    /// Same key and content already present; a missing flow was filled in.
    Merged,
}

/// Resolved readings keyed uniquely by (timestamp, gauge).
#[derive(Debug, Default)]
pub struct ReadingSet {
    policy: DuplicatePolicy,
    readings: Vec<ResolvedReading>,
    index: HashMap<ReadingKey, usize>,
}

impl ReadingSet {
    pub fn new(policy: DuplicatePolicy) -> Self {
        Self {
            policy,
            readings: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Inserts a reading.
    ///
    /// A conflicting reading for an existing key returns
    /// `Err(DuplicateObservation)`; by the time the error is returned the
    /// set has already applied its policy (`DropOldest` swaps the stored
    /// reading, the other policies leave it alone). `FailCycle` is acted on
    /// by the caller.
    pub fn insert(&mut self, reading: ResolvedReading) -> Result<Insertion, DuplicateObservation> {
        let key = reading.key();
        let Some(&slot) = self.index.get(&key) else {
            self.index.insert(key, self.readings.len());
            self.readings.push(reading);
            return Ok(Insertion::Added);
        };

        let existing = &mut self.readings[slot];
        if existing.same_content(&reading) {
            if existing.flow_kcfs.is_none() {
                existing.flow_kcfs = reading.flow_kcfs;
            }
            return Ok(Insertion::Merged);
        }

        let duplicate = DuplicateObservation {
            gauge: reading.gauge.clone(),
            timestamp: reading.timestamp,
            existing_kind: existing.kind,
            existing_level_ft: existing.level_ft,
            incoming_kind: reading.kind,
            incoming_level_ft: reading.level_ft,
        };
        if self.policy == DuplicatePolicy::DropOldest {
            *existing = reading;
        }
        Err(duplicate)
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Consumes the set, returning readings ordered by timestamp then gauge.
    pub fn into_sorted(mut self) -> Vec<ResolvedReading> {
        self.readings
            .sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.gauge.cmp(&b.gauge)));
        self.readings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
