/// Per-gauge classification of a page cycle's readings.
///
/// `classify` takes every resolved reading produced from a page (annotations
/// and table rows alike, before de-duplication) and picks out, per gauge:
/// the current reading, the highest observed level and the highest forecast
/// level. The maps are partial: a gauge missing a kind simply has no entry.
///
/// The integration test at the bottom of this module runs the full
/// page → parse → resolve → classify chain on the captured fixtures.

use std::collections::BTreeMap;

use crate::logging::{self, DataSource};
use crate::model::{Basis, ObservationKind, ResolvedReading};

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    pub latest: BTreeMap<String, ResolvedReading>,
    pub highest_observed: BTreeMap<String, ResolvedReading>,
    pub highest_forecast: BTreeMap<String, ResolvedReading>,
}

impl Classification {
    pub fn is_empty(&self) -> bool {
        self.latest.is_empty() && self.highest_observed.is_empty() && self.highest_forecast.is_empty()
    }

    /// Folds another page's classification in, applying the same rules as
    /// if its readings had been classified together with ours.
    pub fn absorb(&mut self, other: Classification) {
        for (_, reading) in other.latest {
            keep_first(&mut self.latest, reading);
        }
        for (_, reading) in other.highest_observed {
            keep_greatest(&mut self.highest_observed, reading);
        }
        for (_, reading) in other.highest_forecast {
            keep_greatest(&mut self.highest_forecast, reading);
        }
    }

    /// Replaces everything held for `gauge` with a fresh page's result.
    /// Other gauges are untouched.
    pub fn replace_gauge(&mut self, gauge: &str, fresh: Classification) {
        self.latest.remove(gauge);
        self.highest_observed.remove(gauge);
        self.highest_forecast.remove(gauge);
        self.absorb(fresh);
    }
}

/// First "Latest" per gauge wins; extras are logged.
fn keep_first(map: &mut BTreeMap<String, ResolvedReading>, reading: ResolvedReading) {
    match map.get(&reading.gauge) {
        Some(kept) => logging::warn(
            DataSource::Parse,
            Some(&reading.gauge),
            &format!(
                "Extra latest reading {} ft at {} ignored; keeping {} ft at {}",
                reading.level_ft, reading.timestamp, kept.level_ft, kept.timestamp
            ),
        ),
        None => {
            map.insert(reading.gauge.clone(), reading);
        }
    }
}

/// Greatest level per gauge wins; ties keep the first seen.
fn keep_greatest(map: &mut BTreeMap<String, ResolvedReading>, reading: ResolvedReading) {
    let replace = map
        .get(&reading.gauge)
        .is_none_or(|kept| reading.level_ft > kept.level_ft);
    if replace {
        map.insert(reading.gauge.clone(), reading);
    }
}

pub fn classify(readings: &[ResolvedReading]) -> Classification {
    let mut classification = Classification::default();

    for reading in readings {
        match (reading.kind, reading.basis) {
            (ObservationKind::Latest, _) => keep_first(&mut classification.latest, reading.clone()),
            (ObservationKind::Highest, Basis::Observation) => {
                keep_greatest(&mut classification.highest_observed, reading.clone())
            }
            (ObservationKind::Highest, Basis::Forecast) => {
                keep_greatest(&mut classification.highest_forecast, reading.clone())
            }
            _ => {}
        }
    }

    classification
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
