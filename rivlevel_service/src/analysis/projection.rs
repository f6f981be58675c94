/// Water-level projection between two gauges.
///
/// The river surface between an upstream and a downstream gauge is treated as
/// a straight line. Levels are first put on a common datum (each gauge reads
/// relative to its own zero elevation), the per-mile slope is taken over the
/// pool, and the level at the target mile is extrapolated back from the
/// downstream gauge.

use std::collections::BTreeMap;

use crate::config::ConfigError;
use crate::model::{GaugeDefinition, GaugeReading, ResolvedReading};

/// Level at `target_mile` in the downstream gauge's datum.
///
/// The caller guarantees a positive pool length; `Reach::new` checks it once
/// at startup.
pub fn project(upstream: &GaugeReading, downstream: &GaugeReading, target_mile: f64) -> f64 {
    let raw_slope = upstream.level_ft - downstream.level_ft;
    let elevation_correction = upstream.datum_elevation_ft - downstream.datum_elevation_ft;
    let corrected_slope = raw_slope - elevation_correction;
    let pool_length = downstream.mile_marker - upstream.mile_marker;
    let per_mile_slope = corrected_slope / pool_length;
    (downstream.mile_marker - target_mile) * per_mile_slope + downstream.level_ft
}

#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub upstream: GaugeReading,
    pub downstream: GaugeReading,
    pub target_mile: f64,
    pub level_ft: f64,
}

/// A validated upstream/downstream gauge pair and the mile of interest.
#[derive(Debug, Clone, PartialEq)]
pub struct Reach {
    upstream: String,
    downstream: String,
    target_mile: f64,
}

impl Reach {
    pub fn new(
        upstream: &GaugeDefinition,
        downstream: &GaugeDefinition,
        target_mile: f64,
    ) -> Result<Self, ConfigError> {
        let pool_length = downstream.mile_marker - upstream.mile_marker;
        if pool_length.is_nan() || pool_length <= 0.0 {
            return Err(ConfigError::NonPositivePool {
                upstream: upstream.name.clone(),
                downstream: downstream.name.clone(),
                pool_length,
            });
        }
        Ok(Reach {
            upstream: upstream.name.clone(),
            downstream: downstream.name.clone(),
            target_mile,
        })
    }

    pub fn upstream(&self) -> &str {
        &self.upstream
    }

    pub fn downstream(&self) -> &str {
        &self.downstream
    }

    pub fn target_mile(&self) -> f64 {
        self.target_mile
    }

    /// Projects from the latest reading of each end. `None` until both ends
    /// have reported.
    pub fn project_latest(&self, latest: &BTreeMap<String, ResolvedReading>) -> Option<Projection> {
        let upstream = GaugeReading::from(latest.get(&self.upstream)?);
        let downstream = GaugeReading::from(latest.get(&self.downstream)?);
        let level_ft = project(&upstream, &downstream, self.target_mile);
        Some(Projection {
            upstream,
            downstream,
            target_mile: self.target_mile,
            level_ft,
        })
    }
}
