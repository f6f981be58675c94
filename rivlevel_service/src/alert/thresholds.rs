//! Flood-action levels.
//!
//! A gauge's action level is derived on demand from its latest reading and
//! its configured thresholds. The most severe level across the monitored
//! reach sets how often status messages go out.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::FloodThresholds;

/// Flood-action levels, in ascending order of severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FloodAction {
    NoFlooding,
    FirstAction,
    MinorFlood,
    ModerateFlood,
    MajorFlood,
}

impl FloodAction {
    pub const ALL: [FloodAction; 5] = [
        FloodAction::NoFlooding,
        FloodAction::FirstAction,
        FloodAction::MinorFlood,
        FloodAction::ModerateFlood,
        FloodAction::MajorFlood,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            FloodAction::NoFlooding => "No Flooding",
            FloodAction::FirstAction => "First-action",
            FloodAction::MinorFlood => "Minor-flood",
            FloodAction::ModerateFlood => "Moderate-flood",
            FloodAction::MajorFlood => "Major-flood",
        }
    }

    /// Position in ascending severity, used to index per-level settings.
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for FloodAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Highest threshold the level has reached. Reaching a threshold exactly
/// counts as reaching it.
pub fn flood_action(level_ft: f64, thresholds: &FloodThresholds) -> FloodAction {
    thresholds
        .ordered()
        .iter()
        .zip(&FloodAction::ALL[1..])
        .rev()
        .find(|(threshold, _)| level_ft >= **threshold)
        .map(|(_, action)| *action)
        .unwrap_or(FloodAction::NoFlooding)
}

pub fn most_severe<I: IntoIterator<Item = FloodAction>>(actions: I) -> FloodAction {
    actions.into_iter().max().unwrap_or(FloodAction::NoFlooding)
}

/// Minimum spacing between status messages at `action`. `intervals_secs`
/// is indexed by severity and validated to hold five entries at load time.
pub fn publish_interval(action: FloodAction, intervals_secs: &[u64]) -> Duration {
    let secs = intervals_secs
        .get(action.index())
        .or(intervals_secs.last())
        .copied()
        .unwrap_or(0);
    Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX / 1000))
}
