/// Analysis over resolved readings.
///
/// Submodules:
/// - `classify`   — per-gauge latest / highest-observed / highest-forecast.
/// - `projection` — slope projection of the level at a mile between two gauges.

pub mod classify;
pub mod projection;
