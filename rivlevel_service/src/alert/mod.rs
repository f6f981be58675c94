/// Flood-action evaluation.
///
/// - `thresholds`: maps a level to its flood-action band and the band to a
///   publication interval.

pub mod thresholds;
