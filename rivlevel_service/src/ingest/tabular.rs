/// Observed/forecast table parsing.
///
/// Table sections list readings as (datetime, level, flow) cell triples, e.g.
/// `12/04 18:00 | 27.80ft | 175kcfs`. They are the only source of flow
/// values. Rows are turned into `ParsedRecord`s and go through the same year
/// resolution and de-duplication as the annotations.

use crate::dates::resolve::parse_fragment;
use crate::ingest::annotations::parse_level;
use crate::ingest::page::TableSection;
use crate::logging::{self, DataSource};
use crate::model::{Basis, GaugeDefinition, ObservationKind, ParsedRecord};

fn section_kind(name: &str) -> Option<(ObservationKind, Basis)> {
    match name.trim_end_matches(':').to_ascii_lowercase().as_str() {
        "observed" | "observation" | "observations" => {
            Some((ObservationKind::Observed, Basis::Observation))
        }
        "forecast" | "forecasts" => Some((ObservationKind::Forecast, Basis::Forecast)),
        _ => None,
    }
}

/// Parses a flow cell such as `175kcfs`. Missing, malformed and negative
/// (sentinel) values all come back as `None`.
pub fn parse_flow(cell: &str) -> Option<f64> {
    parse_level(cell.trim()).filter(|v| *v >= 0.0)
}

fn parse_row(
    cells: &[String],
    kind: ObservationKind,
    basis: Basis,
    gauge: &GaugeDefinition,
) -> Result<ParsedRecord, String> {
    let [datetime, level, flow] = cells else {
        return Err(format!("incomplete row {:?}", cells));
    };
    let parts = parse_fragment(datetime).map_err(|e| e.to_string())?;
    let level_ft =
        parse_level(level.trim()).ok_or_else(|| format!("level '{}' is not a number", level))?;

    Ok(ParsedRecord {
        kind,
        basis,
        level_ft,
        flow_kcfs: parse_flow(flow),
        datetime_fragment: parts.canonical(),
        stated_year: None,
        gauge: gauge.name.clone(),
        mile_marker: gauge.mile_marker,
        datum_elevation_ft: gauge.datum_elevation_ft,
    })
}

/// Parses every recognised section. Bad rows are logged and dropped.
pub fn parse_sections(sections: &[TableSection], gauge: &GaugeDefinition) -> Vec<ParsedRecord> {
    let mut records = Vec::new();
    for section in sections {
        let Some((kind, basis)) = section_kind(&section.name) else {
            logging::debug(
                DataSource::Parse,
                Some(&gauge.name),
                &format!("Ignoring table section '{}'", section.name),
            );
            continue;
        };

        for row in section.cells.chunks(3) {
            match parse_row(row, kind, basis, gauge) {
                Ok(record) => records.push(record),
                Err(reason) => logging::warn(
                    DataSource::Parse,
                    Some(&gauge.name),
                    &format!("Dropping {} row: {}", section.name, reason),
                ),
            }
        }
    }
    records
}
