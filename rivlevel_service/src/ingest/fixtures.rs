/// Test fixtures: captured river pages and the gauges they belong to.
///
/// The HTML lives under `tests/data/` so the integration tests can share it.
/// Both pages were generated on 2019-12-04 around 22:06 UTC.
///
/// Page shape:
///   <!-- comment carrying the generation timestamp -->
///   <h1 id="<gauge id>">gauge title</h1>
///   <map> <area alt="..." title="..."> ... </map>
///   <div class="obs_fores">
///     <div> <div class="data_name">Observed ...</div>
///           <div class="names_infos">datetime | level | flow</div> ... </div>
///   </div>
///
/// McAlpine carries one `<area>` with no alt text and a forecast row with a
/// sentinel flow (-999kcfs); Markland has two equal highest forecasts.

use crate::model::{FloodThresholds, GaugeDefinition};

pub(crate) fn fixture_mcalpine_page() -> &'static str {
    include_str!("../../tests/data/mcalpine_page.html")
}

pub(crate) fn fixture_markland_page() -> &'static str {
    include_str!("../../tests/data/markland_page.html")
}

/// McAlpine upper gauge: downstream end of the Markland pool.
pub(crate) fn fixture_mcalpine() -> GaugeDefinition {
    GaugeDefinition {
        name: "McAlpine".to_string(),
        url: "https://water.weather.gov/ahps2/hydrograph.php?wfo=iln&gage=mklk2".to_string(),
        mile_marker: 606.8,
        datum_elevation_ft: 407.18,
        thresholds: FloodThresholds {
            first_action_ft: 21.0,
            minor_flood_ft: 23.0,
            moderate_flood_ft: 30.0,
            major_flood_ft: 38.0,
        },
    }
}

/// Markland dam gauge: upstream end of the pool.
pub(crate) fn fixture_markland() -> GaugeDefinition {
    GaugeDefinition {
        name: "Markland".to_string(),
        url: "https://water.weather.gov/ahps2/river.php?wfo=lmk&pt%5B%5D=142935".to_string(),
        mile_marker: 531.0,
        datum_elevation_ft: 408.0,
        thresholds: FloodThresholds {
            first_action_ft: 49.0,
            minor_flood_ft: 51.0,
            moderate_flood_ft: 62.0,
            major_flood_ft: 74.0,
        },
    }
}
