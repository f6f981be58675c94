/// Gauge lookup and river-page URL construction.

use crate::config::SourceSettings;
use crate::model::GaugeDefinition;

/// Builds the NWS river page URL for a single forecast point, requesting the
/// observation data in XML-annotated form.
pub fn river_page_url(source: &SourceSettings, point_id: u32) -> String {
    let pt = urlencoding::encode("pt[]");
    let data = urlencoding::encode("data[]");
    format!(
        "{}?wfo={}&wfoid={}&riverid={}&{}={}&allpoints={}&{}=obs&{}=xml",
        source.base_url,
        urlencoding::encode(&source.wfo),
        source.wfoid,
        source.riverid,
        pt,
        point_id,
        point_id,
        data,
        data
    )
}

pub fn find_gauge<'a>(gauges: &'a [GaugeDefinition], name: &str) -> Option<&'a GaugeDefinition> {
    gauges.iter().find(|g| g.name.eq_ignore_ascii_case(name))
}

/// Guesses the gauge of a cached page from its `<stamp>_<gauge>.rawhtml`
/// file name.
pub fn gauge_from_cache_name<'a>(
    gauges: &'a [GaugeDefinition],
    file_name: &str,
) -> Option<&'a GaugeDefinition> {
    let stem = file_name.strip_suffix(".rawhtml")?;
    let (_, name) = stem.rsplit_once('_')?;
    find_gauge(gauges, name)
}
