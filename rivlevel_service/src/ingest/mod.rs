/// Page ingestion: fetching river pages and turning their annotations and
/// tables into parsed observation records.
///
/// - `page`: HTTP fetch, raw-page cache and the `GaugePage` document model
/// - `annotations`: hydrograph `<area>` alt/title text
/// - `tabular`: observed/forecast table sections
/// - `fixtures` (test only): captured pages

pub mod annotations;
pub mod page;
pub mod tabular;

#[cfg(test)]
pub(crate) mod fixtures;
