/// Date handling for scraped gauge pages.
///
/// - `scrape`: finds the page's generation timestamp in its HTML comments.
/// - `resolve`: turns year-less `MM/DD HH:MM` fragments into UTC instants
///   relative to that timestamp.
///
/// Clock times on the pages are labelled UTC without conversion; only the
/// scrape-date comment carries an explicit zone.

pub mod resolve;
pub mod scrape;

pub use resolve::{DateError, resolve, resolve_record};
pub use scrape::{DateConfidence, ScrapeDate, extract_scrape_date, extract_scrape_date_at};
