/// Scrape-date extraction from page comments.
///
/// The river pages embed a generation timestamp in an HTML comment. The first
/// fully qualified date-time (date plus `H:MM:SS` clock) found across the
/// comments, in document order, becomes the reference instant for resolving
/// year-less fragments. When none qualifies the extraction degrades to the
/// current time and says so.

use crate::dates::resolve::to_24_hour;
use crate::logging::{self, DataSource};
use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use regex::{Captures, Regex};
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateConfidence {
    Found,
    /// No comment contained a qualifying date; the clock was used instead.
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrapeDate {
    pub instant: DateTime<Utc>,
    pub confidence: DateConfidence,
}

impl ScrapeDate {
    pub fn is_degraded(&self) -> bool {
        self.confidence == DateConfidence::Degraded
    }
}

const TZ: &str = r"(?:\s*(?P<tz>UTC|GMT|Z|EST|EDT|CST|CDT|MST|MDT|PST|PDT)\b)?";
const CLOCK: &str = r"(?P<h>\d{1,2}):(?P<mi>\d{2}):(?P<s>\d{2})";
const MERIDIEM: &str = r"(?:\s*(?P<ampm>AM|PM)\b)?";
const MONTH: &str = r"(?P<mon>Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)[a-z]*\.?";

static PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // 2019-12-04 22:06:13 UTC
        format!(r"(?i)\b(?P<y>\d{{4}})-(?P<mo>\d{{1,2}})-(?P<d>\d{{1,2}})[ T_]{CLOCK}{TZ}"),
        // 12/04/2019 10:06:13 PM EST
        format!(r"(?i)\b(?P<mo>\d{{1,2}})/(?P<d>\d{{1,2}})/(?P<y>\d{{4}}),?\s+{CLOCK}{MERIDIEM}{TZ}"),
        // December 4, 2019 10:06:13 PM
        format!(r"(?i)\b{MONTH}\s+(?P<d>\d{{1,2}}),?\s+(?P<y>\d{{4}}),?\s+(?:at\s+)?{CLOCK}{MERIDIEM}{TZ}"),
        // Wed Dec  4 22:06:13 EST 2019
        format!(r"(?i)\b{MONTH}\s+(?P<d>\d{{1,2}})\s+{CLOCK}{TZ}\s+(?P<y>\d{{4}})\b"),
    ]
    .iter()
    .map(|p| Regex::new(p).expect("scrape date pattern is valid"))
    .collect()
});

fn month_number(name: &str) -> Option<u32> {
    let prefix = name.get(..3)?.to_ascii_lowercase();
    let months = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    months
        .iter()
        .position(|m| *m == prefix)
        .map(|i| i as u32 + 1)
}

/// Offset east of UTC, in hours, for the zone labels the pages use.
fn zone_offset_hours(label: &str) -> Option<i32> {
    match label.to_ascii_uppercase().as_str() {
        "UTC" | "GMT" | "Z" => Some(0),
        "EST" => Some(-5),
        "EDT" => Some(-4),
        "CST" => Some(-6),
        "CDT" => Some(-5),
        "MST" => Some(-7),
        "MDT" => Some(-6),
        "PST" => Some(-8),
        "PDT" => Some(-7),
        _ => None,
    }
}

fn instant_from(caps: &Captures) -> Option<DateTime<Utc>> {
    let num = |name: &str| caps.name(name)?.as_str().parse::<u32>().ok();

    let year: i32 = caps.name("y")?.as_str().parse().ok()?;
    let month = match caps.name("mon") {
        Some(name) => month_number(name.as_str())?,
        None => num("mo")?,
    };
    let hour = to_24_hour(num("h")?, caps.name("ampm").map(|m| m.as_str()))?;

    let naive = NaiveDate::from_ymd_opt(year, month, num("d")?)?.and_hms_opt(
        hour,
        num("mi")?,
        num("s")?,
    )?;

    let offset_hours = match caps.name("tz") {
        Some(tz) => zone_offset_hours(tz.as_str())?,
        None => 0,
    };
    let zone = FixedOffset::east_opt(offset_hours * 3600)?;
    zone.from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Finds the earliest fully qualified date-time in `text`.
pub fn find_timestamp(text: &str) -> Option<DateTime<Utc>> {
    PATTERNS
        .iter()
        .flat_map(|pattern| {
            pattern
                .captures_iter(text)
                .filter_map(|caps| {
                    let start = caps.get(0)?.start();
                    instant_from(&caps).map(|instant| (start, instant))
                })
                .take(1)
        })
        .min_by_key(|(start, _)| *start)
        .map(|(_, instant)| instant)
}

/// Scans comment texts in order; the first qualifying date-time wins.
pub fn extract_scrape_date_at<S: AsRef<str>>(comments: &[S], now: DateTime<Utc>) -> ScrapeDate {
    for comment in comments {
        if let Some(instant) = find_timestamp(comment.as_ref()) {
            return ScrapeDate {
                instant,
                confidence: DateConfidence::Found,
            };
        }
    }

    logging::warn(
        DataSource::Date,
        None,
        &format!(
            "No scrape date in {} page comments; using current time {}",
            comments.len(),
            now.to_rfc3339()
        ),
    );
    ScrapeDate {
        instant: now,
        confidence: DateConfidence::Degraded,
    }
}

pub fn extract_scrape_date<S: AsRef<str>>(comments: &[S]) -> ScrapeDate {
    extract_scrape_date_at(comments, Utc::now())
}
