/// Hydrograph annotation parsing.
///
/// Each `<area>` on the hydrograph map describes one reading in free text:
///
///   Highest Observation: 12.99 ft at 1:35AM Dec 02, 2019
///   Latest observed value: 12.95 ft at 9:00 PM EST 4-Dec-2019. Flood Stage is 23 ft
///   Highest Forecast: 12.6 ft 1:00AM Dec 05, 2019
///   Observation: 27.20 ft at 12:00PM Dec 04
///   Forecast: 28.10 ft 7:00AM Dec 05
///
/// `sanitize` rewrites every layout to `[tag, qualifier, level, tail...]` so
/// the level always sits at index 2. The date and time are then picked out of
/// the tail, whatever order and format they come in, and canonicalised to a
/// year-less `MM/DD HH:MMAM|PM` fragment plus the year when one is printed.

use crate::dates::resolve::{MonthDayTime, to_24_hour};
use crate::logging::{self, DataSource};
use crate::model::{Basis, GaugeDefinition, ObservationKind, ParsedRecord};
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

/// alt/title text pair lifted verbatim from an `<area>` element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawAnnotation {
    pub alt: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnnotationError {
    #[error("annotation has no alt or title text")]
    MissingText,

    #[error("unrecognised annotation tag '{0}'")]
    UnknownTag(String),

    #[error("annotation too short to carry a level: '{0}'")]
    TooShort(String),

    #[error("level '{level}' is not a number in '{text}'")]
    BadLevel { level: String, text: String },

    #[error("no date/time in '{0}'")]
    MissingDate(String),
}

static CLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(\d{1,2}):(\d{2})(AM|PM)?$").expect("clock pattern is valid")
});
static MERIDIEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(AM|PM)$").expect("meridiem pattern is valid"));
static MONTH_DAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2})/(\d{1,2})$").expect("month/day pattern is valid"));
static DAY_MON_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2})-([A-Za-z]{3})[A-Za-z]*-(\d{4})$").expect("d-mon-y pattern is valid")
});
static MONTH_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)[a-z]*$")
        .expect("month name pattern is valid")
});
static DAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2})$").expect("day pattern is valid"));
static YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})$").expect("year pattern is valid"));

fn month_number(name: &str) -> Option<u32> {
    let months = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    let prefix = name.get(..3)?.to_ascii_lowercase();
    months.iter().position(|m| *m == prefix).map(|i| i as u32 + 1)
}

fn clean(token: &str) -> &str {
    token.trim_end_matches(['.', ',', ';'])
}

/// Rewrites a tokenised annotation so the level is always at index 2.
///
/// "Latest" records carry two filler words ("observed value:") where the
/// others carry one qualifier; plain "Observation:"/"Forecast:" records carry
/// none. The tag and qualifier are canonicalised on the way.
pub fn sanitize<'a>(tokens: &[&'a str]) -> Result<Vec<&'a str>, AnnotationError> {
    let joined = || tokens.join(" ");
    let first = *tokens.first().ok_or(AnnotationError::MissingText)?;

    let sanitized: Vec<&'a str> = match first {
        "Latest" => {
            if tokens.len() < 4 {
                return Err(AnnotationError::TooShort(joined()));
            }
            ["Latest", "Observation:"]
                .into_iter()
                .chain(tokens[3..].iter().copied())
                .collect()
        }
        "Highest" => tokens.to_vec(),
        "Observation:" | "Observed" | "Observed:" => ["Observed", "Observation:"]
            .into_iter()
            .chain(tokens[1..].iter().copied())
            .collect(),
        "Forecast:" | "Forecast" => ["Forecast", "Forecast:"]
            .into_iter()
            .chain(tokens[1..].iter().copied())
            .collect(),
        other => return Err(AnnotationError::UnknownTag(other.to_string())),
    };

    if sanitized.len() < 3 {
        return Err(AnnotationError::TooShort(joined()));
    }
    Ok(sanitized)
}

fn classify_tag(tag: &str, qualifier: &str) -> Result<(ObservationKind, Basis), AnnotationError> {
    match (tag, qualifier) {
        ("Latest", _) => Ok((ObservationKind::Latest, Basis::Observation)),
        ("Observed", _) => Ok((ObservationKind::Observed, Basis::Observation)),
        ("Forecast", _) => Ok((ObservationKind::Forecast, Basis::Forecast)),
        ("Highest", "Observation:") => Ok((ObservationKind::Highest, Basis::Observation)),
        ("Highest", "Forecast:") => Ok((ObservationKind::Highest, Basis::Forecast)),
        _ => Err(AnnotationError::UnknownTag(format!("{} {}", tag, qualifier))),
    }
}

/// Parses a level token such as `27.80` or `27.80ft`.
pub fn parse_level(token: &str) -> Option<f64> {
    let trimmed = token.trim_end_matches(|c: char| c.is_ascii_alphabetic());
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Picks the clock time and calendar date out of free-text tokens.
///
/// Dates may be `MM/DD`, `D-Mon-YYYY` or `Mon DD[, YYYY]`; the clock may have
/// its meridiem attached or as the next token.
pub fn extract_fragment(tokens: &[&str]) -> Option<(MonthDayTime, Option<i32>)> {
    let mut clock: Option<(u32, u32)> = None;
    let mut date: Option<(u32, u32, Option<i32>)> = None;

    let mut i = 0;
    while i < tokens.len() {
        let token = clean(tokens[i]);

        if clock.is_none() {
            if let Some(caps) = CLOCK.captures(token) {
                let mut meridiem = caps.get(3).map(|m| m.as_str().to_string());
                if meridiem.is_none() {
                    if let Some(next) = tokens.get(i + 1).map(|t| clean(t)) {
                        if MERIDIEM.is_match(next) {
                            meridiem = Some(next.to_string());
                            i += 1;
                        }
                    }
                }
                let hour: u32 = caps[1].parse().ok()?;
                let minute: u32 = caps[2].parse().ok()?;
                let hour = to_24_hour(hour, meridiem.as_deref())?;
                if minute < 60 {
                    clock = Some((hour, minute));
                }
                i += 1;
                continue;
            }
        }

        if date.is_none() {
            if let Some(caps) = MONTH_DAY.captures(token) {
                date = Some((caps[1].parse().ok()?, caps[2].parse().ok()?, None));
            } else if let Some(caps) = DAY_MON_YEAR.captures(token) {
                let month = month_number(&caps[2])?;
                date = Some((month, caps[1].parse().ok()?, caps[3].parse().ok()));
            } else if MONTH_NAME.is_match(token) {
                let day = tokens
                    .get(i + 1)
                    .map(|t| clean(t))
                    .and_then(|t| DAY.captures(t))
                    .and_then(|c| c[1].parse::<u32>().ok());
                if let (Some(month), Some(day)) = (month_number(token), day) {
                    let year = tokens
                        .get(i + 2)
                        .map(|t| clean(t))
                        .and_then(|t| YEAR.captures(t))
                        .and_then(|c| c[1].parse::<i32>().ok());
                    date = Some((month, day, year));
                    i += if year.is_some() { 2 } else { 1 };
                }
            }
        }

        if clock.is_some() && date.is_some() {
            break;
        }
        i += 1;
    }

    let (hour, minute) = clock?;
    let (month, day, year) = date?;
    Some((MonthDayTime { month, day, hour, minute }, year))
}

/// Parses one annotation for `gauge`.
///
/// The alt text is authoritative; the title is used when alt is absent, and
/// as a second place to look for the date when alt carries none.
pub fn parse_annotation(
    raw: &RawAnnotation,
    gauge: &GaugeDefinition,
) -> Result<ParsedRecord, AnnotationError> {
    fn non_empty(s: &Option<String>) -> Option<&str> {
        s.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }
    let alt = non_empty(&raw.alt);
    let title = non_empty(&raw.title);
    let text = alt.or(title).ok_or(AnnotationError::MissingText)?;

    let tokens: Vec<&str> = text.split_whitespace().collect();
    let sanitized = sanitize(&tokens)?;
    let (kind, basis) = classify_tag(sanitized[0], sanitized[1])?;

    let level_ft = parse_level(sanitized[2]).ok_or_else(|| AnnotationError::BadLevel {
        level: sanitized[2].to_string(),
        text: text.to_string(),
    })?;

    let (fragment, stated_year) = extract_fragment(&sanitized[3..])
        .or_else(|| {
            let title_tokens: Vec<&str> = title?.split_whitespace().collect();
            extract_fragment(&title_tokens)
        })
        .ok_or_else(|| AnnotationError::MissingDate(text.to_string()))?;

    Ok(ParsedRecord {
        kind,
        basis,
        level_ft,
        flow_kcfs: None,
        datetime_fragment: fragment.canonical(),
        stated_year,
        gauge: gauge.name.clone(),
        mile_marker: gauge.mile_marker,
        datum_elevation_ft: gauge.datum_elevation_ft,
    })
}

/// Parses one annotation, logging and dropping it on failure.
pub fn parse_record(raw: &RawAnnotation, gauge: &GaugeDefinition) -> Option<ParsedRecord> {
    match parse_annotation(raw, gauge) {
        Ok(record) => Some(record),
        Err(AnnotationError::MissingText) => {
            logging::debug(DataSource::Parse, Some(&gauge.name), "Skipping area with no text");
            None
        }
        Err(e) => {
            logging::warn(
                DataSource::Parse,
                Some(&gauge.name),
                &format!("Dropping annotation: {}", e),
            );
            None
        }
    }
}

pub fn parse_annotations(raws: &[RawAnnotation], gauge: &GaugeDefinition) -> Vec<ParsedRecord> {
    raws.iter().filter_map(|raw| parse_record(raw, gauge)).collect()
}
