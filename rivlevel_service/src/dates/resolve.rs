/// Year resolution for year-less date/time fragments.
///
/// Gauge pages print observation and forecast times as `MM/DD HH:MM[AM|PM]`
/// with no year. The year is inferred from the page's scrape date: of the
/// previous, current and following year, the candidate closest to the
/// reference instant wins. Near a year boundary this means a December
/// observation read in early January lands in the previous year, and a
/// January forecast read in late December lands in the next one.

use crate::model::{ParsedRecord, ResolvedReading};
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DateError {
    #[error("malformed date/time fragment '{0}'")]
    MalformedFragment(String),

    #[error("malformed month/day in '{0}'")]
    MalformedDate(String),

    #[error("malformed clock time in '{0}'")]
    MalformedTime(String),

    #[error("{month:02}/{day:02} does not exist in any candidate year around {reference_year}")]
    NoSuchDate {
        month: u32,
        day: u32,
        reference_year: i32,
    },
}

/// A parsed fragment: calendar month/day and a 24-hour clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthDayTime {
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
}

impl MonthDayTime {
    /// Renders the fragment in canonical `MM/DD HH:MMAM|PM` form.
    pub fn canonical(&self) -> String {
        let (hour12, meridiem) = match self.hour {
            0 => (12, "AM"),
            1..=11 => (self.hour, "AM"),
            12 => (12, "PM"),
            h => (h - 12, "PM"),
        };
        format!(
            "{:02}/{:02} {:02}:{:02}{}",
            self.month, self.day, hour12, self.minute, meridiem
        )
    }

    fn on_year(&self, year: i32) -> Option<DateTime<Utc>> {
        let naive = NaiveDate::from_ymd_opt(year, self.month, self.day)?
            .and_hms_opt(self.hour, self.minute, 0)?;
        Some(Utc.from_utc_datetime(&naive))
    }
}

/// Converts a 12-hour clock reading to 24-hour form. `meridiem` is `None`
/// for a 24-hour clock value. 12 AM is midnight.
pub(crate) fn to_24_hour(hour: u32, meridiem: Option<&str>) -> Option<u32> {
    match meridiem.map(|m| m.to_ascii_uppercase()) {
        None => (hour < 24).then_some(hour),
        Some(m) if (1..=12).contains(&hour) => match m.as_str() {
            "AM" => Some(if hour == 12 { 0 } else { hour }),
            "PM" => Some(if hour == 12 { 12 } else { hour + 12 }),
            _ => None,
        },
        Some(_) => None,
    }
}

fn parse_clock(fragment: &str, clock: &str) -> Result<(u32, u32), DateError> {
    let bad = || DateError::MalformedTime(fragment.to_string());
    let upper = clock.to_ascii_uppercase();

    let (digits, meridiem) = if let Some(rest) = upper.strip_suffix("AM") {
        (rest, Some("AM"))
    } else if let Some(rest) = upper.strip_suffix("PM") {
        (rest, Some("PM"))
    } else {
        (upper.as_str(), None)
    };

    let (h, m) = digits.split_once(':').ok_or_else(bad)?;
    let hour: u32 = h.parse().map_err(|_| bad())?;
    let minute: u32 = m.parse().map_err(|_| bad())?;
    if minute > 59 {
        return Err(bad());
    }
    let hour = to_24_hour(hour, meridiem).ok_or_else(bad)?;
    Ok((hour, minute))
}

/// Parses `"MM/DD HH:MM[AM|PM]"`. The clock may also be split from its
/// meridiem (`"9:00 PM"`) or given in 24-hour form (`"18:00"`).
pub fn parse_fragment(fragment: &str) -> Result<MonthDayTime, DateError> {
    let mut tokens = fragment.split_whitespace();
    let date_part = tokens
        .next()
        .ok_or_else(|| DateError::MalformedFragment(fragment.to_string()))?;
    let clock: String = tokens.collect();
    if clock.is_empty() {
        return Err(DateError::MalformedFragment(fragment.to_string()));
    }

    let bad_date = || DateError::MalformedDate(fragment.to_string());
    let (m, d) = date_part.split_once('/').ok_or_else(bad_date)?;
    let month: u32 = m.parse().map_err(|_| bad_date())?;
    let day: u32 = d.parse().map_err(|_| bad_date())?;
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return Err(bad_date());
    }

    let (hour, minute) = parse_clock(fragment, &clock)?;
    Ok(MonthDayTime { month, day, hour, minute })
}

/// Resolves a year-less fragment to the candidate instant nearest `reference`.
///
/// Ties go to the reference year. Seconds are always zero.
pub fn resolve(fragment: &str, reference: DateTime<Utc>) -> Result<DateTime<Utc>, DateError> {
    let parts = parse_fragment(fragment)?;
    resolve_parts(&parts, reference)
}

pub fn resolve_parts(
    parts: &MonthDayTime,
    reference: DateTime<Utc>,
) -> Result<DateTime<Utc>, DateError> {
    let reference_year = reference.year();
    (reference_year - 1..=reference_year + 1)
        .filter_map(|year| parts.on_year(year))
        .min_by_key(|candidate| {
            (
                (*candidate - reference).num_seconds().abs(),
                candidate.year() != reference_year,
            )
        })
        .ok_or(DateError::NoSuchDate {
            month: parts.month,
            day: parts.day,
            reference_year,
        })
}

/// Resolves a parsed record into a reading.
///
/// A year printed on the page takes precedence over inference.
pub fn resolve_record(
    record: ParsedRecord,
    reference: DateTime<Utc>,
) -> Result<ResolvedReading, DateError> {
    let parts = parse_fragment(&record.datetime_fragment)?;
    let timestamp = match record.stated_year {
        Some(year) => parts.on_year(year).ok_or(DateError::NoSuchDate {
            month: parts.month,
            day: parts.day,
            reference_year: year,
        })?,
        None => resolve_parts(&parts, reference)?,
    };

    Ok(ResolvedReading {
        gauge: record.gauge,
        kind: record.kind,
        basis: record.basis,
        level_ft: record.level_ft,
        flow_kcfs: record.flow_kcfs,
        timestamp,
        mile_marker: record.mile_marker,
        datum_elevation_ft: record.datum_elevation_ft,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Basis, ObservationKind};
    use chrono::Timelike;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_december_fragment_read_in_january_is_previous_year() {
        let resolved = resolve("12/31 11:59PM", utc(2020, 1, 2, 0, 0)).unwrap();
        assert_eq!(resolved, utc(2019, 12, 31, 23, 59));
    }

    #[test]
    fn test_midnight_forecast_crosses_into_next_year() {
        let resolved = resolve("01/01 12:00AM", utc(2019, 12, 30, 0, 0)).unwrap();
        assert_eq!(resolved, utc(2020, 1, 1, 0, 0));
    }

    #[test]
    fn test_mid_year_fragment_stays_in_reference_year() {
        let resolved = resolve("12/05 06:00PM", utc(2019, 12, 4, 22, 6)).unwrap();
        assert_eq!(resolved, utc(2019, 12, 5, 18, 0));
        assert_eq!(resolved.second(), 0);
    }

    #[test]
    fn test_noon_and_midnight_conversion() {
        let reference = utc(2019, 6, 15, 0, 0);
        assert_eq!(resolve("06/15 12:30PM", reference).unwrap().hour(), 12);
        assert_eq!(resolve("06/15 12:30AM", reference).unwrap().hour(), 0);
        assert_eq!(resolve("06/15 1:05PM", reference).unwrap().hour(), 13);
    }

    #[test]
    fn test_split_meridiem_and_24_hour_clock() {
        let reference = utc(2019, 12, 4, 0, 0);
        assert_eq!(resolve("12/04 9:00 PM", reference).unwrap(), utc(2019, 12, 4, 21, 0));
        assert_eq!(resolve("12/05 18:00", reference).unwrap(), utc(2019, 12, 5, 18, 0));
    }

    #[test]
    fn test_unpadded_month_and_day() {
        let resolved = resolve("1/5 7:00AM", utc(2021, 1, 3, 0, 0)).unwrap();
        assert_eq!(resolved, utc(2021, 1, 5, 7, 0));
    }

    #[test]
    fn test_result_always_within_one_year_of_reference() {
        let reference = utc(2020, 1, 1, 0, 30);
        for month in 1..=12u32 {
            for day in [1u32, 15, 28] {
                let fragment = format!("{:02}/{:02} 03:00PM", month, day);
                let resolved = resolve(&fragment, reference).unwrap();
                let distance = (resolved - reference).num_days().abs();
                assert!(
                    distance <= 183,
                    "{} resolved {} days from the reference",
                    fragment,
                    distance
                );
            }
        }
    }

    #[test]
    fn test_leap_day_only_valid_in_leap_candidate() {
        let resolved = resolve("02/29 10:00AM", utc(2021, 3, 1, 0, 0)).unwrap();
        assert_eq!(resolved.year(), 2020);
    }

    #[test]
    fn test_rejects_malformed_fragments() {
        let reference = utc(2019, 12, 4, 0, 0);
        assert!(matches!(
            resolve("1205 06:00PM", reference),
            Err(DateError::MalformedDate(_))
        ));
        assert!(matches!(
            resolve("12/xx 06:00PM", reference),
            Err(DateError::MalformedDate(_))
        ));
        assert!(matches!(
            resolve("12/05 13:00PM", reference),
            Err(DateError::MalformedTime(_))
        ));
        assert!(matches!(
            resolve("12/05", reference),
            Err(DateError::MalformedFragment(_))
        ));
        assert!(matches!(
            resolve("13/05 06:00PM", reference),
            Err(DateError::MalformedDate(_))
        ));
    }

    #[test]
    fn test_impossible_day_reports_no_such_date() {
        let err = resolve("02/30 06:00PM", utc(2019, 12, 4, 0, 0)).unwrap_err();
        assert!(matches!(err, DateError::NoSuchDate { month: 2, day: 30, .. }));
    }

    #[test]
    fn test_canonical_form() {
        let parts = parse_fragment("1/5 18:07").unwrap();
        assert_eq!(parts.canonical(), "01/05 06:07PM");
        let midnight = parse_fragment("12/31 12:00AM").unwrap();
        assert_eq!(midnight.canonical(), "12/31 12:00AM");
    }

    #[test]
    fn test_stated_year_wins_over_inference() {
        let record = ParsedRecord {
            kind: ObservationKind::Highest,
            basis: Basis::Observation,
            level_ft: 12.99,
            flow_kcfs: None,
            datetime_fragment: "12/02 01:35AM".to_string(),
            stated_year: Some(2018),
            gauge: "Markland".to_string(),
            mile_marker: 531.0,
            datum_elevation_ft: 408.0,
        };
        let reading = resolve_record(record, utc(2019, 12, 4, 0, 0)).unwrap();
        assert_eq!(reading.timestamp, utc(2018, 12, 2, 1, 35));
        assert_eq!(reading.gauge, "Markland");
    }
}
