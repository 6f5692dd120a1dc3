//! # Date Intervals
//!
//! A date interval is a contiguous, half-open span of calendar days written in
//! one of the compact forms operators type on the command line: a single day
//! (`2015-03-04`), an ISO week (`2015-W10`), a month (`2012-06`), a year
//! (`2012`), or an explicit range (`2015-03-01-2015-03-08`, stop exclusive).

use std::{fmt, str::FromStr};

use chrono::{Duration, NaiveDate, Weekday};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::value::ParseValueError;

const EXPECTED_INTERVAL: &str = "a date interval (YYYY-MM-DD, YYYY-Www, YYYY-MM, YYYY or YYYY-MM-DD-YYYY-MM-DD)";

static CUSTOM_RANGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4}-\d{2}-\d{2})-(\d{4}-\d{2}-\d{2})$").expect("valid custom range pattern"));
static SINGLE_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid date pattern"));
static ISO_WEEK: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4})-W(\d{2})$").expect("valid week pattern"));
static YEAR_MONTH: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4})-(\d{2})$").expect("valid month pattern"));
static YEAR_ONLY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4})$").expect("valid year pattern"));

/// A half-open span of days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DateInterval {
    Date(NaiveDate),
    Week { year: i32, week: u32 },
    Month { year: i32, month: u32 },
    Year(i32),
    Custom { start: NaiveDate, stop: NaiveDate },
}

impl DateInterval {
    /// First day inside the interval.
    pub fn start(&self) -> NaiveDate {
        match *self {
            DateInterval::Date(date) => date,
            DateInterval::Week { year, week } => iso_week_start(year, week).unwrap_or(NaiveDate::MIN),
            DateInterval::Month { year, month } => NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MIN),
            DateInterval::Year(year) => NaiveDate::from_ymd_opt(year, 1, 1).unwrap_or(NaiveDate::MIN),
            DateInterval::Custom { start, .. } => start,
        }
    }

    /// First day after the interval.
    pub fn stop(&self) -> NaiveDate {
        match *self {
            DateInterval::Date(date) => date + Duration::days(1),
            DateInterval::Week { .. } => self.start() + Duration::days(7),
            DateInterval::Month { year, month } => {
                let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
                NaiveDate::from_ymd_opt(next_year, next_month, 1).unwrap_or(NaiveDate::MAX)
            }
            DateInterval::Year(year) => NaiveDate::from_ymd_opt(year + 1, 1, 1).unwrap_or(NaiveDate::MAX),
            DateInterval::Custom { stop, .. } => stop,
        }
    }

    /// Every day in the interval, in ascending order.
    pub fn dates(&self) -> Vec<NaiveDate> {
        let stop = self.stop();
        let mut current = self.start();
        let mut dates = Vec::new();
        while current < stop {
            dates.push(current);
            current += Duration::days(1);
        }
        dates
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start() <= date && date < self.stop()
    }
}

fn iso_week_start(year: i32, week: u32) -> Option<NaiveDate> {
    NaiveDate::from_isoywd_opt(year, week, Weekday::Mon)
}

fn parse_date(raw: &str) -> Result<NaiveDate, ParseValueError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| ParseValueError::Malformed {
        expected: EXPECTED_INTERVAL,
        value: raw.to_string(),
    })
}

impl FromStr for DateInterval {
    type Err = ParseValueError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let malformed = || ParseValueError::Malformed {
            expected: EXPECTED_INTERVAL,
            value: raw.to_string(),
        };

        if let Some(captures) = CUSTOM_RANGE.captures(trimmed) {
            let start = parse_date(&captures[1])?;
            let stop = parse_date(&captures[2])?;
            if stop <= start {
                return Err(ParseValueError::OutOfRange {
                    value: raw.to_string(),
                    reason: "range stop must come after its start".to_string(),
                });
            }
            return Ok(DateInterval::Custom { start, stop });
        }
        if SINGLE_DATE.is_match(trimmed) {
            return parse_date(trimmed).map(DateInterval::Date);
        }
        if let Some(captures) = ISO_WEEK.captures(trimmed) {
            let year: i32 = captures[1].parse().map_err(|_| malformed())?;
            let week: u32 = captures[2].parse().map_err(|_| malformed())?;
            iso_week_start(year, week).ok_or_else(malformed)?;
            return Ok(DateInterval::Week { year, week });
        }
        if let Some(captures) = YEAR_MONTH.captures(trimmed) {
            let year: i32 = captures[1].parse().map_err(|_| malformed())?;
            let month: u32 = captures[2].parse().map_err(|_| malformed())?;
            if !(1..=12).contains(&month) {
                return Err(malformed());
            }
            return Ok(DateInterval::Month { year, month });
        }
        if let Some(captures) = YEAR_ONLY.captures(trimmed) {
            let year: i32 = captures[1].parse().map_err(|_| malformed())?;
            return Ok(DateInterval::Year(year));
        }
        Err(malformed())
    }
}

impl fmt::Display for DateInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateInterval::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            DateInterval::Week { year, week } => write!(f, "{year:04}-W{week:02}"),
            DateInterval::Month { year, month } => write!(f, "{year:04}-{month:02}"),
            DateInterval::Year(year) => write!(f, "{year:04}"),
            DateInterval::Custom { start, stop } => write!(f, "{}-{}", start.format("%Y-%m-%d"), stop.format("%Y-%m-%d")),
        }
    }
}

impl Serialize for DateInterval {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for DateInterval {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn month_interval_covers_every_day() {
        let interval: DateInterval = "2012-06".parse().unwrap();
        let dates = interval.dates();
        assert_eq!(dates.len(), 30);
        assert_eq!(dates.first(), Some(&day(2012, 6, 1)));
        assert_eq!(dates.last(), Some(&day(2012, 6, 30)));
    }

    #[test]
    fn iso_week_starts_on_monday() {
        let interval: DateInterval = "2015-W10".parse().unwrap();
        assert_eq!(interval.start(), day(2015, 3, 2));
        assert_eq!(interval.stop(), day(2015, 3, 9));
        assert!(interval.contains(day(2015, 3, 4)));
    }

    #[test]
    fn custom_range_is_half_open() {
        let interval: DateInterval = "2015-03-01-2015-03-03".parse().unwrap();
        assert_eq!(interval.dates(), vec![day(2015, 3, 1), day(2015, 3, 2)]);
        assert_eq!(interval.to_string(), "2015-03-01-2015-03-03");
    }

    #[test]
    fn december_rolls_into_next_year() {
        let interval: DateInterval = "2019-12".parse().unwrap();
        assert_eq!(interval.stop(), day(2020, 1, 1));
    }

    #[test]
    fn rejects_malformed_and_inverted_ranges() {
        assert!("2015-13".parse::<DateInterval>().is_err());
        assert!("2015-W60".parse::<DateInterval>().is_err());
        assert!("yesterday".parse::<DateInterval>().is_err());
        assert!(matches!(
            "2015-03-05-2015-03-01".parse::<DateInterval>(),
            Err(ParseValueError::OutOfRange { .. })
        ));
    }
}
