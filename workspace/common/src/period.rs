//! Calendar periods used by report builds and report grouping.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PeriodError {
    #[error("Invalid period '{0}': expected YYYY-MM-DD or YYYY-MM")]
    Invalid(String),

    #[error("Invalid grouping '{0}': expected day, week or month")]
    InvalidGrouping(String),
}

/// A build period: either a single calendar day or a full calendar month.
///
/// A month is stored as its first day so every value is a valid date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodSpec {
    Day(NaiveDate),
    Month(NaiveDate),
}

impl PeriodSpec {
    /// Month period for `year`/`month`.
    pub fn month(year: i32, month: u32) -> Result<Self, PeriodError> {
        NaiveDate::from_ymd_opt(year, month, 1)
            .map(PeriodSpec::Month)
            .ok_or_else(|| PeriodError::Invalid(format!("{:04}-{:02}", year, month)))
    }

    /// The month containing `date`.
    pub fn month_of(date: NaiveDate) -> Self {
        PeriodSpec::Month(date.with_day(1).unwrap_or(date))
    }

    pub fn is_day(&self) -> bool {
        matches!(self, PeriodSpec::Day(_))
    }

    pub fn is_month(&self) -> bool {
        matches!(self, PeriodSpec::Month(_))
    }

    pub fn first_day(&self) -> NaiveDate {
        match self {
            PeriodSpec::Day(date) => *date,
            PeriodSpec::Month(first) => *first,
        }
    }

    pub fn last_day(&self) -> NaiveDate {
        match self {
            PeriodSpec::Day(date) => *date,
            PeriodSpec::Month(first) => last_day_of_month(*first),
        }
    }

    /// Every day covered by the period, in ascending order.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let last = self.last_day();
        self.first_day().iter_days().take_while(move |day| *day <= last)
    }
}

impl fmt::Display for PeriodSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeriodSpec::Day(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            PeriodSpec::Month(first) => write!(f, "{:04}-{:02}", first.year(), first.month()),
        }
    }
}

impl FromStr for PeriodSpec {
    type Err = PeriodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
            return Ok(PeriodSpec::Day(date));
        }

        let invalid = || PeriodError::Invalid(s.to_string());
        let (year, month) = trimmed.split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        PeriodSpec::month(year, month).map_err(|_| invalid())
    }
}

/// Last calendar day of the month containing `date`.
pub fn last_day_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1)
        .and_then(|first| first.checked_add_months(Months::new(1)))
        .and_then(|next| next.pred_opt())
        .unwrap_or(date)
}

/// Bucket granularity for report queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
    Day,
    Week,
    Month,
}

impl GroupBy {
    /// First day of the bucket containing `date`. Weeks start on Monday.
    pub fn bucket_start(&self, date: NaiveDate) -> NaiveDate {
        match self {
            GroupBy::Day => date,
            GroupBy::Week => {
                let offset = u64::from(date.weekday().num_days_from_monday());
                date.checked_sub_days(Days::new(offset)).unwrap_or(date)
            }
            GroupBy::Month => date.with_day(1).unwrap_or(date),
        }
    }

    /// Last day of the bucket containing `date`.
    pub fn bucket_end(&self, date: NaiveDate) -> NaiveDate {
        match self {
            GroupBy::Day => date,
            GroupBy::Week => {
                let start = self.bucket_start(date);
                start.checked_add_days(Days::new(6)).unwrap_or(start)
            }
            GroupBy::Month => last_day_of_month(date),
        }
    }
}

impl FromStr for GroupBy {
    type Err = PeriodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" => Ok(GroupBy::Day),
            "week" => Ok(GroupBy::Week),
            "month" => Ok(GroupBy::Month),
            _ => Err(PeriodError::InvalidGrouping(s.to_string())),
        }
    }
}

impl fmt::Display for GroupBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GroupBy::Day => "day",
            GroupBy::Week => "week",
            GroupBy::Month => "month",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_day_and_month() {
        assert_eq!(
            "2025-01-05".parse::<PeriodSpec>().unwrap(),
            PeriodSpec::Day(date(2025, 1, 5))
        );
        assert_eq!(
            "2025-02".parse::<PeriodSpec>().unwrap(),
            PeriodSpec::Month(date(2025, 2, 1))
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for input in ["", "2025", "2025-13", "2025-1", "25-01", "2025-02-30", "yesterday"] {
            assert!(input.parse::<PeriodSpec>().is_err(), "{input} should not parse");
        }
    }

    #[test]
    fn test_month_bounds() {
        let feb = PeriodSpec::month(2024, 2).unwrap();
        assert_eq!(feb.first_day(), date(2024, 2, 1));
        assert_eq!(feb.last_day(), date(2024, 2, 29));
        assert_eq!(feb.days().count(), 29);
        assert_eq!(feb.to_string(), "2024-02");

        let dec = PeriodSpec::month_of(date(2024, 12, 17));
        assert_eq!(dec.last_day(), date(2024, 12, 31));
    }

    #[test]
    fn test_day_period_covers_one_day() {
        let day = PeriodSpec::Day(date(2025, 1, 5));
        assert_eq!(day.days().collect::<Vec<_>>(), vec![date(2025, 1, 5)]);
        assert_eq!(day.to_string(), "2025-01-05");
    }

    #[test]
    fn test_week_buckets_start_on_monday() {
        // 2025-01-05 is a Sunday
        assert_eq!(GroupBy::Week.bucket_start(date(2025, 1, 5)), date(2024, 12, 30));
        assert_eq!(GroupBy::Week.bucket_end(date(2025, 1, 5)), date(2025, 1, 5));
        assert_eq!(GroupBy::Week.bucket_start(date(2025, 1, 6)), date(2025, 1, 6));
    }

    #[test]
    fn test_group_by_parse() {
        assert_eq!("Month".parse::<GroupBy>().unwrap(), GroupBy::Month);
        assert!("quarter".parse::<GroupBy>().is_err());
    }
}
