//! Calendar month tokens
//!
//! Rent is billed per calendar month. Months travel over the wire and are
//! stored as `"YYYY-MM"` strings; inside the crate they are [`YearMonth`]
//! values that order chronologically and do month arithmetic without
//! going through dates.

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static MONTH_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{2})$").expect("month token pattern is valid"));

/// A calendar month, serialized as `"YYYY-MM"`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct YearMonth {
    year: i32,
    month: u32,
}

/// Errors produced while parsing or validating month selections
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonthError {
    /// Token is not a `"YYYY-MM"` string with month 01..=12
    InvalidFormat { value: String },

    /// No months were selected
    EmptySelection,

    /// The same month appears twice in a selection
    DuplicateMonth { month: YearMonth },

    /// The selection skips a month
    NonContiguous { after: YearMonth, missing: YearMonth },
}

impl fmt::Display for MonthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonthError::InvalidFormat { value } => {
                write!(f, "Invalid month '{}': expected YYYY-MM", value)
            }
            MonthError::EmptySelection => write!(f, "At least one month must be selected"),
            MonthError::DuplicateMonth { month } => {
                write!(f, "Month {} is selected more than once", month)
            }
            MonthError::NonContiguous { after, missing } => {
                write!(
                    f,
                    "Selected months must be contiguous: {} is missing after {}",
                    missing, after
                )
            }
        }
    }
}

impl std::error::Error for MonthError {}

impl YearMonth {
    /// Build a month, rejecting month numbers outside 1..=12 and years outside 1..=9999
    pub fn new(year: i32, month: u32) -> Result<Self, MonthError> {
        if !(1..=12).contains(&month) || !(1..=9999).contains(&year) {
            return Err(MonthError::InvalidFormat {
                value: format!("{:04}-{:02}", year, month),
            });
        }
        Ok(Self { year, month })
    }

    /// Parse a strict `"YYYY-MM"` token
    pub fn parse(value: &str) -> Result<Self, MonthError> {
        let invalid = || MonthError::InvalidFormat {
            value: value.to_string(),
        };

        let caps = MONTH_TOKEN.captures(value).ok_or_else(invalid)?;
        let year: i32 = caps[1].parse().map_err(|_| invalid())?;
        let month: u32 = caps[2].parse().map_err(|_| invalid())?;

        Self::new(year, month).map_err(|_| invalid())
    }

    /// The month containing `date`
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn days_in_month(&self) -> u32 {
        match self.month {
            1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
            4 | 6 | 9 | 11 => 30,
            _ if is_leap_year(self.year) => 29,
            _ => 28,
        }
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .expect("YearMonth always holds a representable month")
    }

    pub fn last_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, self.days_in_month())
            .expect("YearMonth always holds a representable month")
    }

    pub fn next(&self) -> Self {
        self.add_months(1)
    }

    pub fn prev(&self) -> Self {
        self.add_months(-1)
    }

    /// Shift by `delta` months (negative moves backwards)
    pub fn add_months(&self, delta: i32) -> Self {
        Self::from_index(self.index() + delta)
    }

    /// Signed number of months from `self` to `other`
    ///
    /// `2024-01`.months_until(`2024-03`) is 2.
    pub fn months_until(&self, other: YearMonth) -> i32 {
        other.index() - self.index()
    }

    /// Every month from `from` to `to`, both included; empty when `from > to`
    pub fn range_inclusive(from: YearMonth, to: YearMonth) -> Vec<YearMonth> {
        if from > to {
            return Vec::new();
        }
        (from.index()..=to.index()).map(Self::from_index).collect()
    }

    fn index(&self) -> i32 {
        self.year * 12 + (self.month as i32 - 1)
    }

    fn from_index(index: i32) -> Self {
        Self {
            year: index.div_euclid(12),
            month: index.rem_euclid(12) as u32 + 1,
        }
    }
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = MonthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for YearMonth {
    type Error = MonthError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<YearMonth> for String {
    fn from(value: YearMonth) -> Self {
        value.to_string()
    }
}

/// True when a sorted slice has no gaps
pub fn is_contiguous(months: &[YearMonth]) -> bool {
    months.windows(2).all(|pair| pair[0].next() == pair[1])
}

/// Sort a selection and check it is non-empty, duplicate-free and gap-free
pub fn normalize_selection(months: &[YearMonth]) -> Result<Vec<YearMonth>, MonthError> {
    if months.is_empty() {
        return Err(MonthError::EmptySelection);
    }

    let mut sorted = months.to_vec();
    sorted.sort();

    for pair in sorted.windows(2) {
        if pair[0] == pair[1] {
            return Err(MonthError::DuplicateMonth { month: pair[0] });
        }
        if pair[0].next() != pair[1] {
            return Err(MonthError::NonContiguous {
                after: pair[0],
                missing: pair[0].next(),
            });
        }
    }

    Ok(sorted)
}

/// Parse raw tokens in request order; `normalize_selection` checks the shape
pub fn parse_selection<S: AsRef<str>>(tokens: &[S]) -> Result<Vec<YearMonth>, MonthError> {
    tokens.iter().map(|t| YearMonth::parse(t.as_ref())).collect()
}
