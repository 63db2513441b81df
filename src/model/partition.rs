//! Monthly partition keys.
//!
//! Every archived record belongs to exactly one calendar month, written as
//! `YYYY_MM` (e.g. `2024_03`). The key doubles as the artifact file stem.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A `year_month` partition key.
///
/// Ordering is chronological, so sorting descending yields most recent first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    /// Build a key, returning `None` for a month outside 1..=12.
    #[must_use]
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    /// The partition a timestamp falls into.
    #[must_use]
    pub fn from_timestamp(ts: &NaiveDateTime) -> Self {
        Self {
            year: ts.year(),
            month: ts.month(),
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}_{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (year, month) = s
            .split_once('_')
            .ok_or_else(|| format!("Invalid partition key: {s}"))?;
        if year.len() != 4 || month.len() != 2 {
            return Err(format!("Invalid partition key: {s}"));
        }
        let year: i32 = year
            .parse()
            .map_err(|_| format!("Invalid partition year: {s}"))?;
        let month: u32 = month
            .parse()
            .map_err(|_| format!("Invalid partition month: {s}"))?;
        Self::new(year, month).ok_or_else(|| format!("Invalid partition month: {s}"))
    }
}

impl Serialize for YearMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for YearMonth {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
