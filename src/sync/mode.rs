//! Stop-policy selection.
//!
//! A sync pass walks the remote timeline from newest to oldest and stops at
//! a boundary chosen here: the newest id already archived, a calendar date,
//! or never (full rebuild).

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};

use crate::model::{canonical_timestamp, Record};

/// Format accepted for the resume-by-date input.
pub const DATE_INPUT_FORMAT: &str = "%Y%m%d";

/// When a sync pass stops fetching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopPolicy {
    /// Walk the whole timeline.
    Full,
    /// Stop at the first record with `id <= threshold`.
    ById(i64),
    /// Stop at the first record posted before `threshold`.
    ByDate(NaiveDateTime),
}

impl StopPolicy {
    /// Policy kind as stored in sync history.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::ById(_) => "by_id",
            Self::ByDate(_) => "by_date",
        }
    }

    /// Threshold rendered for display and history.
    #[must_use]
    pub fn threshold_label(&self) -> String {
        match self {
            Self::Full => "0".to_string(),
            Self::ById(id) => id.to_string(),
            Self::ByDate(ts) => canonical_timestamp(ts),
        }
    }

    #[must_use]
    pub const fn is_full(&self) -> bool {
        matches!(self, Self::Full)
    }

    /// Whether `record` lies at or beyond the stop boundary.
    #[must_use]
    pub fn should_stop(&self, record: &Record) -> bool {
        match self {
            Self::Full => false,
            Self::ById(threshold) => record.id <= *threshold,
            Self::ByDate(threshold) => record.posted_at < *threshold,
        }
    }
}

impl fmt::Display for StopPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "full rebuild"),
            Self::ById(id) => write!(f, "resume after id {id}"),
            Self::ByDate(ts) => write!(f, "resume from {}", ts.format("%Y-%m-%d")),
        }
    }
}

/// What the user asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeChoice {
    /// Resume by date; carries the raw `YYYYMMDD` input.
    ByDate(String),
    /// Resume after the newest archived id.
    ById,
    /// Rebuild from the whole timeline.
    Full,
}

impl FromStr for ModeChoice {
    type Err = String;

    /// Parse `id`, `full`, or `date[:YYYYMMDD]`, or the menu numbers `1`-`3`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        if let Some(date) = s.strip_prefix("date:") {
            return Ok(Self::ByDate(date.to_string()));
        }
        match s.as_str() {
            "1" | "date" => Ok(Self::ByDate(String::new())),
            "" | "2" | "id" => Ok(Self::ById),
            "3" | "full" => Ok(Self::Full),
            other => Err(format!("unknown mode '{other}'")),
        }
    }
}

/// A resolved policy plus any warning produced on the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeSelection {
    pub policy: StopPolicy,
    pub warning: Option<String>,
}

/// Resolve the stop policy from the store's high-water mark and the user's choice.
///
/// An empty store always yields [`StopPolicy::Full`]. With no choice the
/// default is resume-by-id. An unparseable date degrades to resume-by-id
/// and reports a warning instead of failing.
#[must_use]
pub fn select_policy(last_max_id: i64, choice: Option<&ModeChoice>) -> ModeSelection {
    if last_max_id <= 0 {
        return ModeSelection {
            policy: StopPolicy::Full,
            warning: None,
        };
    }

    match choice {
        None | Some(ModeChoice::ById) => ModeSelection {
            policy: StopPolicy::ById(last_max_id),
            warning: None,
        },
        Some(ModeChoice::Full) => ModeSelection {
            policy: StopPolicy::Full,
            warning: None,
        },
        Some(ModeChoice::ByDate(input)) => match parse_date_input(input) {
            Some(threshold) => ModeSelection {
                policy: StopPolicy::ByDate(threshold),
                warning: None,
            },
            None => ModeSelection {
                policy: StopPolicy::ById(last_max_id),
                warning: Some(format!(
                    "invalid date '{input}' (expected YYYYMMDD); resuming after id {last_max_id}"
                )),
            },
        },
    }
}

/// Parse a `YYYYMMDD` date into midnight UTC of that day.
#[must_use]
pub fn parse_date_input(input: &str) -> Option<NaiveDateTime> {
    let input = input.trim();
    if input.len() != 8 {
        return None;
    }
    NaiveDate::parse_from_str(input, DATE_INPUT_FORMAT)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}
