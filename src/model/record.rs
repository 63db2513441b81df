//! Archived record model.
//!
//! A record is one favorited post as returned by the remote source. The
//! remote document is kept verbatim as the payload; only the identifier and
//! the post timestamp are lifted out because the archive orders, resumes and
//! partitions on them.

use chrono::{DateTime, NaiveDateTime};
use serde_json::{Map, Value};

use super::partition::YearMonth;

/// Field names the remote source uses for the record identifier.
pub const ID_FIELDS: [&str; 2] = ["plurk_id", "id"];

/// Field names the remote source uses for the post timestamp.
pub const POSTED_FIELDS: [&str; 2] = ["posted", "posted_at"];

/// Field added to every exported document with the record's permanent link.
pub const PERMALINK_FIELD: &str = "plurk_url";

/// Default prefix for permanent links.
pub const DEFAULT_PERMALINK_BASE: &str = "https://www.plurk.com/p/";

/// Timestamp format emitted by the remote API (`Fri, 05 Jan 2024 10:00:00 GMT`).
pub const REMOTE_TIMESTAMP_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Canonical sortable form used for storage and as the pagination cursor.
pub const CANONICAL_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Errors raised while lifting a remote document into a [`Record`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("record is not a JSON object")]
    NotAnObject,

    #[error("record has no integer id")]
    MissingId,

    #[error("record {id} has no post timestamp")]
    MissingTimestamp { id: i64 },

    #[error("record {id} has an unparseable timestamp: {raw}")]
    InvalidTimestamp { id: i64, raw: String },
}

/// One archived post.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Source-assigned identifier; a total order over records.
    pub id: i64,
    /// Post time, UTC, second precision.
    pub posted_at: NaiveDateTime,
    /// The full remote document.
    pub payload: Map<String, Value>,
}

impl Record {
    /// Lift a remote JSON document into a record.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not an object or lacks a usable
    /// id or timestamp.
    pub fn from_remote(value: Value) -> Result<Self, RecordError> {
        let Value::Object(payload) = value else {
            return Err(RecordError::NotAnObject);
        };

        let id = ID_FIELDS
            .iter()
            .find_map(|field| payload.get(*field).and_then(Value::as_i64))
            .ok_or(RecordError::MissingId)?;

        let raw = posted_field(&payload).ok_or(RecordError::MissingTimestamp { id })?;

        let posted_at = parse_timestamp(raw).ok_or_else(|| RecordError::InvalidTimestamp {
            id,
            raw: raw.to_string(),
        })?;

        Ok(Self {
            id,
            posted_at,
            payload,
        })
    }

    /// The monthly partition this record belongs to.
    #[must_use]
    pub fn year_month(&self) -> YearMonth {
        YearMonth::from_timestamp(&self.posted_at)
    }

    /// Post time in canonical form.
    #[must_use]
    pub fn posted_at_canonical(&self) -> String {
        canonical_timestamp(&self.posted_at)
    }

    /// The exported document: payload plus the permanent link.
    #[must_use]
    pub fn to_document(&self, permalink_base: &str) -> Value {
        let mut doc = self.payload.clone();
        doc.insert(
            PERMALINK_FIELD.to_string(),
            Value::String(permalink(permalink_base, self.id)),
        );
        Value::Object(doc)
    }
}

/// Post timestamp of a remote document, whether or not the rest of it is
/// usable as a record.
#[must_use]
pub fn document_timestamp(value: &Value) -> Option<NaiveDateTime> {
    value.as_object().and_then(posted_field).and_then(parse_timestamp)
}

fn posted_field(payload: &Map<String, Value>) -> Option<&str> {
    POSTED_FIELDS
        .iter()
        .find_map(|field| payload.get(*field).and_then(Value::as_str))
}

/// Parse a timestamp in any form the archive has seen.
///
/// Accepts the remote API format, the canonical cursor form, RFC 3339 and
/// RFC 2822. Offsets are normalized to UTC.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, REMOTE_TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, CANONICAL_TIMESTAMP_FORMAT))
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.naive_utc()))
        .or_else(|| DateTime::parse_from_rfc2822(raw).ok().map(|dt| dt.naive_utc()))
}

/// Render a timestamp in canonical `YYYY-MM-DDTHH:MM:SS` form.
#[must_use]
pub fn canonical_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(CANONICAL_TIMESTAMP_FORMAT).to_string()
}

/// Permanent link for a record id.
#[must_use]
pub fn permalink(base: &str, id: i64) -> String {
    format!("{base}{}", base36(id.unsigned_abs()))
}

/// Lowercase base-36 rendering used in permanent links.
#[must_use]
pub fn base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_base36() {
        assert_eq!(base36(0), "0");
        assert_eq!(base36(35), "z");
        assert_eq!(base36(36), "10");
        assert_eq!(base36(1_234_567_890), "kf12oi");
    }

    #[test]
    fn test_parse_remote_format() {
        let ts = parse_timestamp("Fri, 05 Jan 2024 10:00:00 GMT").unwrap();
        assert_eq!(canonical_timestamp(&ts), "2024-01-05T10:00:00");
    }

    #[test]
    fn test_parse_canonical_and_rfc3339() {
        let a = parse_timestamp("2024-01-05T10:00:00").unwrap();
        let b = parse_timestamp("2024-01-05T12:00:00+02:00").unwrap();
        assert_eq!(a, b);
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_from_remote_plurk_fields() {
        let record = Record::from_remote(json!({
            "plurk_id": 100,
            "posted": "Sun, 10 Mar 2024 08:30:00 GMT",
            "content": "hello",
        }))
        .unwrap();
        assert_eq!(record.id, 100);
        assert_eq!(record.year_month().to_string(), "2024_03");
        assert_eq!(record.payload["content"], "hello");
    }

    #[test]
    fn test_from_remote_generic_fields() {
        let record = Record::from_remote(json!({
            "id": 7,
            "posted_at": "2023-12-31T23:59:59",
        }))
        .unwrap();
        assert_eq!(record.year_month().to_string(), "2023_12");
    }

    #[test]
    fn test_from_remote_errors() {
        assert_eq!(
            Record::from_remote(json!([1, 2])).unwrap_err(),
            RecordError::NotAnObject
        );
        assert_eq!(
            Record::from_remote(json!({"posted": "2024-01-01T00:00:00"})).unwrap_err(),
            RecordError::MissingId
        );
        assert_eq!(
            Record::from_remote(json!({"plurk_id": 3})).unwrap_err(),
            RecordError::MissingTimestamp { id: 3 }
        );
        assert!(matches!(
            Record::from_remote(json!({"plurk_id": 3, "posted": "soon"})).unwrap_err(),
            RecordError::InvalidTimestamp { id: 3, .. }
        ));
    }

    #[test]
    fn test_document_timestamp_ignores_missing_id() {
        let ts = document_timestamp(&json!({"posted": "Tue, 02 Jan 2024 10:00:00 GMT"}));
        assert_eq!(ts.map(|t| canonical_timestamp(&t)).as_deref(), Some("2024-01-02T10:00:00"));
        assert!(document_timestamp(&json!({"plurk_id": 1, "posted": "soon"})).is_none());
        assert!(document_timestamp(&json!("2024-01-01T00:00:00")).is_none());
    }

    #[test]
    fn test_document_carries_permalink() {
        let record = Record::from_remote(json!({
            "plurk_id": 36,
            "posted": "2024-01-01T00:00:00",
        }))
        .unwrap();
        let doc = record.to_document(DEFAULT_PERMALINK_BASE);
        assert_eq!(doc[PERMALINK_FIELD], "https://www.plurk.com/p/10");
        assert_eq!(doc["plurk_id"], 36);
    }
}
