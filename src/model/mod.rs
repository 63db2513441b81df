//! Data models for favarc.
//!
//! - [`Record`]: one archived post
//! - [`YearMonth`]: the monthly partition key

pub mod partition;
pub mod record;

pub use partition::YearMonth;
pub use record::{
    canonical_timestamp, document_timestamp, parse_timestamp, permalink, Record, RecordError,
    DEFAULT_PERMALINK_BASE, PERMALINK_FIELD,
};
