//! The remote favorites source.
//!
//! The sync engine only needs one capability from the remote API: fetch a
//! page of favorited posts, most recent first, optionally starting before a
//! cursor timestamp. [`FavoritesSource`] is that seam; [`HttpSource`] talks
//! to a real endpoint and [`ScriptedSource`] replays canned pages.
//!
//! [`HttpSource`]: crate::sync::HttpSource

use std::collections::VecDeque;

use serde::Serialize;
use serde_json::Value;

/// Maximum page size the remote API accepts.
pub const MAX_PAGE_SIZE: u32 = 30;

/// Timeline filter selecting favorited posts.
pub const FAVORITE_FILTER: &str = "favorite";

/// Errors from the remote source. Any of these ends the current sync pass.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body was not JSON.
    #[error("undecodable response: {0}")]
    Decode(String),

    /// A failure injected by a [`ScriptedSource`].
    #[error("{0}")]
    Scripted(String),
}

/// One page request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageRequest {
    pub filter: &'static str,
    pub limit: u32,
    /// Canonical timestamp of the last record of the previous page.
    #[serde(rename = "offset", skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

impl PageRequest {
    /// A favorites request; `limit` is clamped to `1..=MAX_PAGE_SIZE`.
    #[must_use]
    pub fn favorites(limit: u32, cursor: Option<String>) -> Self {
        Self {
            filter: FAVORITE_FILTER,
            limit: limit.clamp(1, MAX_PAGE_SIZE),
            cursor,
        }
    }
}

/// One page of remote documents.
///
/// `records` is `None` when the response carried no records field at all,
/// which the engine treats the same as an empty page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub records: Option<Vec<Value>>,
}

impl Page {
    /// Field names under which the remote API returns the record list.
    pub const RECORD_FIELDS: [&'static str; 2] = ["plurks", "records"];

    /// A page holding `records`.
    #[must_use]
    pub fn with_records(records: Vec<Value>) -> Self {
        Self {
            records: Some(records),
        }
    }

    /// Interpret a decoded response body.
    ///
    /// Anything that is not an object with an array under a known field is
    /// a malformed page, which yields `records: None`.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        let Value::Object(mut body) = value else {
            return Self::default();
        };
        let records = Self::RECORD_FIELDS
            .iter()
            .find_map(|field| match body.remove(*field) {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            });
        Self { records }
    }

    /// True for the end-of-data signal.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.records.as_ref().is_none_or(Vec::is_empty)
    }
}

/// A paginated source of favorited posts.
pub trait FavoritesSource {
    /// Fetch one page.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote call fails; the caller does not retry.
    fn fetch_page(&mut self, request: &PageRequest) -> Result<Page, SourceError>;
}

/// A source that replays queued pages and records every request.
///
/// Once the queue is drained every further fetch returns an empty page.
#[doc(hidden)]
#[derive(Debug, Default)]
pub struct ScriptedSource {
    responses: VecDeque<Result<Page, SourceError>>,
    requests: Vec<PageRequest>,
}

impl ScriptedSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a page of documents.
    #[must_use]
    pub fn page(mut self, records: Vec<Value>) -> Self {
        self.responses.push_back(Ok(Page::with_records(records)));
        self
    }

    /// Queue a raw page (e.g. a malformed one).
    #[must_use]
    pub fn raw_page(mut self, page: Page) -> Self {
        self.responses.push_back(Ok(page));
        self
    }

    /// Queue a failure.
    #[must_use]
    pub fn failure(mut self, message: &str) -> Self {
        self.responses
            .push_back(Err(SourceError::Scripted(message.to_string())));
        self
    }

    /// Every request received so far, in order.
    #[must_use]
    pub fn requests(&self) -> &[PageRequest] {
        &self.requests
    }
}

impl FavoritesSource for ScriptedSource {
    fn fetch_page(&mut self, request: &PageRequest) -> Result<Page, SourceError> {
        self.requests.push(request.clone());
        self.responses
            .pop_front()
            .unwrap_or_else(|| Ok(Page::default()))
    }
}
