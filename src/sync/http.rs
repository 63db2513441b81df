//! HTTP favorites source.
//!
//! Issues `GET <endpoint>?filter=favorite&limit=N[&offset=<cursor>]` and
//! decodes the JSON body into a [`Page`]. Request signing and token
//! acquisition happen elsewhere; this source only forwards an optional
//! bearer token.

use serde_json::Value;
use tracing::debug;

use super::source::{FavoritesSource, Page, PageRequest, SourceError};

/// A [`FavoritesSource`] backed by an HTTP endpoint.
pub struct HttpSource {
    runtime: tokio::runtime::Runtime,
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpSource {
    /// Create a source for `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns an error if the async runtime or HTTP client cannot be built.
    pub fn new(endpoint: String, token: Option<String>) -> Result<Self, SourceError> {
        let runtime = tokio::runtime::Runtime::new()
            .map_err(|e| SourceError::Transport(format!("failed to start runtime: {e}")))?;
        let client = reqwest::Client::builder()
            .user_agent(concat!("favarc/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        Ok(Self {
            runtime,
            client,
            endpoint,
            token,
        })
    }

    async fn fetch(&self, request: &PageRequest) -> Result<Page, SourceError> {
        let mut builder = self.client.get(&self.endpoint).query(request);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;
        decode_page(&body)
    }
}

impl FavoritesSource for HttpSource {
    fn fetch_page(&mut self, request: &PageRequest) -> Result<Page, SourceError> {
        debug!(endpoint = %self.endpoint, cursor = ?request.cursor, "requesting page");
        self.runtime.block_on(self.fetch(request))
    }
}

/// Decode a response body. An empty body is an empty page.
fn decode_page(body: &str) -> Result<Page, SourceError> {
    if body.trim().is_empty() {
        return Ok(Page::default());
    }
    let value: Value = serde_json::from_str(body).map_err(|e| SourceError::Decode(e.to_string()))?;
    Ok(Page::from_value(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_empty_body_is_exhausted() {
        assert!(decode_page("").unwrap().is_exhausted());
        assert!(decode_page("  \n").unwrap().is_exhausted());
    }

    #[test]
    fn test_decode_records() {
        let page = decode_page(r#"{"plurks":[{"plurk_id":5,"posted":"2024-01-01T00:00:00"}]}"#)
            .unwrap();
        assert_eq!(page.records.unwrap().len(), 1);
    }

    #[test]
    fn test_decode_html_error_page_fails() {
        let err = decode_page("<html>502</html>").unwrap_err();
        assert!(matches!(err, SourceError::Decode(_)));
    }

    #[test]
    fn test_unreachable_endpoint_is_transport_error() {
        let mut source = HttpSource::new("http://127.0.0.1:9/favorites".into(), None).unwrap();
        let err = source
            .fetch_page(&PageRequest::favorites(30, None))
            .unwrap_err();
        assert!(matches!(err, SourceError::Transport(_)));
    }
}
