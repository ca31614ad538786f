//! The fetch seam and its HTTP implementation.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use tracing::{instrument, trace};

use super::allocator::{AdaptiveConnectionAllocator, route_key};
use super::error::FetchError;

/// Performs a single GET and reports the response status.
///
/// Implementations return `Ok(status)` for any response, including error
/// statuses. `Err` is reserved for requests that never produced a complete
/// response.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches `url`, discarding the body.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] for malformed URLs and transport failures.
    async fn fetch(&self, url: &str) -> Result<u16, FetchError>;
}

/// [`Fetcher`] backed by the shared client of an [`AdaptiveConnectionAllocator`].
///
/// Each request holds a connection lease for its route until the body has
/// been drained.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    allocator: Arc<AdaptiveConnectionAllocator>,
}

impl HttpFetcher {
    /// Creates a fetcher that leases connections from `allocator`.
    #[must_use]
    pub fn new(allocator: Arc<AdaptiveConnectionAllocator>) -> Self {
        Self { allocator }
    }

    /// The allocator requests are leased from.
    #[must_use]
    pub fn allocator(&self) -> &Arc<AdaptiveConnectionAllocator> {
        &self.allocator
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    #[instrument(level = "trace", skip(self))]
    async fn fetch(&self, url: &str) -> Result<u16, FetchError> {
        let Some(route) = route_key(url) else {
            return Err(FetchError::invalid_url(url));
        };

        let client = self.allocator.client_for(&route).await;
        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;
        let status = response.status().as_u16();

        // Drain so the connection can go back to the pool.
        let mut body = response.bytes_stream();
        let mut bytes: u64 = 0;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| FetchError::from_reqwest(url, e))?;
            bytes += chunk.len() as u64;
        }
        trace!(status, bytes, "response drained");
        Ok(status)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::fetch::error::{Outcome, classify};

    fn fetcher() -> HttpFetcher {
        let allocator = AdaptiveConnectionAllocator::new(
            10,
            Duration::from_secs(5),
            Duration::from_secs(5),
        )
        .unwrap();
        HttpFetcher::new(Arc::new(allocator))
    }

    #[tokio::test]
    async fn test_fetch_returns_status_and_releases_lease() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'x'; 4096]))
            .mount(&server)
            .await;

        let fetcher = fetcher();
        let url = format!("{}/ok", server.uri());
        assert_eq!(fetcher.fetch(&url).await.unwrap(), 200);

        let route = route_key(&url).unwrap();
        assert_eq!(fetcher.allocator().in_flight(&route), 0);
    }

    #[tokio::test]
    async fn test_fetch_error_status_is_ok_result() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let result = fetcher().fetch(&format!("{}/missing", server.uri())).await;
        assert_eq!(result.as_ref().ok(), Some(&404));
        assert_eq!(classify(&result), Outcome::Permanent);
    }

    #[tokio::test]
    async fn test_fetch_malformed_url_is_invalid() {
        let result = fetcher().fetch("definitely not a url").await;
        assert!(matches!(result, Err(FetchError::InvalidUrl { .. })));
        assert_eq!(classify(&result), Outcome::Skipped);
    }

    #[tokio::test]
    async fn test_fetch_connection_refused_is_transient() {
        // Bind then drop to get a port with nothing listening.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let result = fetcher().fetch(&format!("http://127.0.0.1:{port}/")).await;
        assert!(result.is_err());
        assert_eq!(classify(&result), Outcome::Transient);
    }
}
