//! Error types and outcome classification for fetches.

use thiserror::Error;

/// Errors that can occur while fetching a URL.
///
/// HTTP error statuses are not errors here: a fetch that receives any
/// response returns its status code, and [`classify`] decides what it means.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The URL could not be parsed or has no host.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The request or body read timed out.
    #[error("timeout fetching {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// Transport-level failure (DNS, connection refused, reset, body read).
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The redirect policy gave up (loop or too many hops).
    #[error("redirect error fetching {url}: {source}")]
    Redirect {
        /// The URL that failed.
        url: String,
        /// The underlying redirect error.
        #[source]
        source: reqwest::Error,
    },

    /// The shared HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
}

impl FetchError {
    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Maps a reqwest error to the matching variant.
    pub fn from_reqwest(url: impl Into<String>, source: reqwest::Error) -> Self {
        let url = url.into();
        if source.is_timeout() {
            Self::Timeout { url }
        } else if source.is_redirect() {
            Self::Redirect { url, source }
        } else if source.is_builder() {
            Self::InvalidUrl { url }
        } else {
            Self::Network { url, source }
        }
    }
}

/// How a single fetch attempt resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Status below 400. Counted as success.
    Success,
    /// Status 400 or above, or a redirect failure. Counted, never retried.
    Permanent,
    /// Transport failure. Retried, not counted yet.
    Transient,
    /// Malformed URL. Neither counted nor retried.
    Skipped,
}

/// Classifies the result of one fetch attempt.
///
/// | Result | Outcome |
/// |--------|---------|
/// | status < 400 | Success |
/// | status >= 400 | Permanent |
/// | Timeout / Network | Transient |
/// | Redirect | Permanent |
/// | InvalidUrl | Skipped |
/// | ClientBuild | Permanent |
#[must_use]
pub fn classify(result: &Result<u16, FetchError>) -> Outcome {
    match result {
        Ok(status) if *status < 400 => Outcome::Success,
        Ok(_) | Err(FetchError::Redirect { .. } | FetchError::ClientBuild(_)) => Outcome::Permanent,
        Err(FetchError::Timeout { .. } | FetchError::Network { .. }) => Outcome::Transient,
        Err(FetchError::InvalidUrl { .. }) => Outcome::Skipped,
    }
}
