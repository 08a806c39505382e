//! Provider fetch seam.
//!
//! The pipeline only needs one operation from a data provider: fetch a
//! resource with a handful of query parameters and return the decoded
//! [`Document`], or a structured [`FetchError`] once the provider's own
//! retries are exhausted.

use std::fmt;

use thiserror::Error;

use crate::{Document, RateLimiters, ResourceKind};

/// A single provider call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchRequest {
    /// Resource to fetch.
    pub resource: ResourceKind,
    /// Query parameters in the order they are sent.
    pub params: Vec<(&'static str, String)>,
}

impl FetchRequest {
    /// Request `resource` without parameters.
    #[must_use]
    pub const fn new(resource: ResourceKind) -> Self {
        Self {
            resource,
            params: Vec::new(),
        }
    }

    /// Append a query parameter.
    #[must_use]
    pub fn with_param(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.params.push((name, value.into()));
        self
    }
}

impl fmt::Display for FetchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.resource.path())?;
        for (position, (name, value)) in self.params.iter().enumerate() {
            let separator = if position == 0 { '?' } else { '&' };
            write!(f, "{separator}{name}={value}")?;
        }
        Ok(())
    }
}

/// A fetch that failed after the provider adapter gave up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The provider answered with a non-success HTTP status.
    #[error("request to {url} failed with status {status}: {message}")]
    Http {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Response body or reason phrase.
        message: String,
    },
    /// The request never produced a response.
    #[error("network error calling {url}: {message}")]
    Network {
        /// Requested URL.
        url: String,
        /// Transport error description.
        message: String,
    },
    /// The request exceeded its deadline.
    #[error("request to {url} timed out after {timeout_secs}s")]
    Timeout {
        /// Requested URL.
        url: String,
        /// Configured timeout in seconds.
        timeout_secs: u64,
    },
    /// The response body could not be decoded.
    #[error("failed to decode response from {url}: {message}")]
    Decode {
        /// Requested URL.
        url: String,
        /// Decoder error description.
        message: String,
    },
}

impl FetchError {
    /// Whether another attempt might succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            Self::Network { .. } | Self::Timeout { .. } => true,
            Self::Decode { .. } => false,
        }
    }
}

/// Fetches documents from a rate-limited provider.
///
/// Callers acquire one token from `limits` before invoking [`Provider::fetch`].
/// Implementations that retry must acquire again before every further attempt
/// so that retries never bypass the limiter.
pub trait Provider {
    /// Fetch `request`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] when no usable document could be obtained.
    fn fetch(&self, request: &FetchRequest, limits: &RateLimiters) -> Result<Document, FetchError>;
}

impl<P: Provider + ?Sized> Provider for &P {
    fn fetch(&self, request: &FetchRequest, limits: &RateLimiters) -> Result<Document, FetchError> {
        (**self).fetch(request, limits)
    }
}
