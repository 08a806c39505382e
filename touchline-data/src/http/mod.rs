//! HTTP [`Provider`] for the API-Football v3 service.
//!
//! The [`Provider`] trait is synchronous so the pipeline can stay a plain
//! loop. [`HttpProvider`] bridges to `reqwest` by blocking on a Tokio runtime
//! it owns, and retries transient failures (HTTP 429, 5xx, timeouts and
//! connection errors) with exponential backoff. Every retry takes a fresh
//! token from the rate limiters before it is sent.
//!
//! # Example
//!
//! ```no_run
//! use touchline_core::{FetchRequest, Provider, RateLimiters, ResourceKind};
//! use touchline_data::{HttpProvider, HttpProviderConfig};
//!
//! let provider = HttpProvider::with_config(HttpProviderConfig::new("my-api-key"))?;
//! let limits = RateLimiters::unlimited();
//! let request = FetchRequest::new(ResourceKind::Teams)
//!     .with_param("league", "39")
//!     .with_param("season", "2024");
//! limits.acquire();
//! let document = provider.fetch(&request, &limits)?;
//! println!("{} teams", document.items().len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod retry;

use std::fmt;
use std::future::Future;
use std::time::Duration;

use log::{debug, warn};
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};
use tokio::runtime::{Handle, Runtime, RuntimeFlavor};
use touchline_core::{Document, FetchError, FetchRequest, Provider, RateLimiters};
use url::Url;

pub use retry::{DEFAULT_ATTEMPTS, RetryPolicy};

/// Public API-Football endpoint.
pub const DEFAULT_BASE_URL: &str = "https://v3.football.api-sports.io";

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "x-apisports-key";

/// Default user agent for provider requests.
pub const DEFAULT_USER_AGENT: &str = "touchline/0.1";

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Longest error body echoed back in [`FetchError::Http`].
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Error type for [`HttpProvider`] construction failures.
#[derive(Debug)]
pub enum ProviderBuildError {
    /// The base URL does not parse or cannot carry a path.
    InvalidBaseUrl {
        /// The configured URL.
        url: String,
        /// Parser failure, when there was one.
        source: Option<url::ParseError>,
    },
    /// The API key cannot be sent as a header value.
    InvalidApiKey,
    /// Failed to build the HTTP client.
    HttpClient(reqwest::Error),
    /// Failed to build the Tokio runtime.
    Runtime(std::io::Error),
}

impl fmt::Display for ProviderBuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidBaseUrl { url, .. } => write!(f, "invalid provider base URL {url:?}"),
            Self::InvalidApiKey => f.write_str("API key contains characters not allowed in a header"),
            Self::HttpClient(err) => write!(f, "failed to build HTTP client: {err}"),
            Self::Runtime(err) => write!(f, "failed to build Tokio runtime: {err}"),
        }
    }
}

impl std::error::Error for ProviderBuildError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidBaseUrl { source, .. } => source
                .as_ref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Self::InvalidApiKey => None,
            Self::HttpClient(err) => Some(err),
            Self::Runtime(err) => Some(err),
        }
    }
}

/// Configuration for [`HttpProvider`].
#[derive(Clone)]
pub struct HttpProviderConfig {
    /// Base URL of the service, e.g. `"https://v3.football.api-sports.io"`.
    pub base_url: String,
    /// API key sent in the [`API_KEY_HEADER`] header.
    pub api_key: String,
    /// Request timeout duration.
    pub timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
    /// Retry behaviour for transient failures.
    pub retry: RetryPolicy,
}

impl fmt::Debug for HttpProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpProviderConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("user_agent", &self.user_agent)
            .field("retry", &self.retry)
            .finish()
    }
}

impl HttpProviderConfig {
    /// Configuration for the public endpoint using `api_key`.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            retry: RetryPolicy::default(),
        }
    }

    /// Point at another deployment of the API.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the user agent string.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set the retry policy.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// A failed attempt and the server's requested pause, if any.
struct Attempt {
    error: FetchError,
    retry_after: Option<Duration>,
}

impl From<FetchError> for Attempt {
    fn from(error: FetchError) -> Self {
        Self {
            error,
            retry_after: None,
        }
    }
}

/// API-Football client implementing [`Provider`].
///
/// # Runtime behaviour
///
/// When called from outside any Tokio runtime, the provider blocks on its
/// own current-thread runtime. Inside a multi-threaded runtime it uses that
/// runtime's handle with [`tokio::task::block_in_place`]. Inside a
/// `current_thread` runtime it falls back to its own runtime, which may
/// stall the caller's runtime for the duration of the request.
pub struct HttpProvider {
    client: Client,
    config: HttpProviderConfig,
    base_url: Url,
    runtime: Runtime,
}

impl fmt::Debug for HttpProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpProvider")
            .field("client", &self.client)
            .field("config", &self.config)
            .field("runtime", &"<tokio::runtime::Runtime>")
            .finish_non_exhaustive()
    }
}

impl HttpProvider {
    /// Create a provider for the public endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is not a valid header value or the
    /// HTTP client or Tokio runtime fails to build.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProviderBuildError> {
        Self::with_config(HttpProviderConfig::new(api_key))
    }

    /// Create a provider with explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL or API key is unusable, or the HTTP
    /// client or Tokio runtime fails to build.
    pub fn with_config(config: HttpProviderConfig) -> Result<Self, ProviderBuildError> {
        let base_url = parse_base_url(&config.base_url)?;

        let mut key = HeaderValue::from_str(&config.api_key)
            .map_err(|_| ProviderBuildError::InvalidApiKey)?;
        key.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, key);

        let client = Client::builder()
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .connect_timeout(config.timeout)
            .timeout(config.timeout)
            .build()
            .map_err(ProviderBuildError::HttpClient)?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(ProviderBuildError::Runtime)?;
        Ok(Self {
            client,
            config,
            base_url,
            runtime,
        })
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &HttpProviderConfig {
        &self.config
    }

    /// Build the URL for `request`: the resource path appended to the base
    /// URL's path, followed by the query parameters in order.
    fn build_url(&self, request: &FetchRequest) -> Url {
        let mut url = self.base_url.clone();
        let path = format!(
            "{}{}",
            url.path().trim_end_matches('/'),
            request.resource.path()
        );
        url.set_path(&path);
        if request.params.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(
                request
                    .params
                    .iter()
                    .map(|(name, value)| (*name, value.as_str())),
            );
        }
        url
    }

    /// Perform one GET and decode the body.
    async fn fetch_once(&self, url: &Url) -> Result<Document, Attempt> {
        debug!("GET {url}");
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|err| self.convert_reqwest_error(&err, url))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            let message = if body.trim().is_empty() {
                status.canonical_reason().unwrap_or("no reason").to_owned()
            } else {
                body.trim().chars().take(MAX_ERROR_BODY_CHARS).collect()
            };
            return Err(Attempt {
                error: FetchError::Http {
                    url: url.to_string(),
                    status: status.as_u16(),
                    message,
                },
                retry_after,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|err| self.convert_reqwest_error(&err, url))?;
        Document::from_slice(&bytes).map_err(|err| {
            Attempt::from(FetchError::Decode {
                url: url.to_string(),
                message: err.to_string(),
            })
        })
    }

    /// Convert a reqwest error to a [`FetchError`].
    fn convert_reqwest_error(&self, error: &reqwest::Error, url: &Url) -> Attempt {
        let url = url.to_string();
        let error = if error.is_timeout() {
            FetchError::Timeout {
                url,
                timeout_secs: self.config.timeout.as_secs(),
            }
        } else if let Some(status) = error.status() {
            FetchError::Http {
                url,
                status: status.as_u16(),
                message: error.to_string(),
            }
        } else if error.is_decode() {
            FetchError::Decode {
                url,
                message: error.to_string(),
            }
        } else {
            FetchError::Network {
                url,
                message: error.to_string(),
            }
        };
        Attempt::from(error)
    }

    fn block_on<F: Future>(&self, future: F) -> F::Output {
        // block_in_place requires a multi-threaded runtime; for
        // current_thread runtimes we fall back to our own stored runtime.
        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| handle.block_on(future))
            }
            _ => self.runtime.block_on(future),
        }
    }
}

impl Provider for HttpProvider {
    /// Fetch `request`, retrying transient failures.
    ///
    /// The caller has already taken a token for the first attempt; each
    /// retry waits for its backoff (or the server's `Retry-After`, capped at
    /// the policy's maximum) and then takes another token from `limits`.
    fn fetch(&self, request: &FetchRequest, limits: &RateLimiters) -> Result<Document, FetchError> {
        let url = self.build_url(request);
        let policy = self.config.retry;
        let mut attempt = 1;
        loop {
            let failure = match self.block_on(self.fetch_once(&url)) {
                Ok(document) => return Ok(document),
                Err(failure) => failure,
            };
            if !failure.error.is_transient() || attempt >= policy.attempts() {
                return Err(failure.error);
            }

            let delay = failure
                .retry_after
                .map_or_else(|| policy.delay(attempt), |requested| {
                    requested.max(policy.delay(attempt))
                })
                .min(policy.max_backoff());
            warn!(
                "attempt {attempt}/{} failed: {}; retrying in {delay:?}",
                policy.attempts(),
                failure.error
            );
            std::thread::sleep(delay);
            limits.acquire();
            attempt += 1;
        }
    }
}

fn parse_base_url(raw: &str) -> Result<Url, ProviderBuildError> {
    let url = Url::parse(raw).map_err(|source| ProviderBuildError::InvalidBaseUrl {
        url: raw.to_owned(),
        source: Some(source),
    })?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(ProviderBuildError::InvalidBaseUrl {
            url: raw.to_owned(),
            source: None,
        });
    }
    Ok(url)
}

/// Read a `Retry-After` header given in whole seconds.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
