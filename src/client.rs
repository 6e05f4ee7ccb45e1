//! Main client for interacting with the NPD API
//!
//! [`NpdClient`] owns the HTTP transport: one call per invocation, JSON in and out,
//! and a uniform error for anything that is not a success. The resource modules
//! (`datasets`, `tasks`, `generate`, `registry`, `health`) add typed operations on
//! top of the verbs defined here.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bon::bon;
use reqwest::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use reqwest::{Method, StatusCode};
use reqwest_middleware::ClientWithMiddleware;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;
use uuid::Uuid;

use crate::error::{Error, Result};

/// SDK version for User-Agent header
const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");
const SDK_NAME: &str = env!("CARGO_PKG_NAME");

/// Per-call timeout applied to every request
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Default connection timeout
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Base URL used by [`NpdClient::from_env`] when `NPD_BASE_URL` is unset
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

const REQUEST_ID_HEADER: &str = "x-request-id";

/// A relative API path, stored as unencoded segments.
///
/// Segments are percent-encoded only when joined onto the base URL, so an
/// identifier such as `"my set"` or `"a/b"` stays a single path segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiPath {
    segments: Vec<String>,
}

impl ApiPath {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().map(String::as_str)
    }
}

impl From<&str> for ApiPath {
    fn from(path: &str) -> Self {
        Self::new(path.split('/').filter(|s| !s.is_empty()))
    }
}

impl fmt::Display for ApiPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

struct ClientInner {
    http: ClientWithMiddleware,
    base_url: Url,
    timeout: Duration,
    user_agent: String,
}

/// Main client for interacting with the NPD API
///
/// Cloning is cheap; clones share the connection pool and configuration.
#[derive(Clone)]
pub struct NpdClient {
    inner: Arc<ClientInner>,
    cancel: Option<CancellationToken>,
}

impl fmt::Debug for NpdClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NpdClient")
            .field("base_url", &self.inner.base_url.as_str())
            .field("timeout", &self.inner.timeout)
            .field("cancellable", &self.cancel.is_some())
            .finish()
    }
}

/// Status line and body of a completed HTTP exchange
struct RawResponse {
    status: StatusCode,
    body: String,
    request_id: Option<String>,
}

impl RawResponse {
    fn ensure_success(self, path: &ApiPath) -> Result<Self> {
        if self.status.is_success() {
            Ok(self)
        } else {
            Err(Error::RemoteCallFailed {
                status: self.status.as_u16(),
                path: path.to_string(),
                body: self.body,
                request_id: self.request_id,
            })
        }
    }
}

#[bon]
impl NpdClient {
    /// Create a new client for the service at `base_url`
    ///
    /// `http_client` accepts a pre-built client, e.g. one wrapped in retry
    /// middleware; the per-call timeout is still applied to every request.
    ///
    /// Fails with [`Error::Configuration`] if the URL is empty, not absolute, or not
    /// `http`/`https`.
    #[builder(start_fn = builder, finish_fn = build)]
    pub fn new(
        #[builder(into)] base_url: String,
        timeout: Option<Duration>,
        connect_timeout: Option<Duration>,
        #[builder(into)] user_agent: Option<String>,
        http_client: Option<ClientWithMiddleware>,
    ) -> Result<Self> {
        let base_url = parse_base_url(&base_url)?;
        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);

        let http = match http_client {
            Some(client) => client,
            None => {
                let client = reqwest::Client::builder()
                    .timeout(timeout)
                    .connect_timeout(connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT))
                    .pool_max_idle_per_host(10)
                    .pool_idle_timeout(Duration::from_secs(90))
                    .build()
                    .map_err(|e| {
                        Error::Configuration(format!("Failed to build HTTP client: {}", e))
                    })?;
                reqwest_middleware::ClientBuilder::new(client).build()
            }
        };

        // Construct User-Agent with SDK info
        let user_agent =
            user_agent.unwrap_or_else(|| format!("{}/{} (Rust)", SDK_NAME, SDK_VERSION));

        Ok(Self {
            inner: Arc::new(ClientInner {
                http,
                base_url,
                timeout,
                user_agent,
            }),
            cancel: None,
        })
    }

    /// Create a new client from environment variables
    ///
    /// Reads from:
    /// - `NPD_BASE_URL`: Optional base URL (defaults to `http://127.0.0.1:8000`)
    /// - `NPD_TIMEOUT_SECS`: Optional per-call timeout in seconds (defaults to 20)
    pub fn from_env() -> Result<Self> {
        use std::env;

        let base_url = env::var("NPD_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        let timeout = match env::var("NPD_TIMEOUT_SECS") {
            Ok(raw) => {
                let secs: f64 = raw.trim().parse().map_err(|_| {
                    Error::Configuration(format!("NPD_TIMEOUT_SECS is not a number: {}", raw))
                })?;
                if !secs.is_finite() || secs <= 0.0 {
                    return Err(Error::Configuration(format!(
                        "NPD_TIMEOUT_SECS must be positive, got {}",
                        raw
                    )));
                }
                Some(Duration::from_secs_f64(secs))
            }
            Err(_) => None,
        };

        Self::builder()
            .base_url(base_url)
            .maybe_timeout(timeout)
            .build()
    }
}

impl NpdClient {
    /// Base URL every path is resolved against
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Per-call timeout
    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    /// A clone of this client whose calls abort with [`Error::Cancelled`] once
    /// `token` is cancelled.
    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            cancel: Some(token),
        }
    }

    /// Fetch a resource. A `404` is reported as `Ok(None)`; every other
    /// non-success status is a [`Error::RemoteCallFailed`].
    pub async fn read<T: DeserializeOwned>(&self, path: &ApiPath) -> Result<Option<T>> {
        let response = self.execute(Method::GET, path, None).await?;
        if response.status == StatusCode::NOT_FOUND {
            debug!(path = %path, "resource absent");
            return Ok(None);
        }
        let response = response.ensure_success(path)?;
        decode(path, &response.body).map(Some)
    }

    /// Fetch a resource that must exist, such as a collection route. Every
    /// non-success status, `404` included, is a [`Error::RemoteCallFailed`].
    pub async fn fetch<T: DeserializeOwned>(&self, path: &ApiPath) -> Result<T> {
        self.write(Method::GET, path, None).await
    }

    /// POST `body` and decode the response
    pub async fn create<B, T>(&self, path: &ApiPath, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let payload = serde_json::to_vec(body)?;
        self.write(Method::POST, path, Some(payload)).await
    }

    /// PUT `body` and decode the response
    pub async fn replace<B, T>(&self, path: &ApiPath, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let payload = serde_json::to_vec(body)?;
        self.write(Method::PUT, path, Some(payload)).await
    }

    /// DELETE and decode the response
    pub async fn remove<T: DeserializeOwned>(&self, path: &ApiPath) -> Result<T> {
        self.write(Method::DELETE, path, None).await
    }

    async fn write<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &ApiPath,
        payload: Option<Vec<u8>>,
    ) -> Result<T> {
        let response = self
            .execute(method, path, payload)
            .await?
            .ensure_success(path)?;
        decode(path, &response.body)
    }

    async fn execute(
        &self,
        method: Method,
        path: &ApiPath,
        payload: Option<Vec<u8>>,
    ) -> Result<RawResponse> {
        let url = self.resolve(path)?;
        let request_id = Uuid::new_v4().to_string();

        debug!(%method, path = %path, request_id = %request_id, "sending request");

        let mut request = self
            .inner
            .http
            .request(method.clone(), url)
            .timeout(self.inner.timeout)
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, self.inner.user_agent.as_str())
            .header(REQUEST_ID_HEADER, request_id.as_str());

        if let Some(payload) = payload {
            request = request
                .header(CONTENT_TYPE, "application/json")
                .body(payload);
        }

        let exchange = async {
            let response = request.send().await?;
            let status = response.status();
            // Prefer the server's ID so logs on both sides line up
            let request_id = response
                .headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
                .unwrap_or(request_id);
            let body = response.text().await?;

            debug!(
                %method,
                path = %path,
                status = status.as_u16(),
                request_id = %request_id,
                "received response"
            );

            Ok::<_, Error>(RawResponse {
                status,
                body,
                request_id: Some(request_id),
            })
        };

        self.cancellable(exchange).await
    }

    /// Race `future` against this client's cancellation token, if any
    pub(crate) async fn cancellable<T, F>(&self, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match &self.cancel {
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => Err(Error::Cancelled),
                    result = future => result,
                }
            }
            None => future.await,
        }
    }

    fn resolve(&self, path: &ApiPath) -> Result<Url> {
        let mut url = self.inner.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                Error::Configuration(format!(
                    "Base URL cannot carry a path: {}",
                    self.inner.base_url
                ))
            })?;
            segments.pop_if_empty().extend(path.segments());
        }
        Ok(url)
    }
}

fn parse_base_url(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::Configuration(
            "Base URL must not be empty".to_string(),
        ));
    }

    let url = Url::parse(trimmed)
        .map_err(|e| Error::Configuration(format!("Invalid base URL '{}': {}", trimmed, e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::Configuration(format!(
            "Base URL must use http or https: {}",
            trimmed
        )));
    }
    if url.cannot_be_a_base() || url.host_str().is_none() {
        return Err(Error::Configuration(format!(
            "Base URL must be absolute: {}",
            trimmed
        )));
    }

    Ok(url)
}

/// Decode a JSON body; an empty body decodes as `null`
fn decode<T: DeserializeOwned>(path: &ApiPath, body: &str) -> Result<T> {
    let text = if body.trim().is_empty() { "null" } else { body };
    serde_json::from_str(text).map_err(|source| Error::Deserialization {
        path: path.to_string(),
        source,
    })
}
