//! HTTP transport abstraction.
//!
//! [`Transport`] sends one [`ApiRequest`] and hands back the raw status,
//! headers and body. It never interprets the status code; that is the job of
//! the [`ResponseDecoder`](crate::decoder::ResponseDecoder). The production
//! implementation is backed by `reqwest`.

use crate::headers::REQUEST_ID;
use crate::Result;
use async_trait::async_trait;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, IntoHeaderName, AUTHORIZATION, CONTENT_TYPE,
};
use reqwest::{Client, ClientBuilder, Method, StatusCode};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};
use triton_core::client::ClientConfig;
use triton_core::error::{REQUEST_ID_KEY, REQUEST_ID_NOT_SET};
use triton_core::Error;
use url::Url;

const USER_AGENT: &str = concat!("triton-cloudapi/", env!("CARGO_PKG_VERSION"));
const REDACTED: &str = "[redacted]";

/// A fully described HTTP request relative to the CloudAPI base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    body: Option<Vec<u8>>,
}

impl ApiRequest {
    /// Create a request for the given method and path.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// `GET` request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// `HEAD` request.
    pub fn head(path: impl Into<String>) -> Self {
        Self::new(Method::HEAD, path)
    }

    /// `POST` request.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// `PUT` request.
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    /// `DELETE` request.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach query parameters.
    #[must_use]
    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }

    /// Attach a header.
    #[must_use]
    pub fn with_header<K: IntoHeaderName>(mut self, name: K, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Serialize `body` as the JSON request payload.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidArgument` error if the body cannot be serialized.
    pub fn with_json<B>(mut self, body: &B) -> Result<Self>
    where
        B: Serialize + ?Sized,
    {
        let bytes = serde_json::to_vec(body).map_err(|err| {
            Error::invalid_argument(format!("Failed to encode request body: {err}"))
        })?;
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.body = Some(bytes);
        Ok(self)
    }

    /// Insert or replace a header.
    pub fn set_header<K: IntoHeaderName>(&mut self, name: K, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    /// HTTP method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Path relative to the base URL.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Query parameters.
    #[must_use]
    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    /// Request headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Encoded body, if any.
    #[must_use]
    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Header value as a string.
    #[must_use]
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Returns true if sending the request twice has the same effect as sending it once.
    #[must_use]
    pub fn is_idempotent(&self) -> bool {
        matches!(
            self.method,
            Method::GET
                | Method::HEAD
                | Method::PUT
                | Method::DELETE
                | Method::OPTIONS
                | Method::TRACE
        )
    }

    /// Render the headers for diagnostics with credentials redacted.
    #[must_use]
    pub fn header_snapshot(&self) -> String {
        let mut names: Vec<&HeaderName> = self.headers.keys().collect();
        names.sort_by(|a, b| a.as_str().cmp(b.as_str()));

        names
            .into_iter()
            .flat_map(|name| {
                self.headers.get_all(name).iter().map(move |value| {
                    if *name == AUTHORIZATION {
                        format!("{name}: {REDACTED}")
                    } else {
                        format!("{name}: {}", value.to_str().unwrap_or("<binary>"))
                    }
                })
            })
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Record this request in an error's context.
    ///
    /// The request id is only set if the error does not carry one yet, so an
    /// id reported by the server takes precedence.
    #[must_use]
    pub fn annotate(&self, mut error: Error) -> Error {
        let request_id = self
            .header_value(REQUEST_ID)
            .unwrap_or(REQUEST_ID_NOT_SET)
            .to_string();

        let context = error.context_mut();
        context.set_if_absent(REQUEST_ID_KEY, request_id);
        context.set("requestMethod", self.method.as_str());
        context.set("requestPath", self.path.as_str());
        context.set("requestHeaders", self.header_snapshot());
        error
    }
}

/// Raw HTTP response as produced by a [`Transport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    /// Status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body, possibly empty
    pub body: Vec<u8>,
}

impl RawResponse {
    /// Response with the given status, no headers and an empty body.
    #[must_use]
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    /// Add a header.
    #[must_use]
    pub fn with_header(mut self, name: &'static str, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Replace the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }
}

/// Sends requests to CloudAPI.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request. Any status code is a successful exchange; only
    /// I/O-level failures are reported as errors.
    async fn execute(&self, request: &ApiRequest) -> Result<RawResponse>;
}

/// Creates one transport handle per connection context.
pub trait TransportFactory: Send + Sync {
    /// Build a transport handle.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error if the transport cannot be built.
    fn create(&self) -> Result<Box<dyn Transport>>;
}

/// `reqwest`-backed transport.
#[derive(Clone)]
pub struct ReqwestTransport {
    http: Client,
    base_url: Url,
    log_responses: bool,
}

impl fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl ReqwestTransport {
    /// Build a transport for the given base URL.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error if the HTTP client cannot be created.
    pub fn new(base_url: &Url, config: &ClientConfig) -> Result<Self> {
        let mut builder = ClientBuilder::new()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .connect_timeout(Duration::from_secs(10))
            .gzip(config.enable_compression);

        if config.accept_invalid_certs {
            warn!("TLS verification disabled for CloudAPI client");
            builder = builder.danger_accept_invalid_certs(true);
        }

        let http = builder
            .build()
            .map_err(|err| Error::config(format!("Failed to build CloudAPI HTTP client: {err}")))?;

        Ok(Self {
            http,
            base_url: normalize_base_url(base_url),
            log_responses: config.enable_logging,
        })
    }

    /// Base URL requests are resolved against.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn build_url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|err| Error::invalid_argument(format!("Invalid request path `{path}`: {err}")))
    }
}

fn normalize_base_url(base_url: &Url) -> Url {
    let mut url = base_url.clone();
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: &ApiRequest) -> Result<RawResponse> {
        let url = self.build_url(request.path())?;

        let mut builder = self
            .http
            .request(request.method().clone(), url)
            .headers(request.headers().clone());

        if !request.query().is_empty() {
            builder = builder.query(request.query());
        }
        if let Some(body) = request.body() {
            builder = builder.body(body.to_vec());
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        if self.log_responses {
            debug!(
                method = %request.method(),
                path = %request.path(),
                status = status.as_u16(),
                bytes = body.len(),
                "CloudAPI response received"
            );
        }

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}

/// Hands out [`ReqwestTransport`] handles sharing one connection pool.
#[derive(Debug, Clone)]
pub struct ReqwestTransportFactory {
    transport: ReqwestTransport,
}

impl ReqwestTransportFactory {
    /// Build the shared HTTP client.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error if the HTTP client cannot be created.
    pub fn new(base_url: &Url, config: &ClientConfig) -> Result<Self> {
        Ok(Self {
            transport: ReqwestTransport::new(base_url, config)?,
        })
    }
}

impl TransportFactory for ReqwestTransportFactory {
    fn create(&self) -> Result<Box<dyn Transport>> {
        Ok(Box::new(self.transport.clone()))
    }
}
