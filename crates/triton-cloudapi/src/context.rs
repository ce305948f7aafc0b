//! Connection context: one transport handle plus authentication state.
//!
//! A [`ConnectionContext`] is acquired for one logical operation (or a batch
//! of them) and released by dropping it or calling [`ConnectionContext::close`].
//! Requests issued through it are strictly sequential. Each context carries its
//! own correlation id, recorded on a `tracing` span that every request runs in.
//!
//! A context is `Send` but meant for a single caller at a time; concurrent work
//! should acquire one context per task.

use crate::auth::AuthState;
use crate::decoder::{ResponseDecoder, ResponseEnvelope};
use crate::headers::{API_VERSION, REQUEST_ID};
use crate::retry::execute_with_retry;
use crate::transport::{ApiRequest, RawResponse, Transport};
use crate::Result;
use chrono::Utc;
use reqwest::header::{HeaderValue, ACCEPT};
use serde::de::DeserializeOwned;
use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument, Span};
use triton_core::client::RetryPolicy;
use triton_core::config::DEFAULT_API_VERSION;
use triton_core::Error;
use uuid::Uuid;

/// Scoped bundle of transport handle, auth state and retry policy.
pub struct ConnectionContext {
    transport: Box<dyn Transport>,
    auth: Option<AuthState>,
    retry_policy: RetryPolicy,
    api_version: HeaderValue,
    correlation_id: Uuid,
    span: Span,
    interrupt: CancellationToken,
}

impl fmt::Debug for ConnectionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionContext")
            .field("correlation_id", &self.correlation_id)
            .field("signed", &self.auth.is_some())
            .field("retry_policy", &self.retry_policy)
            .finish_non_exhaustive()
    }
}

impl ConnectionContext {
    /// Create a context around a transport handle.
    ///
    /// Passing `None` for `auth` sends unsigned requests.
    pub fn new(
        transport: Box<dyn Transport>,
        auth: Option<AuthState>,
        retry_policy: RetryPolicy,
    ) -> Self {
        let correlation_id = Uuid::new_v4();
        let span = info_span!("cloudapi_context", correlation_id = %correlation_id);
        debug!(parent: &span, signed = auth.is_some(), "Opened CloudAPI connection context");

        Self {
            transport,
            auth,
            retry_policy,
            api_version: HeaderValue::from_static(DEFAULT_API_VERSION),
            correlation_id,
            span,
            interrupt: CancellationToken::new(),
        }
    }

    /// Override the `api-version` header.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error if the version is not a valid header value.
    pub fn with_api_version(mut self, version: &str) -> Result<Self> {
        self.api_version = HeaderValue::from_str(version)
            .map_err(|err| Error::config(format!("Invalid api-version `{version}`: {err}")))?;
        Ok(self)
    }

    /// Correlation id tying together every request of this context.
    #[must_use]
    pub const fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    /// Returns true if requests are signed.
    #[must_use]
    pub const fn is_signed(&self) -> bool {
        self.auth.is_some()
    }

    /// Retry policy applied to requests.
    #[must_use]
    pub const fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Token that interrupts waits started on this context.
    ///
    /// Cancelling it makes a running state-change poll return
    /// `PollOutcome::Interrupted`. In-flight HTTP calls are not aborted.
    #[must_use]
    pub fn interrupt_handle(&self) -> CancellationToken {
        self.interrupt.clone()
    }

    pub(crate) const fn interrupt_token(&self) -> &CancellationToken {
        &self.interrupt
    }

    /// Stamp standard headers, sign and send the request with retries.
    ///
    /// # Errors
    ///
    /// Returns a transport failure after the retry policy gives up, or an
    /// error if the request cannot be signed.
    pub async fn execute(&self, request: &mut ApiRequest) -> Result<RawResponse> {
        let request_id = Uuid::new_v4();
        let request_id_value = HeaderValue::from_str(&request_id.to_string())
            .map_err(|err| Error::invalid_argument(format!("Invalid request id: {err}")))?;

        request.set_header(REQUEST_ID, request_id_value);
        request.set_header(ACCEPT, HeaderValue::from_static("application/json"));
        request.set_header(API_VERSION, self.api_version.clone());

        if let Some(auth) = &self.auth {
            auth.authorize(request, Utc::now())
                .map_err(|err| request.annotate(err))?;
        }

        let span = self.span.clone();
        info!(
            parent: &span,
            method = %request.method(),
            path = %request.path(),
            request_id = %request_id,
            "Sending CloudAPI request"
        );

        execute_with_retry(self.transport.as_ref(), &self.retry_policy, request)
            .instrument(span)
            .await
    }

    /// Send the request and decode the body into `T`.
    ///
    /// # Errors
    ///
    /// Propagates transport, protocol and decode failures.
    pub async fn fetch<T>(
        &self,
        decoder: &ResponseDecoder,
        mut request: ApiRequest,
    ) -> Result<ResponseEnvelope<T>>
    where
        T: DeserializeOwned,
    {
        let response = self.execute(&mut request).await?;
        let result = decoder.decode(&request, response);
        if let Err(err) = &result {
            self.log_failure(decoder, err);
        }
        result
    }

    /// Send the request and check its status, ignoring the body.
    ///
    /// # Errors
    ///
    /// Propagates transport and protocol failures.
    pub async fn fetch_discard(
        &self,
        decoder: &ResponseDecoder,
        mut request: ApiRequest,
    ) -> Result<ResponseEnvelope<()>> {
        let response = self.execute(&mut request).await?;
        let result = decoder.discard(&request, response);
        if let Err(err) = &result {
            self.log_failure(decoder, err);
        }
        result
    }

    /// Release the transport handle and end the correlation scope.
    pub fn close(self) {
        drop(self);
    }

    fn log_failure(&self, decoder: &ResponseDecoder, err: &Error) {
        if err.should_log() {
            warn!(
                parent: &self.span,
                operation = decoder.operation(),
                code = err.error_code(),
                "CloudAPI response could not be handled: {}",
                err
            );
        }
    }
}

impl Drop for ConnectionContext {
    fn drop(&mut self) {
        debug!(parent: &self.span, "Closing CloudAPI connection context");
    }
}
