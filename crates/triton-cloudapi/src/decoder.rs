//! Response decoding and error classification.
//!
//! Every CloudAPI operation describes how its responses are interpreted with a
//! [`ResponseDecoder`]: which statuses count as success, which statuses mean
//! "the entity does not exist" (an absent result rather than an error) and
//! whether an empty body is acceptable. Anything else becomes a `Protocol`
//! error carrying the server's error body, or its raw text when the body is
//! not a CloudAPI error document.

use crate::headers::response_request_id;
use crate::transport::{ApiRequest, RawResponse};
use crate::Result;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::debug;
use triton_core::error::REQUEST_ID_KEY;
use triton_core::{Error, ErrorDetail};

/// Decoded response: typed body (when present), status and headers.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseEnvelope<T> {
    /// Decoded body, absent for "no value" targets and absent-status responses
    pub body: Option<T>,
    /// Status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
}

impl<T> ResponseEnvelope<T> {
    /// Take the decoded body.
    pub fn into_body(self) -> Option<T> {
        self.body
    }
}

/// Per-operation response interpretation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseDecoder {
    operation: &'static str,
    success: &'static [StatusCode],
    absent_on: &'static [StatusCode],
    empty_body_is_absent: bool,
}

impl ResponseDecoder {
    /// Decoder accepting the given success statuses.
    #[must_use]
    pub const fn new(operation: &'static str, success: &'static [StatusCode]) -> Self {
        Self {
            operation,
            success,
            absent_on: &[],
            empty_body_is_absent: false,
        }
    }

    /// Treat these statuses as "entity absent" instead of failure.
    #[must_use]
    pub const fn absent_on(mut self, statuses: &'static [StatusCode]) -> Self {
        self.absent_on = statuses;
        self
    }

    /// Accept an empty success body as an absent value.
    #[must_use]
    pub const fn allow_empty_body(mut self) -> Self {
        self.empty_body_is_absent = true;
        self
    }

    /// Operation name used in error messages.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        self.operation
    }

    /// Decode the response body into `T`.
    ///
    /// # Errors
    ///
    /// Returns a `Protocol` error for statuses outside the success and absent
    /// sets, or a `Decode` error if a success body does not match `T`.
    pub fn decode<T>(
        &self,
        request: &ApiRequest,
        response: RawResponse,
    ) -> Result<ResponseEnvelope<T>>
    where
        T: DeserializeOwned,
    {
        let RawResponse {
            status,
            headers,
            body,
        } = response;

        if let Some(envelope) = self.check_status(request, status, &headers, &body)? {
            return Ok(envelope);
        }

        let decoded = if body.iter().all(u8::is_ascii_whitespace) {
            if !self.empty_body_is_absent {
                return Err(self.decode_failure(
                    request,
                    status,
                    &headers,
                    &body,
                    "empty response body",
                ));
            }
            None
        } else {
            let value = serde_json::from_slice::<T>(&body).map_err(|err| {
                self.decode_failure(request, status, &headers, &body, &err.to_string())
            })?;
            Some(value)
        };

        Ok(ResponseEnvelope {
            body: decoded,
            status,
            headers,
        })
    }

    /// Check the status and keep only the headers; the body is never decoded.
    ///
    /// # Errors
    ///
    /// Returns a `Protocol` error for statuses outside the success and absent sets.
    pub fn discard(
        &self,
        request: &ApiRequest,
        response: RawResponse,
    ) -> Result<ResponseEnvelope<()>> {
        let RawResponse {
            status,
            headers,
            body,
        } = response;

        if let Some(envelope) = self.check_status(request, status, &headers, &body)? {
            return Ok(envelope);
        }

        Ok(ResponseEnvelope {
            body: None,
            status,
            headers,
        })
    }

    fn check_status<T>(
        &self,
        request: &ApiRequest,
        status: StatusCode,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<Option<ResponseEnvelope<T>>> {
        if self.absent_on.contains(&status) {
            debug!(
                operation = self.operation,
                path = %request.path(),
                status = status.as_u16(),
                "CloudAPI reported entity absent"
            );
            return Ok(Some(ResponseEnvelope {
                body: None,
                status,
                headers: headers.clone(),
            }));
        }

        if self.success.contains(&status) {
            return Ok(None);
        }

        Err(self.remote_failure(request, status, headers, body))
    }

    fn remote_failure(
        &self,
        request: &ApiRequest,
        status: StatusCode,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Error {
        let text = String::from_utf8_lossy(body);
        let detail = serde_json::from_slice::<ErrorDetail>(body)
            .ok()
            .filter(ErrorDetail::is_meaningful);

        let mut message = format!("{} failed [{}]", self.operation, status_label(status));
        match &detail {
            Some(detail) => {
                message.push_str(": ");
                message.push_str(detail.summary());
            }
            None if !text.trim().is_empty() => {
                message.push_str(": ");
                message.push_str(text.trim());
            }
            None => {}
        }

        let mut error = Error::protocol(status.as_u16(), message);
        if let Some(request_id) = response_request_id(headers) {
            error = error.with_context(REQUEST_ID_KEY, request_id);
        }
        error = error.with_context("statusCode", status.as_u16());
        error = match detail {
            Some(detail) => error.with_detail(detail),
            None if !text.is_empty() => error.with_context("entityText", text),
            None => error,
        };

        request.annotate(error)
    }

    fn decode_failure(
        &self,
        request: &ApiRequest,
        status: StatusCode,
        headers: &HeaderMap,
        body: &[u8],
        reason: &str,
    ) -> Error {
        let mut error = Error::decode(format!(
            "{} returned an undecodable body [{}]: {reason}",
            self.operation,
            status_label(status)
        ));
        if let Some(request_id) = response_request_id(headers) {
            error = error.with_context(REQUEST_ID_KEY, request_id);
        }
        error = error
            .with_context("statusCode", status.as_u16())
            .with_context("entityText", String::from_utf8_lossy(body));

        request.annotate(error)
    }
}

fn status_label(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {reason}", status.as_u16()),
        None => status.as_u16().to_string(),
    }
}
