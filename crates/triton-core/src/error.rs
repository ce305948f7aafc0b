//! Error types for CloudAPI operations.
//!
//! Every failure that crosses the transport boundary is represented by a single
//! [`Error`] value carrying an inspectable [`ErrorKind`], a human-readable
//! message and an ordered [`ErrorContext`] bag (request id, request headers,
//! raw response text and so on) for programmatic handling.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Placeholder stored under [`REQUEST_ID_KEY`] when no request id is known.
pub const REQUEST_ID_NOT_SET: &str = "[not set]";

/// Context key holding the request id.
pub const REQUEST_ID_KEY: &str = "requestId";

/// I/O-level failure classes a transport can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TransportFailure {
    /// The I/O operation was interrupted
    Interrupted,
    /// The host name could not be resolved
    UnknownHost,
    /// The remote end refused the connection
    ConnectionRefused,
    /// TLS negotiation failed
    TlsHandshake,
    /// The request timed out
    Timeout,
    /// The connection was reset or closed mid-exchange
    ConnectionReset,
    /// The server closed the connection without sending a response
    NoResponse,
    /// Any other I/O failure
    Other,
}

impl TransportFailure {
    /// Returns true if a request that failed this way may be sent again.
    #[must_use]
    pub const fn is_retriable(self) -> bool {
        !matches!(
            self,
            Self::Interrupted | Self::UnknownHost | Self::ConnectionRefused | Self::TlsHandshake
        )
    }

    /// Classifies an error by walking its source chain.
    #[must_use]
    pub fn classify(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut current = Some(err);

        while let Some(cause) = current {
            if let Some(io) = cause.downcast_ref::<std::io::Error>() {
                match io.kind() {
                    std::io::ErrorKind::ConnectionRefused => return Self::ConnectionRefused,
                    std::io::ErrorKind::Interrupted => return Self::Interrupted,
                    std::io::ErrorKind::TimedOut => return Self::Timeout,
                    std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::UnexpectedEof => return Self::ConnectionReset,
                    _ => {}
                }
            }

            let text = cause.to_string().to_ascii_lowercase();
            if text.contains("dns error") || text.contains("failed to lookup address") {
                return Self::UnknownHost;
            }
            if text.contains("certificate")
                || text.contains("tls handshake")
                || text.contains("invalid peer")
            {
                return Self::TlsHandshake;
            }
            if text.contains("connection refused") {
                return Self::ConnectionRefused;
            }
            if text.contains("connection closed before message completed") {
                return Self::NoResponse;
            }
            if text.contains("connection reset") {
                return Self::ConnectionReset;
            }

            current = cause.source();
        }

        Self::Other
    }
}

/// Consistency anomalies detected while observing a remote entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ConsistencyFailure {
    /// The entity was found earlier but has since disappeared
    EntityGone,
    /// The backend returned a different entity than the one requested
    IdMismatch,
}

/// Failure classification for [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// Network or I/O failure; may be retried depending on the failure class
    Transport(TransportFailure),
    /// The server answered with an error status
    Protocol,
    /// A success response carried a body that did not match the expected shape
    Decode,
    /// The remote state contradicted an invariant observed earlier
    Consistency(ConsistencyFailure),
    /// Invalid client configuration
    Config,
    /// Invalid argument supplied by the caller
    InvalidArgument,
}

/// Ordered key/value bag attached to an [`Error`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorContext {
    entries: Vec<(String, String)>,
}

impl ErrorContext {
    /// Create an empty context.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Set a value, replacing an existing entry with the same key in place.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();

        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    /// Set a value only when the key is not present yet.
    pub fn set_if_absent(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        if self.get(&key).is_none() {
            self.entries.push((key, value.into()));
        }
    }

    /// Look up a value by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Iterate over the entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the context holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, (key, value)) in self.entries.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}={value}")?;
        }
        Ok(())
    }
}

/// Structured error body returned by CloudAPI.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorDetail {
    /// Machine-readable error code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Human-readable error message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Per-field sub-errors, with non-string values rendered as JSON text
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "deserialize_sub_errors"
    )]
    pub errors: Vec<BTreeMap<String, String>>,
}

fn deserialize_sub_errors<'de, D>(
    deserializer: D,
) -> std::result::Result<Vec<BTreeMap<String, String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<Vec<BTreeMap<String, serde_json::Value>>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|entry| {
            entry
                .into_iter()
                .filter(|(_, value)| !value.is_null())
                .map(|(key, value)| match value {
                    serde_json::Value::String(text) => (key, text),
                    other => (key, other.to_string()),
                })
                .collect()
        })
        .collect())
}

impl ErrorDetail {
    /// Returns true if the body carried a code or a message.
    #[must_use]
    pub fn is_meaningful(&self) -> bool {
        self.code.is_some() || self.message.is_some()
    }

    /// Best available description: the message, else the code.
    #[must_use]
    pub fn summary(&self) -> &str {
        self.message
            .as_deref()
            .or(self.code.as_deref())
            .unwrap_or_default()
    }
}

/// Main error type for CloudAPI operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub struct Error {
    kind: ErrorKind,
    message: String,
    status: Option<u16>,
    detail: Option<ErrorDetail>,
    context: ErrorContext,
}

/// Specialized result type for CloudAPI operations.
pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if !self.context.is_empty() {
            write!(f, " [{}]", self.context)?;
        }
        Ok(())
    }
}

impl Error {
    /// Create an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            detail: None,
            context: ErrorContext::new(),
        }
    }

    /// I/O-level failure.
    pub fn transport(failure: TransportFailure, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport(failure), message)
    }

    /// Server-reported failure for the given HTTP status.
    pub fn protocol(status: u16, message: impl Into<String>) -> Self {
        let mut error = Self::new(ErrorKind::Protocol, message);
        error.status = Some(status);
        error
    }

    /// Success response whose body could not be decoded.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Decode, message)
    }

    /// Remote state contradicted an earlier observation.
    pub fn consistency(failure: ConsistencyFailure, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Consistency(failure), message)
    }

    /// Invalid configuration.
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    /// Invalid caller-supplied argument.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    /// Attach the decoded server error body.
    #[must_use]
    pub fn with_detail(mut self, detail: ErrorDetail) -> Self {
        if let Some(code) = &detail.code {
            self.context.set("serverCode", code.clone());
        }
        if let Some(message) = &detail.message {
            self.context.set("serverMessage", message.clone());
        }
        if !detail.errors.is_empty() {
            let rendered = detail
                .errors
                .iter()
                .map(|entry| {
                    entry
                        .iter()
                        .map(|(k, v)| format!("{k}: {v}"))
                        .collect::<Vec<_>>()
                        .join("; ")
                })
                .collect::<Vec<_>>()
                .join(" | ");
            self.context.set("serverErrors", rendered);
        }
        self.detail = Some(detail);
        self
    }

    /// Add a context entry, replacing any existing value for the key.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.context.set(key, value.to_string());
        self
    }

    /// Failure classification.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Message without the rendered context.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// HTTP status for protocol failures.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        self.status
    }

    /// Decoded server error body, if one was available.
    #[must_use]
    pub const fn detail(&self) -> Option<&ErrorDetail> {
        self.detail.as_ref()
    }

    /// Structured diagnostic context.
    #[must_use]
    pub const fn context(&self) -> &ErrorContext {
        &self.context
    }

    /// Mutable access to the diagnostic context.
    pub fn context_mut(&mut self) -> &mut ErrorContext {
        &mut self.context
    }

    /// Request id recorded in the context.
    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        self.context.get(REQUEST_ID_KEY)
    }

    /// Returns true for transport failures that may be retried.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        match self.kind {
            ErrorKind::Transport(failure) => failure.is_retriable(),
            _ => false,
        }
    }

    /// Returns the error code for this error.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self.kind {
            ErrorKind::Transport(TransportFailure::Timeout) => "TIMEOUT",
            ErrorKind::Transport(_) => "TRANSPORT_ERROR",
            ErrorKind::Protocol => "REMOTE_ERROR",
            ErrorKind::Decode => "DECODE_ERROR",
            ErrorKind::Consistency(ConsistencyFailure::EntityGone) => "ENTITY_GONE",
            ErrorKind::Consistency(ConsistencyFailure::IdMismatch) => "ID_MISMATCH",
            ErrorKind::Config => "CONFIG_ERROR",
            ErrorKind::InvalidArgument => "INVALID_ARGUMENT",
        }
    }

    /// Returns true if this error indicates a bug or misconfiguration worth logging loudly.
    #[must_use]
    pub const fn should_log(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Decode | ErrorKind::Consistency(_) | ErrorKind::Config
        )
    }
}

// Conversions from external error types
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let failure = if err.is_timeout() {
            TransportFailure::Timeout
        } else {
            TransportFailure::classify(&err)
        };
        Self::transport(failure, format!("Error making request to CloudAPI: {err}"))
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::config(format!("Invalid CloudAPI URL: {err}"))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::decode(err.to_string())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::config(err.to_string())
    }
}

impl From<uuid::Error> for Error {
    fn from(err: uuid::Error) -> Self {
        Self::invalid_argument(format!("Invalid UUID: {err}"))
    }
}
