//! Configuration for CloudAPI clients.
//!
//! [`CloudApiConfig`] holds the endpoint, account and signing key settings.
//! It can be built in code, deserialized, or read from the conventional
//! `TRITON_*` / `SDC_*` environment variables, and several sources can be
//! layered with [`CloudApiConfig::overlay`].

use crate::client::{CLOUDAPI_DEFAULT_TIMEOUT_MS, DEFAULT_MAX_RETRIES};
use crate::Error;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;
use url::Url;
use validator::Validate;

/// Default CloudAPI endpoint
pub const DEFAULT_CLOUDAPI_URL: &str = "https://us-east-1.api.joyent.com";

/// Default value of the `api-version` request header
pub const DEFAULT_API_VERSION: &str = "~8";

/// Configuration for a CloudAPI client instance.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CloudApiConfig {
    /// CloudAPI base URL
    #[validate(url)]
    #[serde(default = "default_url")]
    pub url: String,

    /// Account (login) name that owns the resources
    #[validate(length(min = 1))]
    #[serde(default)]
    pub account: String,

    /// Fingerprint of the signing key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,

    /// Path to the private key used for signing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_path: Option<PathBuf>,

    /// Private key material, when supplied inline
    #[serde(skip)]
    pub key_content: Option<SecretString>,

    /// Request timeout in milliseconds
    #[validate(range(min = 1, max = 300_000))]
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Number of retries for failed requests
    #[validate(range(min = 0, max = 10))]
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Send requests without signing them
    #[serde(default)]
    pub no_auth: bool,

    /// Accept invalid TLS certificates
    #[serde(default)]
    pub tls_insecure: bool,

    /// Value of the `api-version` header
    #[serde(default = "default_api_version")]
    pub api_version: String,
}

fn default_url() -> String {
    DEFAULT_CLOUDAPI_URL.to_string()
}

const fn default_timeout_ms() -> u64 {
    CLOUDAPI_DEFAULT_TIMEOUT_MS
}

const fn default_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

fn first_present(lookup: &impl Fn(&str) -> Option<String>, names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|&name| lookup(name))
        .find(|value| !value.trim().is_empty())
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

impl CloudApiConfig {
    /// Create a new configuration for an account at the given endpoint.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error if the URL is invalid or validation fails.
    pub fn new(url: impl Into<String>, account: impl Into<String>) -> Result<Self, Error> {
        let config = Self {
            url: url.into(),
            account: account.into(),
            ..Self::default()
        };

        config
            .validate()
            .map_err(|e| Error::config(format!("Invalid configuration: {e}")))?;

        Ok(config)
    }

    /// Read configuration from the process environment.
    ///
    /// Values that are absent or empty keep their defaults. Unparsable
    /// numbers are ignored with a warning. The result is not validated, so it
    /// can be overlaid on another source first.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through an arbitrary variable lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = first_present(&lookup, &["TRITON_URL", "SDC_URL"]) {
            config.url = url;
        }
        if let Some(account) = first_present(
            &lookup,
            &["TRITON_ACCOUNT", "TRITON_USER", "SDC_ACCOUNT", "SDC_USER"],
        ) {
            config.account = account;
        }
        config.key_id = first_present(&lookup, &["TRITON_KEY_ID", "SDC_KEY_ID"]);
        config.key_path =
            first_present(&lookup, &["TRITON_KEY_PATH", "SDC_KEY_PATH"]).map(PathBuf::from);
        config.key_content =
            first_present(&lookup, &["TRITON_KEY_CONTENT"]).map(SecretString::from);

        if let Some(raw) = first_present(&lookup, &["TRITON_TIMEOUT"]) {
            match raw.trim().parse() {
                Ok(timeout_ms) => config.timeout_ms = timeout_ms,
                Err(e) => warn!(value = %raw, "Ignoring unparsable TRITON_TIMEOUT: {}", e),
            }
        }
        if let Some(raw) = first_present(&lookup, &["TRITON_HTTP_RETRIES"]) {
            match raw.trim().parse() {
                Ok(retries) => config.retries = retries,
                Err(e) => warn!(value = %raw, "Ignoring unparsable TRITON_HTTP_RETRIES: {}", e),
            }
        }
        if let Some(raw) = first_present(&lookup, &["TRITON_NO_AUTH"]) {
            config.no_auth = parse_flag(&raw);
        }
        if let Some(raw) = first_present(&lookup, &["TRITON_TLS_INSECURE", "SDC_TLS_INSECURE"]) {
            config.tls_insecure = parse_flag(&raw);
        }

        config
    }

    /// Layer `other` on top of this configuration.
    ///
    /// Every field of `other` that differs from its default replaces the
    /// corresponding field of `self`.
    #[must_use]
    pub fn overlay(mut self, other: Self) -> Self {
        if other.url != DEFAULT_CLOUDAPI_URL {
            self.url = other.url;
        }
        if !other.account.is_empty() {
            self.account = other.account;
        }
        if other.key_id.is_some() {
            self.key_id = other.key_id;
        }
        if other.key_path.is_some() {
            self.key_path = other.key_path;
        }
        if other.key_content.is_some() {
            self.key_content = other.key_content;
        }
        if other.timeout_ms != CLOUDAPI_DEFAULT_TIMEOUT_MS {
            self.timeout_ms = other.timeout_ms;
        }
        if other.retries != DEFAULT_MAX_RETRIES {
            self.retries = other.retries;
        }
        if other.no_auth {
            self.no_auth = true;
        }
        if other.tls_insecure {
            self.tls_insecure = true;
        }
        if other.api_version != DEFAULT_API_VERSION {
            self.api_version = other.api_version;
        }
        self
    }

    /// Set the account name.
    #[must_use]
    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = account.into();
        self
    }

    /// Set the signing key fingerprint.
    #[must_use]
    pub fn with_key_id(mut self, key_id: impl Into<String>) -> Self {
        self.key_id = Some(key_id.into());
        self
    }

    /// Set the private key path.
    #[must_use]
    pub fn with_key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.key_path = Some(path.into());
        self
    }

    /// Set inline private key material.
    #[must_use]
    pub fn with_key_content(mut self, content: impl Into<String>) -> Self {
        self.key_content = Some(SecretString::from(content.into()));
        self
    }

    /// Set the request timeout in milliseconds.
    #[must_use]
    pub const fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set the number of retries.
    #[must_use]
    pub const fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Disable or enable request signing.
    #[must_use]
    pub const fn with_no_auth(mut self, no_auth: bool) -> Self {
        self.no_auth = no_auth;
        self
    }

    /// Accept invalid TLS certificates.
    #[must_use]
    pub const fn with_tls_insecure(mut self, insecure: bool) -> Self {
        self.tls_insecure = insecure;
        self
    }

    /// Set the `api-version` header value.
    #[must_use]
    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    /// Get the request timeout as a Duration.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Returns true if requests are signed.
    #[must_use]
    pub const fn signing_enabled(&self) -> bool {
        !self.no_auth
    }

    /// Parse the CloudAPI URL.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error if the URL cannot be parsed.
    pub fn parse_url(&self) -> Result<Url, Error> {
        Url::parse(&self.url).map_err(|e| Error::config(format!("Invalid CloudAPI URL: {e}")))
    }
}

impl Default for CloudApiConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            account: String::new(),
            key_id: None,
            key_path: None,
            key_content: None,
            timeout_ms: default_timeout_ms(),
            retries: default_retries(),
            no_auth: false,
            tls_insecure: false,
            api_version: default_api_version(),
        }
    }
}
