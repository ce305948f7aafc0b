//! Request signing.
//!
//! CloudAPI authenticates every request with an HTTP Signature over the
//! `date` header. The key material and the signing primitive live behind
//! [`SignatureProvider`]; [`AuthState`] turns a provider into the headers
//! attached to each outgoing request, so requests are signed up front and no
//! challenge round trip is needed.

use crate::headers::DATE;
use crate::transport::ApiRequest;
use crate::Result;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderValue, AUTHORIZATION};
use std::fmt;
use std::sync::Arc;
use triton_core::Error;

const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Produces HTTP Signature values for a single key.
pub trait SignatureProvider: Send + Sync {
    /// Signature algorithm name, e.g. `rsa-sha256`.
    fn algorithm(&self) -> &str;

    /// Fingerprint identifying the key to the server.
    fn fingerprint(&self) -> &str;

    /// Sign `data`, returning the base64-encoded signature.
    ///
    /// # Errors
    ///
    /// Returns an error if the key cannot produce a signature.
    fn sign(&self, data: &[u8]) -> Result<String>;
}

/// Shared authentication state for one connection context.
#[derive(Clone)]
pub struct AuthState {
    key_id: String,
    signer: Arc<dyn SignatureProvider>,
}

impl fmt::Debug for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthState")
            .field("key_id", &self.key_id)
            .field("algorithm", &self.signer.algorithm())
            .finish()
    }
}

impl AuthState {
    /// Build the state for `account` signing with `signer`.
    pub fn new(account: &str, signer: Arc<dyn SignatureProvider>) -> Self {
        let key_id = format!("/{account}/keys/{}", signer.fingerprint());
        Self { key_id, signer }
    }

    /// Use `fingerprint` in the `keyId` instead of the signer's own.
    #[must_use]
    pub fn with_fingerprint(mut self, account: &str, fingerprint: &str) -> Self {
        self.key_id = format!("/{account}/keys/{fingerprint}");
        self
    }

    /// `keyId` sent in the authorization header.
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Stamp `date` and `authorization` headers onto the request.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails or produces an invalid header value.
    pub fn authorize(&self, request: &mut ApiRequest, now: DateTime<Utc>) -> Result<()> {
        let date = now.format(HTTP_DATE_FORMAT).to_string();
        let signature = self.signer.sign(format!("date: {date}").as_bytes())?;

        let authorization = format!(
            "Signature keyId=\"{}\",algorithm=\"{}\",signature=\"{signature}\"",
            self.key_id,
            self.signer.algorithm()
        );

        request.set_header(DATE, header_value(&date)?);
        request.set_header(AUTHORIZATION, header_value(&authorization)?);
        Ok(())
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|err| Error::invalid_argument(format!("Invalid authentication header: {err}")))
}
