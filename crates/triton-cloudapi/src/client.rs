//! CloudAPI entry point.

use crate::auth::{AuthState, SignatureProvider};
use crate::context::ConnectionContext;
use crate::images::Images;
use crate::instances::Instances;
use crate::packages::Packages;
use crate::transport::{ReqwestTransportFactory, TransportFactory};
use crate::Result;
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use triton_core::client::{ClientConfig, RetryPolicy};
use triton_core::config::CloudApiConfig;
use triton_core::Error;
use validator::Validate;

/// Builder for [`CloudApi`].
pub struct CloudApiBuilder {
    config: CloudApiConfig,
    http: Option<ClientConfig>,
    retry: Option<RetryPolicy>,
    signer: Option<Arc<dyn SignatureProvider>>,
    transport_factory: Option<Arc<dyn TransportFactory>>,
}

impl fmt::Debug for CloudApiBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudApiBuilder")
            .field("config", &self.config)
            .field("http", &self.http)
            .field("retry", &self.retry)
            .field("signer", &self.signer.is_some())
            .field("custom_transport", &self.transport_factory.is_some())
            .finish()
    }
}

impl CloudApiBuilder {
    /// Start from the given configuration.
    #[must_use]
    pub const fn new(config: CloudApiConfig) -> Self {
        Self {
            config,
            http: None,
            retry: None,
            signer: None,
            transport_factory: None,
        }
    }

    /// Override the HTTP client configuration.
    ///
    /// The timeout and TLS settings of the [`CloudApiConfig`] still apply.
    /// Its retry policy is used unless one is set with
    /// [`CloudApiBuilder::with_retry_policy`].
    #[must_use]
    pub fn with_http_config(mut self, config: ClientConfig) -> Self {
        self.http = Some(config);
        self
    }

    /// Override the retry policy derived from `retries`.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Sign requests with the given key.
    #[must_use]
    pub fn with_signer(mut self, signer: Arc<dyn SignatureProvider>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Use a custom transport instead of `reqwest`.
    #[must_use]
    pub fn with_transport_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.transport_factory = Some(factory);
        self
    }

    /// Build the client.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error if the configuration is invalid, if signing is
    /// enabled without a signer, or if the HTTP client cannot be created.
    pub fn build(self) -> Result<CloudApi> {
        self.config.validate()?;
        let base_url = self.config.parse_url()?;

        let signer = if self.config.signing_enabled() {
            let signer = self.signer.ok_or_else(|| {
                Error::config("Request signing is enabled but no signer was configured")
                    .with_context("account", &self.config.account)
            })?;
            Some(signer)
        } else {
            None
        };

        let retry_policy = self
            .retry
            .or_else(|| self.http.as_ref().map(|http| http.retry_policy))
            .unwrap_or_else(|| RetryPolicy::new().with_max_retries(self.config.retries));

        let transport_factory = match self.transport_factory {
            Some(factory) => factory,
            None => {
                let http = self
                    .http
                    .unwrap_or_default()
                    .with_timeout(self.config.timeout())
                    .with_retry_policy(retry_policy)
                    .with_accept_invalid_certs(self.config.tls_insecure);
                Arc::new(ReqwestTransportFactory::new(&base_url, &http)?)
            }
        };

        debug!(
            url = %base_url,
            account = %self.config.account,
            signed = signer.is_some(),
            "Built CloudAPI client"
        );

        Ok(CloudApi {
            config: Arc::new(self.config),
            retry_policy,
            signer,
            transport_factory,
        })
    }
}

/// Asynchronous CloudAPI client.
///
/// Cheap to clone. Every unit of work acquires its own
/// [`ConnectionContext`] through [`CloudApi::connection_context`] and passes
/// it to the instance, image and package accessors.
#[derive(Clone)]
pub struct CloudApi {
    config: Arc<CloudApiConfig>,
    retry_policy: RetryPolicy,
    signer: Option<Arc<dyn SignatureProvider>>,
    transport_factory: Arc<dyn TransportFactory>,
}

impl fmt::Debug for CloudApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudApi")
            .field("url", &self.config.url)
            .field("account", &self.config.account)
            .field("signed", &self.signer.is_some())
            .finish_non_exhaustive()
    }
}

impl CloudApi {
    /// Build a client with `reqwest` transport and no signer.
    ///
    /// # Errors
    ///
    /// Fails like [`CloudApiBuilder::build`]; in particular signing must be
    /// disabled with `no_auth` since no signer is configured.
    pub fn new(config: CloudApiConfig) -> Result<Self> {
        CloudApiBuilder::new(config).build()
    }

    /// Start building a client.
    #[must_use]
    pub const fn builder(config: CloudApiConfig) -> CloudApiBuilder {
        CloudApiBuilder::new(config)
    }

    /// Client configuration.
    #[must_use]
    pub fn config(&self) -> &CloudApiConfig {
        &self.config
    }

    /// Account requests are made for.
    #[must_use]
    pub fn account(&self) -> &str {
        &self.config.account
    }

    /// Acquire a connection context for one unit of work.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport cannot be created or the configured
    /// API version is not a valid header value.
    pub fn connection_context(&self) -> Result<ConnectionContext> {
        let transport = self.transport_factory.create()?;
        let account = &self.config.account;
        let auth = self.signer.as_ref().map(|signer| {
            let auth = AuthState::new(account, Arc::clone(signer));
            match &self.config.key_id {
                Some(key_id) => auth.with_fingerprint(account, key_id),
                None => auth,
            }
        });

        ConnectionContext::new(transport, auth, self.retry_policy)
            .with_api_version(&self.config.api_version)
    }

    /// Instance operations over `context`.
    #[must_use]
    pub fn instances<'a>(&'a self, context: &'a ConnectionContext) -> Instances<'a> {
        Instances::new(self.account(), context)
    }

    /// Image operations over `context`.
    #[must_use]
    pub fn images<'a>(&'a self, context: &'a ConnectionContext) -> Images<'a> {
        Images::new(self.account(), context)
    }

    /// Package operations over `context`.
    #[must_use]
    pub fn packages<'a>(&'a self, context: &'a ConnectionContext) -> Packages<'a> {
        Packages::new(self.account(), context)
    }
}
