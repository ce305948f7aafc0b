//! Asynchronous client for the Triton CloudAPI.
//!
//! Requests go through a [`ConnectionContext`] acquired from [`CloudApi`]
//! for each unit of work. Every response is interpreted by a per-operation
//! [`ResponseDecoder`], transport failures are retried according to the
//! configured [`RetryPolicy`](triton_core::client::RetryPolicy), collections
//! are listed with a `HEAD` probe followed by a conditional fetch, and
//! provisioning transitions are awaited with
//! [`Instances::wait_for_state_change`].
//!
//! ```no_run
//! # async fn run() -> triton_cloudapi::Result<()> {
//! use triton_cloudapi::{CloudApi, InstanceFilter};
//! use triton_core::config::CloudApiConfig;
//!
//! let config = CloudApiConfig::from_env().with_no_auth(true);
//! let api = CloudApi::new(config)?;
//! let context = api.connection_context()?;
//!
//! let running = api
//!     .instances(&context)
//!     .list_with_filter(&InstanceFilter::new().with_state("running"))
//!     .await?;
//! for instance in running {
//!     println!("{} {:?}", instance.id, instance.name);
//! }
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod client;
pub mod context;
pub mod decoder;
pub mod filters;
pub mod headers;
pub mod images;
pub mod instances;
pub mod models;
pub mod packages;
pub mod pagination;
pub mod poller;
pub mod retry;
pub mod transport;

pub use auth::{AuthState, SignatureProvider};
pub use client::{CloudApi, CloudApiBuilder};
pub use context::ConnectionContext;
pub use decoder::{ResponseDecoder, ResponseEnvelope};
pub use filters::{ImageFilter, InstanceFilter, PackageFilter};
pub use images::Images;
pub use instances::Instances;
pub use models::{CreateInstanceRequest, Image, ImageFile, Instance, Locality, Package};
pub use packages::Packages;
pub use pagination::{Listing, PageStream, PaginationMetadata};
pub use poller::{PollOutcome, PollSettings, Stateful};
pub use transport::{
    ApiRequest, RawResponse, ReqwestTransport, ReqwestTransportFactory, Transport, TransportFactory,
};

/// Convenient result alias that reuses the shared Triton error type.
pub type Result<T> = triton_core::Result<T>;
