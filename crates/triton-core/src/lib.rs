//! # triton-core
//!
//! Core types and utilities shared by the Triton CloudAPI client crates.
//!
//! This crate provides the error taxonomy, configuration, retry policy and
//! strongly-typed identifiers used by `triton-cloudapi`.
//!
//! ## Modules
//!
//! - [`error`] - Tagged error type, failure kinds and structured error context
//! - [`uuid`] - Strongly-typed UUID wrappers for CloudAPI resources
//! - [`config`] - CloudAPI connection configuration and environment loading
//! - [`client`] - HTTP client settings and the retry policy
//! - [`query`] - Query parameter builder used by listing filters

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod error;
pub mod query;
pub mod uuid;

// Re-export commonly used types
pub use error::{Error, ErrorContext, ErrorDetail, ErrorKind, Result};
