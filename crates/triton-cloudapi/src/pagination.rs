//! Two-phase collection listing.
//!
//! Listing a collection first sends a `HEAD` probe with the same filters to
//! learn the resource count. A count of zero ends the operation without
//! fetching the body. Otherwise the listing is fetched and its own headers
//! decide the shape of the result: when the whole collection fits in one page
//! the items are returned as a materialized [`Listing`], otherwise as a
//! single-pass stream over the fetched page.
//!
//! Subsequent pages are never fetched. A streamed listing reports through
//! [`Listing::is_complete`] whether the page may be truncated.

use crate::context::ConnectionContext;
use crate::decoder::ResponseDecoder;
use crate::headers::{header_str, QUERY_LIMIT, RESOURCE_COUNT};
use crate::transport::ApiRequest;
use crate::Result;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::debug;

/// Page size assumed when the server does not report one.
pub const DEFAULT_QUERY_LIMIT: u32 = 1000;

const PROBE: ResponseDecoder = ResponseDecoder::new("get headers", &[StatusCode::OK]);
const LIST: ResponseDecoder = ResponseDecoder::new("list", &[StatusCode::OK]);

/// Pagination headers of a listing or probe response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationMetadata {
    /// Total number of matching resources, `None` when not reported
    pub resource_count: Option<u64>,
    /// Maximum number of resources per response
    pub query_limit: u32,
}

impl PaginationMetadata {
    /// Read `x-resource-count` and `x-query-limit`.
    ///
    /// A missing or unparsable count is unknown; a missing or unparsable
    /// limit falls back to [`DEFAULT_QUERY_LIMIT`].
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let resource_count =
            header_str(headers, RESOURCE_COUNT).and_then(|value| value.parse().ok());
        let query_limit = header_str(headers, QUERY_LIMIT)
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_QUERY_LIMIT);

        Self {
            resource_count,
            query_limit,
        }
    }

    /// Returns true if the server reported zero matching resources.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self.resource_count, Some(0))
    }

    /// Returns true if the whole collection is known to fit in one response.
    #[must_use]
    pub const fn fits_single_page(&self) -> bool {
        match self.resource_count {
            Some(count) => count < self.query_limit as u64,
            None => false,
        }
    }
}

/// Single-pass iterator over one fetched listing page.
#[derive(Debug)]
pub struct PageStream<T> {
    items: std::vec::IntoIter<T>,
    page_len: usize,
    metadata: PaginationMetadata,
}

impl<T> PageStream<T> {
    fn new(items: Vec<T>, metadata: PaginationMetadata) -> Self {
        Self {
            page_len: items.len(),
            items: items.into_iter(),
            metadata,
        }
    }

    /// Pagination headers of the page.
    #[must_use]
    pub const fn metadata(&self) -> PaginationMetadata {
        self.metadata
    }
}

impl<T> Iterator for PageStream<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.items.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.items.size_hint()
    }
}

impl<T> ExactSizeIterator for PageStream<T> {}

/// Result of listing a collection.
#[derive(Debug)]
pub enum Listing<T> {
    /// The whole collection, re-iterable through [`Listing::as_slice`]
    Materialized {
        /// Items in server order
        items: Vec<T>,
        /// Pagination headers of the listing response
        metadata: PaginationMetadata,
    },
    /// The first page of a collection that may hold more
    Streamed(PageStream<T>),
}

impl<T> Listing<T> {
    /// Listing with no items.
    #[must_use]
    pub const fn empty(metadata: PaginationMetadata) -> Self {
        Self::Materialized {
            items: Vec::new(),
            metadata,
        }
    }

    /// Pick the result shape for a fetched page.
    #[must_use]
    pub fn from_page(items: Vec<T>, metadata: PaginationMetadata) -> Self {
        if metadata.fits_single_page() {
            Self::Materialized { items, metadata }
        } else {
            Self::Streamed(PageStream::new(items, metadata))
        }
    }

    /// Items of a materialized listing.
    #[must_use]
    pub fn as_slice(&self) -> Option<&[T]> {
        match self {
            Self::Materialized { items, .. } => Some(items),
            Self::Streamed(_) => None,
        }
    }

    /// Pagination headers the result was shaped by.
    #[must_use]
    pub const fn metadata(&self) -> PaginationMetadata {
        match self {
            Self::Materialized { metadata, .. } => *metadata,
            Self::Streamed(stream) => stream.metadata,
        }
    }

    /// Returns true if the items are held in memory and can be iterated repeatedly.
    #[must_use]
    pub const fn is_materialized(&self) -> bool {
        matches!(self, Self::Materialized { .. })
    }

    /// Returns true if every matching resource is part of this result.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        match self {
            Self::Materialized { .. } => true,
            Self::Streamed(stream) => stream
                .metadata
                .resource_count
                .is_some_and(|count| stream.page_len as u64 >= count),
        }
    }

    /// Collect the remaining items.
    #[must_use]
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::Materialized { items, .. } => items,
            Self::Streamed(stream) => stream.collect(),
        }
    }
}

impl<T> IntoIterator for Listing<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        match self {
            Self::Materialized { items, .. } => items.into_iter(),
            Self::Streamed(stream) => stream.items,
        }
    }
}

/// List a collection with a `HEAD` probe followed by a conditional `GET`.
///
/// # Errors
///
/// Any failure of either request ends the listing.
pub async fn probe_then_fetch<T>(
    context: &ConnectionContext,
    path: &str,
    query: Vec<(String, String)>,
) -> Result<Listing<T>>
where
    T: DeserializeOwned,
{
    let probe = context
        .fetch_discard(&PROBE, ApiRequest::head(path).with_query(query.clone()))
        .await?;
    let probed = PaginationMetadata::from_headers(&probe.headers);
    debug!(path, resource_count = ?probed.resource_count, "Probed CloudAPI collection");

    if probed.is_empty() {
        return Ok(Listing::empty(probed));
    }

    let envelope = context
        .fetch::<Vec<T>>(&LIST, ApiRequest::get(path).with_query(query))
        .await?;
    let metadata = PaginationMetadata::from_headers(&envelope.headers);
    let items = envelope.body.unwrap_or_default();

    debug!(
        path,
        items = items.len(),
        resource_count = ?metadata.resource_count,
        query_limit = metadata.query_limit,
        "Fetched CloudAPI listing"
    );

    Ok(Listing::from_page(items, metadata))
}
