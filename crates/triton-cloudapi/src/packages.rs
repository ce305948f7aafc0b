//! Package operations.

use crate::context::ConnectionContext;
use crate::decoder::ResponseDecoder;
use crate::filters::PackageFilter;
use crate::models::Package;
use crate::transport::ApiRequest;
use crate::Result;
use reqwest::StatusCode;
use triton_core::uuid::PackageUuid;

const LIST: ResponseDecoder = ResponseDecoder::new("list packages", &[StatusCode::OK]);
const FIND: ResponseDecoder =
    ResponseDecoder::new("find package", &[StatusCode::OK]).absent_on(&[StatusCode::NOT_FOUND]);

/// Package operations bound to one account and connection context.
#[derive(Debug, Clone, Copy)]
pub struct Packages<'a> {
    account: &'a str,
    context: &'a ConnectionContext,
}

impl<'a> Packages<'a> {
    /// Bind package operations to `account`, sending requests through `context`.
    #[must_use]
    pub const fn new(account: &'a str, context: &'a ConnectionContext) -> Self {
        Self { account, context }
    }

    /// List packages available to the account.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body cannot be decoded.
    pub async fn list(&self) -> Result<Vec<Package>> {
        self.list_with_filter(&PackageFilter::default()).await
    }

    /// List packages matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body cannot be decoded.
    pub async fn list_with_filter(&self, filter: &PackageFilter) -> Result<Vec<Package>> {
        let path = format!("/{}/packages", self.account);
        let request = ApiRequest::get(path).with_query(filter.to_pairs());
        Ok(self
            .context
            .fetch::<Vec<Package>>(&LIST, request)
            .await?
            .into_body()
            .unwrap_or_default())
    }

    /// Look up a package by id, `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body cannot be decoded.
    pub async fn find_by_id(&self, id: &PackageUuid) -> Result<Option<Package>> {
        let request = ApiRequest::get(format!("/{}/packages/{id}", self.account));
        Ok(self
            .context
            .fetch::<Package>(&FIND, request)
            .await?
            .into_body())
    }

    /// Packages with the smallest memory, in listing order.
    ///
    /// Every package tied for the minimum is returned. An account without
    /// packages yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns an error if listing fails.
    pub async fn smallest_memory(&self) -> Result<Vec<Package>> {
        Ok(smallest_by_memory(self.list().await?))
    }
}

fn smallest_by_memory(packages: Vec<Package>) -> Vec<Package> {
    let Some(minimum) = packages.iter().map(|package| package.memory).min() else {
        return Vec::new();
    };
    packages
        .into_iter()
        .filter(|package| package.memory == minimum)
        .collect()
}
