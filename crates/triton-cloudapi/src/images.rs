//! Image operations.

use crate::context::ConnectionContext;
use crate::decoder::ResponseDecoder;
use crate::filters::ImageFilter;
use crate::models::Image;
use crate::transport::ApiRequest;
use crate::Result;
use reqwest::StatusCode;
use triton_core::uuid::ImageUuid;

const LIST: ResponseDecoder = ResponseDecoder::new("list images", &[StatusCode::OK]);
const FIND: ResponseDecoder =
    ResponseDecoder::new("find image", &[StatusCode::OK]).absent_on(&[StatusCode::NOT_FOUND]);

/// Image operations bound to one account and connection context.
#[derive(Debug, Clone, Copy)]
pub struct Images<'a> {
    account: &'a str,
    context: &'a ConnectionContext,
}

impl<'a> Images<'a> {
    /// Bind image operations to `account`, sending requests through `context`.
    #[must_use]
    pub const fn new(account: &'a str, context: &'a ConnectionContext) -> Self {
        Self { account, context }
    }

    /// List images available to the account.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body cannot be decoded.
    pub async fn list(&self) -> Result<Vec<Image>> {
        self.list_with_filter(&ImageFilter::default()).await
    }

    /// List images matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body cannot be decoded.
    pub async fn list_with_filter(&self, filter: &ImageFilter) -> Result<Vec<Image>> {
        let path = format!("/{}/images", self.account);
        let request = ApiRequest::get(path).with_query(filter.to_pairs());
        Ok(self
            .context
            .fetch::<Vec<Image>>(&LIST, request)
            .await?
            .into_body()
            .unwrap_or_default())
    }

    /// Look up an image by id, `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body cannot be decoded.
    pub async fn find_by_id(&self, id: &ImageUuid) -> Result<Option<Image>> {
        let request = ApiRequest::get(format!("/{}/images/{id}", self.account));
        Ok(self
            .context
            .fetch::<Image>(&FIND, request)
            .await?
            .into_body())
    }
}
