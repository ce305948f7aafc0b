//! Instance (machine) operations.

use crate::context::ConnectionContext;
use crate::decoder::ResponseDecoder;
use crate::filters::InstanceFilter;
use crate::models::{CreateInstanceRequest, Instance};
use crate::pagination::{probe_then_fetch, Listing};
use crate::poller::{poll_for_state_change, PollOutcome, PollSettings};
use crate::transport::ApiRequest;
use crate::Result;
use reqwest::StatusCode;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};
use triton_core::uuid::InstanceUuid;
use triton_core::Error;

const FIND: ResponseDecoder =
    ResponseDecoder::new("find instance", &[StatusCode::OK, StatusCode::GONE])
        .absent_on(&[StatusCode::NOT_FOUND])
        .allow_empty_body();
const CREATE: ResponseDecoder = ResponseDecoder::new("create instance", &[StatusCode::CREATED]);
const DELETE: ResponseDecoder = ResponseDecoder::new("delete instance", &[StatusCode::NO_CONTENT]);
const ADD_TAGS: ResponseDecoder = ResponseDecoder::new("add instance tags", &[StatusCode::OK]);
const REPLACE_TAGS: ResponseDecoder =
    ResponseDecoder::new("replace instance tags", &[StatusCode::OK]);

/// Instance operations bound to one account and connection context.
#[derive(Debug, Clone, Copy)]
pub struct Instances<'a> {
    account: &'a str,
    context: &'a ConnectionContext,
}

impl<'a> Instances<'a> {
    /// Bind instance operations to `account`, sending requests through `context`.
    #[must_use]
    pub const fn new(account: &'a str, context: &'a ConnectionContext) -> Self {
        Self { account, context }
    }

    fn collection_path(&self) -> String {
        format!("/{}/machines", self.account)
    }

    fn instance_path(&self, id: &InstanceUuid) -> String {
        format!("/{}/machines/{id}", self.account)
    }

    /// List all instances of the account.
    ///
    /// # Errors
    ///
    /// Returns an error if the probe or the listing request fails.
    pub async fn list(&self) -> Result<Listing<Instance>> {
        self.list_with_filter(&InstanceFilter::default()).await
    }

    /// List instances matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns an error if the probe or the listing request fails.
    pub async fn list_with_filter(&self, filter: &InstanceFilter) -> Result<Listing<Instance>> {
        probe_then_fetch(self.context, &self.collection_path(), filter.to_pairs()).await
    }

    /// Create an instance.
    ///
    /// The returned instance is usually still `provisioning`; use
    /// [`Instances::wait_for_state_change`] to wait for it to come up.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidArgument` error for an empty tag or metadata key
    /// before any request is sent, or the failure of the create request.
    pub async fn create(&self, request: &CreateInstanceRequest) -> Result<Instance> {
        let body = request.to_body()?;
        let api_request = ApiRequest::post(self.collection_path()).with_json(&body)?;

        let instance = self
            .context
            .fetch::<Instance>(&CREATE, api_request)
            .await?
            .into_body()
            .ok_or_else(|| Error::decode("Create instance response had no body"))?;

        info!(id = %instance.id, state = %instance.state, "Created instance");
        Ok(instance)
    }

    /// Delete an instance.
    ///
    /// # Errors
    ///
    /// Deleting an instance that does not exist is a `Protocol` error
    /// carrying the server's message.
    pub async fn delete(&self, id: &InstanceUuid) -> Result<()> {
        self.context
            .fetch_discard(&DELETE, ApiRequest::delete(self.instance_path(id)))
            .await?;
        debug!(%id, "Deleted instance");
        Ok(())
    }

    /// Look up an instance by id.
    ///
    /// Returns `None` when the instance does not exist. Destroyed instances
    /// that the server still reports (410) are returned in state `deleted`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body cannot be decoded.
    pub async fn find_by_id(&self, id: &InstanceUuid) -> Result<Option<Instance>> {
        Ok(self
            .context
            .fetch::<Instance>(&FIND, ApiRequest::get(self.instance_path(id)))
            .await?
            .into_body())
    }

    /// Wait until the instance leaves `initial_state`.
    ///
    /// Polls [`Instances::find_by_id`] every `interval` until the state
    /// changes or more than `max_wait` has been spent sleeping. The wait can
    /// be interrupted through [`ConnectionContext::interrupt_handle`].
    ///
    /// # Errors
    ///
    /// Returns a `Consistency` error if the instance disappears mid-poll or
    /// the server answers with another instance, and propagates request
    /// failures.
    pub async fn wait_for_state_change(
        &self,
        id: &InstanceUuid,
        initial_state: &str,
        max_wait: Duration,
        interval: Duration,
    ) -> Result<PollOutcome<Instance>> {
        let settings = PollSettings::new(initial_state, max_wait, interval);
        debug!(%id, initial_state, ?max_wait, ?interval, "Waiting for instance state change");

        poll_for_state_change(id, &settings, self.context.interrupt_token(), move || {
            self.find_by_id(id)
        })
        .await
    }

    /// Add tags to an instance, returning the instance's full tag set.
    ///
    /// An empty `tags` map sends no request and returns an empty map.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body cannot be decoded.
    pub async fn add_tags(
        &self,
        id: &InstanceUuid,
        tags: &BTreeMap<String, String>,
    ) -> Result<BTreeMap<String, String>> {
        if tags.is_empty() {
            return Ok(BTreeMap::new());
        }

        let request = ApiRequest::post(self.tags_path(id)).with_json(tags)?;
        self.update_tags(&ADD_TAGS, request).await
    }

    /// Replace all tags of an instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body cannot be decoded.
    pub async fn replace_tags(
        &self,
        id: &InstanceUuid,
        tags: &BTreeMap<String, String>,
    ) -> Result<BTreeMap<String, String>> {
        let request = ApiRequest::put(self.tags_path(id)).with_json(tags)?;
        self.update_tags(&REPLACE_TAGS, request).await
    }

    fn tags_path(&self, id: &InstanceUuid) -> String {
        format!("{}/tags", self.instance_path(id))
    }

    async fn update_tags(
        &self,
        decoder: &ResponseDecoder,
        request: ApiRequest,
    ) -> Result<BTreeMap<String, String>> {
        Ok(self
            .context
            .fetch::<BTreeMap<String, String>>(decoder, request)
            .await?
            .into_body()
            .unwrap_or_default())
    }
}
