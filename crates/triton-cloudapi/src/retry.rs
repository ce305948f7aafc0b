//! Retry loop around a [`Transport`].

use crate::transport::{ApiRequest, RawResponse, Transport};
use crate::Result;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};
use triton_core::client::RetryPolicy;

/// Send `request`, retrying retriable transport failures according to `policy`.
///
/// The same request is resent unchanged on every attempt. When the policy
/// gives up, the last failure is returned annotated with the request and the
/// number of attempts made.
///
/// # Errors
///
/// Returns the last transport failure once retries are exhausted or the
/// failure is not retriable.
pub async fn execute_with_retry(
    transport: &dyn Transport,
    policy: &RetryPolicy,
    request: &ApiRequest,
) -> Result<RawResponse> {
    let idempotent = request.is_idempotent();
    let mut attempt = 0;

    loop {
        let error = match transport.execute(request).await {
            Ok(response) => return Ok(response),
            Err(error) => error,
        };

        attempt += 1;
        if !policy.should_retry(&error, idempotent, attempt) {
            debug!(
                method = %request.method(),
                path = %request.path(),
                attempts = attempt,
                code = error.error_code(),
                "Giving up on CloudAPI request"
            );
            return Err(request.annotate(error.with_context("attempts", attempt)));
        }

        info!(
            method = %request.method(),
            path = %request.path(),
            attempt,
            error = %error.message(),
            "Request failed, {} retry",
            attempt
        );

        let delay = policy.delay_for_attempt(attempt);
        if delay > Duration::from_millis(0) {
            debug!("Retrying CloudAPI request after {:?}", delay);
            sleep(delay).await;
        }
    }
}
