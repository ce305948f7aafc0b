//! Header names used by CloudAPI.

use reqwest::header::HeaderMap;

/// Outbound request id, one fresh UUID per request.
pub const REQUEST_ID: &str = "x-request-id";

/// Request id echoed back by the server.
pub const RESPONSE_REQUEST_ID: &str = "request-id";

/// Total number of resources matching a listing query.
pub const RESOURCE_COUNT: &str = "x-resource-count";

/// Maximum number of resources returned in one listing response.
pub const QUERY_LIMIT: &str = "x-query-limit";

/// Requested API version range.
pub const API_VERSION: &str = "api-version";

/// Request signing date.
pub const DATE: &str = "date";

/// Read a header as a trimmed string, ignoring values that are not visible ASCII.
#[must_use]
pub fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Request id reported by a response, preferring the server's `request-id`.
#[must_use]
pub fn response_request_id(headers: &HeaderMap) -> Option<&str> {
    header_str(headers, RESPONSE_REQUEST_ID).or_else(|| header_str(headers, REQUEST_ID))
}
