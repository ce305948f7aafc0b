//! End-to-end tests of the CloudAPI client against a mock server.

use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use triton_cloudapi::{
    CloudApi, CreateInstanceRequest, ImageFilter, InstanceFilter, PollOutcome, Result,
    SignatureProvider,
};
use triton_core::client::RetryPolicy;
use triton_core::config::CloudApiConfig;
use triton_core::error::TransportFailure;
use triton_core::uuid::{ImageUuid, InstanceUuid, PackageUuid};
use triton_core::ErrorKind;
use wiremock::matchers::{body_json, header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const INSTANCE_ID: &str = "b6979942-7d5d-4fe6-a2ec-b812e950625a";

fn fixture(name: &str) -> Value {
    let fixture_path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    let text = fs::read_to_string(&fixture_path)
        .unwrap_or_else(|e| panic!("Failed to read fixture at {}: {e}", fixture_path.display()));
    serde_json::from_str(&text).unwrap_or_else(|e| panic!("Invalid fixture {}: {}", name, e))
}

fn instance_in_state(state: &str) -> Value {
    let mut instance = fixture("instance.json");
    instance["state"] = json!(state);
    instance
}

fn config(server: &MockServer) -> CloudApiConfig {
    CloudApiConfig::new(server.uri(), "admin")
        .unwrap()
        .with_no_auth(true)
}

fn client(server: &MockServer) -> CloudApi {
    CloudApi::builder(config(server))
        .with_retry_policy(RetryPolicy::no_retry())
        .build()
        .unwrap()
}

fn instance_id() -> InstanceUuid {
    InstanceUuid::parse_str(INSTANCE_ID).unwrap()
}

#[tokio::test]
async fn test_empty_probe_skips_listing() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/admin/machines"))
        .respond_with(ResponseTemplate::new(200).insert_header("x-resource-count", "0"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/admin/machines"))
        .respond_with(ResponseTemplate::new(200).set_body_json(fixture("instances.json")))
        .expect(0)
        .mount(&server)
        .await;

    let api = client(&server);
    let context = api.connection_context().unwrap();
    let listing = api.instances(&context).list().await.unwrap();

    assert!(listing.is_complete());
    assert!(listing.into_iter().next().is_none());
}

#[tokio::test]
async fn test_failed_head_request_aborts_listing() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/admin/machines"))
        .respond_with(
            ResponseTemplate::new(500)
                .insert_header("request-id", "req-probe-1")
                .set_body_json(json!({"code": "InternalError", "message": "backend unavailable"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/admin/machines"))
        .respond_with(ResponseTemplate::new(200).set_body_json(fixture("instances.json")))
        .expect(0)
        .mount(&server)
        .await;

    let api = client(&server);
    let context = api.connection_context().unwrap();
    let err = api.instances(&context).list().await.unwrap_err();

    // HEAD responses carry no body, so only the status line and headers survive.
    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert_eq!(err.status(), Some(500));
    assert_eq!(
        err.message(),
        "get headers failed [500 Internal Server Error]"
    );
    assert_eq!(err.request_id(), Some("req-probe-1"));
    assert_eq!(err.context().get("requestMethod"), Some("HEAD"));
}

#[tokio::test]
async fn test_small_listing_is_materialized() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/admin/machines"))
        .respond_with(ResponseTemplate::new(200).insert_header("x-resource-count", "2"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/admin/machines"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-resource-count", "2")
                .insert_header("x-query-limit", "1000")
                .set_body_json(fixture("instances.json")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let api = client(&server);
    let context = api.connection_context().unwrap();
    let listing = api.instances(&context).list().await.unwrap();

    assert!(listing.is_materialized());
    let first: Vec<String> = listing
        .as_slice()
        .unwrap()
        .iter()
        .map(|instance| instance.id.to_string())
        .collect();
    let second: Vec<String> = listing
        .as_slice()
        .unwrap()
        .iter()
        .map(|instance| instance.id.to_string())
        .collect();
    assert_eq!(first, second);
    assert_eq!(first.len(), 2);
    assert_eq!(first[0], INSTANCE_ID);

    let mut items = listing.into_iter();
    assert!(items.next().is_some());
    assert!(items.next().is_some());
    assert!(items.next().is_none());
}

#[tokio::test]
async fn test_full_page_listing_is_streamed() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/admin/machines"))
        .respond_with(ResponseTemplate::new(200).insert_header("x-resource-count", "3"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/admin/machines"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-resource-count", "3")
                .insert_header("x-query-limit", "2")
                .set_body_json(fixture("instances.json")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let api = client(&server);
    let context = api.connection_context().unwrap();
    let listing = api.instances(&context).list().await.unwrap();

    assert!(!listing.is_materialized());
    assert!(!listing.is_complete());
    assert_eq!(listing.into_vec().len(), 2);
}

#[tokio::test]
async fn test_probe_without_headers_still_lists() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/admin/machines"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/admin/machines"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-resource-count", "2")
                .set_body_json(fixture("instances.json")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let api = client(&server);
    let context = api.connection_context().unwrap();
    let listing = api.instances(&context).list().await.unwrap();

    assert!(listing.is_materialized());
    assert_eq!(listing.metadata().query_limit, 1000);
    assert_eq!(listing.into_vec().len(), 2);
}

#[tokio::test]
async fn test_listing_sends_filter_on_probe_and_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/admin/machines"))
        .and(query_param("state", "running"))
        .and(query_param("tag.role", "web"))
        .respond_with(ResponseTemplate::new(200).insert_header("x-resource-count", "1"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/admin/machines"))
        .and(query_param("state", "running"))
        .and(query_param("tag.role", "web"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-resource-count", "1")
                .set_body_json(json!([fixture("instance.json")])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let api = client(&server);
    let context = api.connection_context().unwrap();
    let filter = InstanceFilter::new().with_state("running").with_tag("role", "web");
    let listing = api.instances(&context).list_with_filter(&filter).await.unwrap();
    assert_eq!(listing.into_vec().len(), 1);
}

#[tokio::test]
async fn test_find_missing_instance_is_absent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/admin/machines/{INSTANCE_ID}")))
        .respond_with(ResponseTemplate::new(404).set_body_json(fixture("not_found.json")))
        .expect(1)
        .mount(&server)
        .await;

    let api = client(&server);
    let context = api.connection_context().unwrap();
    let found = api.instances(&context).find_by_id(&instance_id()).await.unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn test_delete_missing_instance_is_protocol_error() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path(format!("/admin/machines/{INSTANCE_ID}")))
        .respond_with(
            ResponseTemplate::new(404)
                .insert_header("request-id", "req-delete-1")
                .set_body_json(fixture("not_found.json")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let api = client(&server);
    let context = api.connection_context().unwrap();
    let err = api.instances(&context).delete(&instance_id()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert_eq!(err.status(), Some(404));
    assert!(err.message().contains("VM not found"), "{err}");
    assert_eq!(err.request_id(), Some("req-delete-1"));
    assert_eq!(err.context().get("serverCode"), Some("ResourceNotFound"));
    assert_eq!(err.context().get("requestMethod"), Some("DELETE"));
    assert!(err.context().get("requestHeaders").is_some());
}

#[tokio::test]
async fn test_conflict_with_numeric_sub_error_keeps_server_detail() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path(format!("/admin/machines/{INSTANCE_ID}")))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "code": "InvalidArgument",
            "message": "bad input",
            "errors": [{"field": "x", "count": 3}]
        })))
        .mount(&server)
        .await;

    let api = client(&server);
    let context = api.connection_context().unwrap();
    let err = api.instances(&context).delete(&instance_id()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert_eq!(
        err.message(),
        "delete instance failed [409 Conflict]: bad input"
    );
    assert_eq!(err.context().get("serverCode"), Some("InvalidArgument"));
    assert_eq!(err.detail().unwrap().errors[0]["count"], "3");
}

#[tokio::test]
async fn test_undecodable_error_body_keeps_raw_text() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path(format!("/admin/machines/{INSTANCE_ID}")))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;

    let api = client(&server);
    let context = api.connection_context().unwrap();
    let err = api.instances(&context).delete(&instance_id()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert_eq!(err.context().get("entityText"), Some("upstream exploded"));
    assert!(err.request_id().is_some());
}

#[tokio::test]
async fn test_delete_instance() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path(format!("/admin/machines/{INSTANCE_ID}")))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let api = client(&server);
    let context = api.connection_context().unwrap();
    api.instances(&context).delete(&instance_id()).await.unwrap();
}

#[tokio::test]
async fn test_create_instance_flattens_tags() {
    let server = MockServer::start().await;
    let package = PackageUuid::new_v4();
    let image = ImageUuid::parse_str("2b683a82-a066-11e3-97ab-2faa44701c5a").unwrap();

    Mock::given(method("POST"))
        .and(path("/admin/machines"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({
            "package": package.to_string(),
            "image": image.to_string(),
            "name": "web-01",
            "tag.role": "web",
            "metadata.user-script": "#!/bin/sh"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(instance_in_state("provisioning")))
        .expect(1)
        .mount(&server)
        .await;

    let api = client(&server);
    let context = api.connection_context().unwrap();
    let request = CreateInstanceRequest::new(package, image)
        .with_name("web-01")
        .with_tag("role", "web")
        .with_metadata("user-script", "#!/bin/sh");
    let instance = api.instances(&context).create(&request).await.unwrap();

    assert_eq!(instance.state, "provisioning");
    assert_eq!(instance.id, instance_id());
}

#[tokio::test]
async fn test_wait_for_state_change_polls_until_running() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/admin/machines/{INSTANCE_ID}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(instance_in_state("provisioning")))
        .up_to_n_times(4)
        .expect(4)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/admin/machines/{INSTANCE_ID}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(instance_in_state("running")))
        .expect(1)
        .mount(&server)
        .await;

    let api = client(&server);
    let context = api.connection_context().unwrap();
    let max_wait = Duration::from_secs(10);
    let interval = Duration::from_millis(20);
    let started = Instant::now();

    let outcome = api
        .instances(&context)
        .wait_for_state_change(&instance_id(), "provisioning", max_wait, interval)
        .await
        .unwrap();

    assert!(started.elapsed() >= interval * 4);
    let instance = outcome.into_entity().unwrap();
    assert_eq!(instance.state, "running");
    assert_eq!(instance.id, instance_id());
}

#[tokio::test]
async fn test_wait_for_missing_instance_is_absent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/admin/machines/{INSTANCE_ID}")))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let api = client(&server);
    let context = api.connection_context().unwrap();
    let max_wait = Duration::from_secs(1);
    let interval = Duration::from_millis(10);
    let outcome = api
        .instances(&context)
        .wait_for_state_change(&instance_id(), "provisioning", max_wait, interval)
        .await
        .unwrap();
    assert_eq!(outcome, PollOutcome::Absent);
}

#[tokio::test]
async fn test_timeouts_are_retried_then_surface() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/admin/machines/{INSTANCE_ID}")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(instance_in_state("running"))
                .set_delay(Duration::from_millis(500)),
        )
        .expect(3)
        .mount(&server)
        .await;

    let api = CloudApi::builder(config(&server).with_timeout_ms(100))
        .with_retry_policy(
            RetryPolicy::new()
                .with_max_retries(2)
                .with_initial_delay(Duration::ZERO),
        )
        .build()
        .unwrap();
    let context = api.connection_context().unwrap();
    let err = api.instances(&context).find_by_id(&instance_id()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Transport(TransportFailure::Timeout));
    assert_eq!(err.context().get("attempts"), Some("3"));
    assert_eq!(err.context().get("requestMethod"), Some("GET"));
    assert!(err.request_id().is_some());
    assert!(err.context().get("requestHeaders").is_some());
}

#[tokio::test]
async fn test_connection_refused_is_not_retried() {
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let uri = format!("http://127.0.0.1:{port}");

    let config = CloudApiConfig::new(uri, "admin").unwrap().with_no_auth(true);
    let policy = RetryPolicy::new()
        .with_max_retries(3)
        .with_initial_delay(Duration::ZERO);
    let api = CloudApi::builder(config)
        .with_retry_policy(policy)
        .build()
        .unwrap();
    let context = api.connection_context().unwrap();
    let err = api
        .instances(&context)
        .find_by_id(&instance_id())
        .await
        .unwrap_err();

    assert_eq!(
        err.kind(),
        ErrorKind::Transport(TransportFailure::ConnectionRefused)
    );
    assert_eq!(err.context().get("attempts"), Some("1"));
}

#[tokio::test]
async fn test_tags_round_trip() {
    let server = MockServer::start().await;
    let merged = json!({"role": "db", "env": "prod"});
    Mock::given(method("POST"))
        .and(path(format!("/admin/machines/{INSTANCE_ID}/tags")))
        .and(body_json(json!({"role": "db"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(merged))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("/admin/machines/{INSTANCE_ID}/tags")))
        .and(body_json(json!({"env": "staging"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"env": "staging"})))
        .expect(1)
        .mount(&server)
        .await;

    let api = client(&server);
    let context = api.connection_context().unwrap();
    let instances = api.instances(&context);
    let role = BTreeMap::from([("role".to_string(), "db".to_string())]);
    let staging = BTreeMap::from([("env".to_string(), "staging".to_string())]);

    let added = instances.add_tags(&instance_id(), &role).await.unwrap();
    assert_eq!(added.len(), 2);
    assert_eq!(added["env"], "prod");

    let replaced = instances
        .replace_tags(&instance_id(), &staging)
        .await
        .unwrap();
    assert_eq!(replaced, staging);
}

#[tokio::test]
async fn test_list_images_with_filter() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/admin/images"))
        .and(query_param("os", "smartos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(fixture("images.json")))
        .expect(1)
        .mount(&server)
        .await;

    let api = client(&server);
    let context = api.connection_context().unwrap();
    let filter = ImageFilter {
        os: Some("smartos".to_string()),
        ..ImageFilter::default()
    };
    let images = api.images(&context).list_with_filter(&filter).await.unwrap();
    assert_eq!(images.len(), 2);
}

#[tokio::test]
async fn test_find_missing_image_and_package() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_json(fixture("not_found.json")))
        .expect(2)
        .mount(&server)
        .await;

    let api = client(&server);
    let context = api.connection_context().unwrap();
    assert!(api
        .images(&context)
        .find_by_id(&ImageUuid::new_v4())
        .await
        .unwrap()
        .is_none());
    assert!(api
        .packages(&context)
        .find_by_id(&PackageUuid::new_v4())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_smallest_memory_packages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/admin/packages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(fixture("packages.json")))
        .expect(1)
        .mount(&server)
        .await;

    let api = client(&server);
    let context = api.connection_context().unwrap();
    let smallest = api.packages(&context).smallest_memory().await.unwrap();

    let names: Vec<&str> = smallest.iter().map(|package| package.name.as_str()).collect();
    assert_eq!(names, vec!["g4-highcpu-128M", "t4-standard-128M"]);
}

#[tokio::test]
async fn test_malformed_success_body_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/admin/packages"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"not\": \"a list\"}"))
        .mount(&server)
        .await;

    let api = client(&server);
    let context = api.connection_context().unwrap();
    let err = api.packages(&context).list().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Decode);
    assert!(err.context().get("entityText").is_some());
}

const EXPECTED_AUTHORIZATION: &str =
    r#"Signature keyId="/admin/keys/12:34:56",algorithm="rsa-sha256",signature="c2lnbmF0dXJl""#;

struct FixedSigner;

impl SignatureProvider for FixedSigner {
    fn algorithm(&self) -> &str {
        "rsa-sha256"
    }

    fn fingerprint(&self) -> &str {
        "12:34:56"
    }

    fn sign(&self, data: &[u8]) -> Result<String> {
        assert!(data.starts_with(b"date: "));
        Ok("c2lnbmF0dXJl".to_string())
    }
}

#[tokio::test]
async fn test_signed_requests_carry_authorization() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/admin/packages"))
        .and(header_exists("date"))
        .and(header_exists("x-request-id"))
        .and(header("api-version", "~8"))
        .and(header("accept", "application/json"))
        .and(|request: &Request| {
            request
                .headers
                .get("authorization")
                .and_then(|value| value.to_str().ok())
                == Some(EXPECTED_AUTHORIZATION)
        })
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let api = CloudApi::builder(CloudApiConfig::new(server.uri(), "admin").unwrap())
        .with_signer(Arc::new(FixedSigner))
        .build()
        .unwrap();
    let context = api.connection_context().unwrap();
    assert!(context.is_signed());
    assert!(api.packages(&context).list().await.unwrap().is_empty());
}
