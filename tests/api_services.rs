// tests/api_services.rs

mod common;
use crate::common::{init_tracing, test_state};

use procdag::api::{route, ApiMethod};
use procdag_test_utils::fake_backend::{FakeLifecycle, FakeProcessBackend};
use procdag_test_utils::fake_node_runner::FakeNodeRunner;
use serde_json::{json, Value};

fn body_of(resp: &procdag::api::ApiResponse) -> Value {
    serde_json::from_slice(&resp.body).expect("json body")
}

fn service_body(name: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "name": name,
        "execCommand": "serve --port 9",
        "env": [
            { "key": "MODE", "value": "prod" },
            { "key": "API_TOKEN", "value": "hunter2", "secret": true }
        ]
    }))
    .expect("json body")
}

#[tokio::test]
async fn create_get_list_roundtrip() {
    init_tracing();
    let state = test_state(FakeProcessBackend::new(), FakeNodeRunner::new());

    let resp = route(
        &state,
        ApiMethod::Post,
        "/api/services",
        Some(&service_body("web")),
    )
    .await;
    assert_eq!(resp.status_code, 201);

    let created = body_of(&resp);
    assert_eq!(created["name"], "web");
    assert_eq!(created["state"], "STOPPED");
    assert_eq!(created["phase"], "observed");
    let id = created["id"].as_str().expect("id").to_string();

    let resp = route(&state, ApiMethod::Get, &format!("/api/services/{id}"), None).await;
    assert_eq!(resp.status_code, 200);
    assert_eq!(body_of(&resp)["id"], id.as_str());

    let resp = route(&state, ApiMethod::Get, "/api/services", None).await;
    assert_eq!(resp.status_code, 200);
    let list = body_of(&resp);
    assert_eq!(list.as_array().map(|a| a.len()), Some(1));
}

#[tokio::test]
async fn secret_env_values_are_masked_in_responses() {
    init_tracing();
    let state = test_state(FakeProcessBackend::new(), FakeNodeRunner::new());

    let resp = route(
        &state,
        ApiMethod::Post,
        "/api/services",
        Some(&service_body("web")),
    )
    .await;
    let created = body_of(&resp);

    let env = created["env"].as_array().expect("env array");
    let plain = env.iter().find(|v| v["key"] == "MODE").expect("MODE");
    let secret = env.iter().find(|v| v["key"] == "API_TOKEN").expect("API_TOKEN");

    assert_eq!(plain["value"], "prod");
    assert_ne!(secret["value"], "hunter2");
    assert_eq!(secret["secret"], true);
}

#[tokio::test]
async fn invalid_service_body_is_a_400_with_error_envelope() {
    init_tracing();
    let state = test_state(FakeProcessBackend::new(), FakeNodeRunner::new());

    let body = serde_json::to_vec(&json!({
        "name": "",
        "execCommand": "",
        "env": [
            { "key": "API KEY", "value": "x" },
            { "key": "TOKEN", "value": "1" },
            { "key": "TOKEN", "value": "2" }
        ]
    }))
    .expect("json");

    let resp = route(&state, ApiMethod::Post, "/api/services", Some(&body)).await;
    assert_eq!(resp.status_code, 400);

    let err = body_of(&resp)["error"].as_str().expect("error").to_string();
    assert!(err.contains("API KEY"));
    assert!(err.contains("TOKEN"));
}

#[tokio::test]
async fn start_stop_actions_return_the_merged_representation() {
    init_tracing();
    let backend = FakeProcessBackend::new();
    backend.set_behaviour("web", FakeLifecycle::RunUntilStopped);
    let state = test_state(backend, FakeNodeRunner::new());

    let resp = route(
        &state,
        ApiMethod::Post,
        "/api/services",
        Some(&service_body("web")),
    )
    .await;
    let id = body_of(&resp)["id"].as_str().expect("id").to_string();

    let resp = route(
        &state,
        ApiMethod::Post,
        &format!("/api/services/{id}/start"),
        None,
    )
    .await;
    assert_eq!(resp.status_code, 200);
    assert_eq!(body_of(&resp)["state"], "RUNNING");

    // Starting again conflicts.
    let resp = route(
        &state,
        ApiMethod::Post,
        &format!("/api/services/{id}/start"),
        None,
    )
    .await;
    assert_eq!(resp.status_code, 409);

    let resp = route(
        &state,
        ApiMethod::Post,
        &format!("/api/services/{id}/stop"),
        None,
    )
    .await;
    assert_eq!(resp.status_code, 200);
    assert_eq!(body_of(&resp)["state"], "STOPPED");
}

#[tokio::test]
async fn delete_answers_204_then_get_is_404() {
    init_tracing();
    let state = test_state(FakeProcessBackend::new(), FakeNodeRunner::new());

    let resp = route(
        &state,
        ApiMethod::Post,
        "/api/services",
        Some(&service_body("web")),
    )
    .await;
    let id = body_of(&resp)["id"].as_str().expect("id").to_string();

    let resp = route(
        &state,
        ApiMethod::Delete,
        &format!("/api/services/{id}"),
        None,
    )
    .await;
    assert_eq!(resp.status_code, 204);
    assert!(resp.body.is_empty());

    let resp = route(&state, ApiMethod::Get, &format!("/api/services/{id}"), None).await;
    assert_eq!(resp.status_code, 404);
    assert!(body_of(&resp)["error"].is_string());
}

#[tokio::test]
async fn schema_endpoint_describes_the_creation_form() {
    init_tracing();
    let state = test_state(FakeProcessBackend::new(), FakeNodeRunner::new());

    let resp = route(&state, ApiMethod::Options, "/api/services/schema", None).await;
    assert_eq!(resp.status_code, 200);

    let schema = body_of(&resp);
    let fields = schema["fields"].as_array().expect("fields");
    assert!(fields.iter().any(|f| f["name"] == "execCommand"));
    assert!(fields.iter().any(|f| f["name"] == "stopSignal"));
}

#[tokio::test]
async fn unknown_endpoint_is_a_404_envelope() {
    init_tracing();
    let state = test_state(FakeProcessBackend::new(), FakeNodeRunner::new());

    let resp = route(&state, ApiMethod::Get, "/api/nope", None).await;
    assert_eq!(resp.status_code, 404);
    assert!(body_of(&resp)["error"].is_string());
}

#[tokio::test]
async fn invalid_id_segment_is_a_400() {
    init_tracing();
    let state = test_state(FakeProcessBackend::new(), FakeNodeRunner::new());

    let resp = route(&state, ApiMethod::Get, "/api/services/not-a-uuid", None).await;
    assert_eq!(resp.status_code, 400);
}
