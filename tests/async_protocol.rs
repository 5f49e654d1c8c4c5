//! Check / job / evaluation protocol of the server

mod helper;

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::http::header::LOCATION;
use serde_json::json;

use fresh_container::client::RemoteClient;
use fresh_container::image::Image;
use fresh_container::version::evaluation::CheckRequest;
use fresh_container::version::storer::Storer;
use helper::{
    INFLUXDB, INFLUXDB_TAGS, MockRegistry, TestServer, create_test_cache, get, spawn_state,
    wait_for_resolution,
};

const CHECK_URI: &str = "/api/v1/check?image=influxdb:1.5.0&constraint=%3E%3D%201.5.0%20%3C%201.6.0";

#[tokio::test(flavor = "multi_thread")]
async fn uncached_image_goes_through_pending_then_resolves() {
    let (_temp_dir, cache) = create_test_cache();
    let (registry, gate) = MockRegistry::new()
        .with_tags(INFLUXDB, INFLUXDB_TAGS)
        .gated();
    let registry = Arc::new(registry);
    let state = spawn_state(cache.clone(), registry.clone(), 2);

    let (status, headers, _) = get(&state, CHECK_URI).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let job_location = headers[LOCATION].to_str().unwrap().to_string();
    assert!(job_location.starts_with("/api/v1/jobs/"));

    // The worker is parked inside the registry call
    let (status, _, body) = get(&state, &job_location).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "pending"}));

    gate.add_permits(1);
    let (status, headers) = wait_for_resolution(&state, &job_location).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    let evaluation_location = headers[LOCATION].to_str().unwrap().to_string();
    assert_eq!(
        evaluation_location,
        job_location.replace("/api/v1/jobs/", "/api/v1/evaluations/")
    );

    let (status, _, body) = get(&state, &evaluation_location).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "image": "docker.io/library/influxdb",
            "constraint": ">= 1.5.0 < 1.6.0",
            "tagPrefix": "",
            "current_version": "1.5.0",
            "next_version": "1.5.2",
            "stale": true
        })
    );

    // Reading twice returns the same persisted payload without recomputing
    let (_, _, again) = get(&state, &evaluation_location).await;
    assert_eq!(again, body);
    assert_eq!(registry.calls(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn cache_hit_answers_synchronously_without_creating_a_job() {
    let (_temp_dir, cache) = create_test_cache();
    let registry = Arc::new(MockRegistry::new().with_tags(INFLUXDB, INFLUXDB_TAGS));
    let state = spawn_state(cache.clone(), registry.clone(), 1);

    let (status, headers, _) = get(&state, CHECK_URI).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let job_location = headers[LOCATION].to_str().unwrap().to_string();
    wait_for_resolution(&state, &job_location).await;

    // Same image, different constraint: still served from the cached tags
    let (status, headers, body) = get(
        &state,
        "/api/v1/check?image=influxdb:1.5.0&constraint=%3E%3D%201.5.0%20%3C%202.0.0",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(headers.get(LOCATION).is_none());
    assert_eq!(body["next_version"], "1.6.3");
    assert_eq!(registry.calls(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn cached_tags_keep_prefix_round_trip() {
    let (_temp_dir, cache) = create_test_cache();
    let image = Image::parse("myorg/app:alpine-1.4.0", "alpine-").unwrap();
    cache
        .set_tags(&image, &["1.4.0".to_string(), "1.5.6".to_string()])
        .unwrap();
    let registry = Arc::new(MockRegistry::new());
    let state = spawn_state(cache, registry.clone(), 1);

    let (status, _, body) = get(
        &state,
        "/api/v1/check?image=myorg/app:alpine-1.4.0&constraint=%3E%3D%201.4.0%20%3C%202.0.0&tagPrefix=alpine-",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["current_version"], "alpine-1.4.0");
    assert_eq!(body["next_version"], "alpine-1.5.6");
    assert_eq!(body["tagPrefix"], "alpine-");
    assert_eq!(registry.calls(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn registry_failure_becomes_failed_evaluation() {
    let (_temp_dir, cache) = create_test_cache();
    let registry = Arc::new(MockRegistry::new());
    let state = spawn_state(cache, registry, 1);

    let (status, headers, _) = get(
        &state,
        "/api/v1/check?image=ghost/image:1.0.0&constraint=%3E%3D%201.0.0",
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let job_location = headers[LOCATION].to_str().unwrap().to_string();

    let (status, headers) = wait_for_resolution(&state, &job_location).await;
    assert_eq!(status, StatusCode::SEE_OTHER);

    let evaluation_location = headers[LOCATION].to_str().unwrap().to_string();
    let (status, _, body) = get(&state, &evaluation_location).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].as_str().unwrap().contains("ghost/image"));
}

#[tokio::test(flavor = "multi_thread")]
async fn validation_errors_never_reach_the_queue() {
    let (_temp_dir, cache) = create_test_cache();
    let registry = Arc::new(MockRegistry::new());
    let state = spawn_state(cache, registry.clone(), 1);

    for uri in [
        "/api/v1/check?image=influxdb:1.5.0&constraint=%3E%201.0",
        "/api/v1/check?image=influxdb:latest&constraint=%3E%3D%201.0.0",
        "/api/v1/check?image=ubuntu:2021.10.3&constraint=%3E%3D%201.0.0&tagPrefix=ubuntu-",
        "/api/v1/check?image=Bad%20Image&constraint=%3E%3D%201.0.0",
    ] {
        let (status, headers, body) = get(&state, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert!(headers.get(LOCATION).is_none());
        assert!(body["error"].is_string());
    }
    assert_eq!(registry.calls(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_job_and_evaluation_are_not_found() {
    let (_temp_dir, cache) = create_test_cache();
    let state = spawn_state(cache, Arc::new(MockRegistry::new()), 1);

    let (status, _, body) = get(&state, "/api/v1/jobs/does-not-exist").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());

    let (status, _, _) = get(&state, "/api/v1/evaluations/does-not-exist").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread")]
async fn remote_client_polls_a_live_server_to_completion() {
    let (_temp_dir, cache) = create_test_cache();
    let registry = Arc::new(MockRegistry::new().with_tags(INFLUXDB, INFLUXDB_TAGS));
    let server = TestServer::start(cache, registry.clone()).await;
    let client = RemoteClient::new(&server.url)
        .unwrap()
        .with_poll_interval(Duration::from_millis(10));
    let request = CheckRequest::new("influxdb:1.5.0", ">= 1.5.0 < 1.6.0", "");

    let evaluation = client.evaluate(&request, || {}).await.unwrap();
    assert_eq!(evaluation.next_version, "1.5.2");
    assert!(evaluation.stale);

    // Second round is a cache hit
    let evaluation = client
        .evaluate(&CheckRequest::new("influxdb:1.6.3", ">= 1.5.0 < 1.7.0", ""), || {
            panic!("cache hit should not poll")
        })
        .await
        .unwrap();
    assert_eq!(evaluation.next_version, "1.6.3");
    assert!(!evaluation.stale);
    assert_eq!(registry.calls(), 1);

    server.stop().await;
}
