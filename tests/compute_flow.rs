//! Compute Engine start/stop against a mocked Compute API

mod common;

use common::{calls, client, request, PROJECT, TOKEN};
use gcp_scheduler::error::Error;
use gcp_scheduler::gcp::operation::PollPolicy;
use gcp_scheduler::orchestrator::{start_instances, stop_instances};
use gcp_scheduler::resource::ComputeEngine;
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{bearer_token, method, path, path_regex, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn instance(name: &str, zone: &str, env: &str) -> Value {
    json!({
        "name": name,
        "zone": format!("https://www.googleapis.com/compute/v1/projects/{}/zones/{}", PROJECT, zone),
        "status": "RUNNING",
        "labels": {"env": env}
    })
}

fn operation(name: &str, zone: &str, status: &str) -> Value {
    json!({
        "kind": "compute#operation",
        "name": name,
        "status": status,
        "zone": format!("https://www.googleapis.com/compute/v1/projects/{}/zones/{}", PROJECT, zone)
    })
}

async fn mount_wait_done(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path_regex(r"^/compute/v1/projects/test-project/zones/[^/]+/operations/[^/]+/wait$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "op",
            "status": "DONE"
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_zone_and_label_filter_issues_one_call_per_match() {
    let server = MockServer::start().await;
    let zone = "us-central1-a";
    let instances_path = format!("/compute/v1/projects/{}/zones/{}/instances", PROJECT, zone);

    // Unfiltered listing would return all three
    Mock::given(method("GET"))
        .and(path(instances_path.as_str()))
        .and(query_param_is_missing("filter"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                instance("vm-dev-1", zone, "dev"),
                instance("vm-dev-2", zone, "dev"),
                instance("vm-prod", zone, "prod")
            ]
        })))
        .expect(0)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(instances_path.as_str()))
        .and(query_param("filter", "(labels.env = \"dev\")"))
        .and(bearer_token(TOKEN))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [instance("vm-dev-1", zone, "dev"), instance("vm-dev-2", zone, "dev")]
        })))
        .expect(1)
        .mount(&server)
        .await;

    for name in ["vm-dev-1", "vm-dev-2"] {
        Mock::given(method("POST"))
            .and(path(format!("{}/{}/start", instances_path, name).as_str()))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(operation(&format!("op-{}", name), zone, "PENDING")),
            )
            .expect(1)
            .mount(&server)
            .await;
    }

    Mock::given(method("POST"))
        .and(path(format!("{}/vm-prod/start", instances_path).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(operation("op-prod", zone, "PENDING")))
        .expect(0)
        .mount(&server)
        .await;

    mount_wait_done(&server).await;

    let target = ComputeEngine::new(client(&server), PollPolicy::immediate());
    let report = start_instances(&target, &request(&[zone], &[("env", "dev")]))
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.found, 2);
    assert_eq!(report.succeeded.len(), 2);

    let waits = calls(&server)
        .await
        .into_iter()
        .filter(|c| c.ends_with("/wait"))
        .count();
    assert_eq!(waits, 2);
}

#[tokio::test]
async fn test_no_zones_uses_aggregated_listing() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/compute/v1/projects/test-project/aggregated/instances"))
        .and(query_param("maxResults", "25"))
        .and(query_param_is_missing("filter"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": {
                "zones/us-central1-a": {"instances": [instance("a", "us-central1-a", "dev")]},
                "zones/europe-west1-b": {"instances": [instance("b", "europe-west1-b", "dev")]},
                "zones/asia-east1-a": {"instances": [instance("c", "asia-east1-a", "dev")]},
                "zones/us-east1-b": {
                    "warning": {"code": "NO_RESULTS_ON_PAGE", "message": "There are no results"}
                }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/compute/v1/projects/test-project/zones/[^/]+/instances$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
        .expect(0)
        .mount(&server)
        .await;

    let target = ComputeEngine::new(client(&server), PollPolicy::immediate());
    let instances = target
        .list_instances(PROJECT, &[], &Default::default())
        .await
        .unwrap();

    let mut names: Vec<_> = instances.iter().map(|i| i.name.as_str()).collect();
    names.sort();
    assert_eq!(names, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_aggregated_listing_drains_all_pages() {
    let server = MockServer::start().await;
    let aggregated = "/compute/v1/projects/test-project/aggregated/instances";

    Mock::given(method("GET"))
        .and(path(aggregated))
        .and(query_param_is_missing("pageToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": {"zones/us-central1-a": {"instances": [instance("a", "us-central1-a", "dev")]}},
            "nextPageToken": "page-2"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(aggregated))
        .and(query_param("pageToken", "page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": {"zones/us-central1-a": {"instances": [instance("b", "us-central1-a", "dev")]}}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let target = ComputeEngine::new(client(&server), PollPolicy::immediate());
    let instances = target
        .list_instances(PROJECT, &[], &Default::default())
        .await
        .unwrap();

    assert_eq!(instances.len(), 2);
}

#[tokio::test]
async fn test_zones_are_listed_in_order() {
    let server = MockServer::start().await;

    for zone in ["us-central1-a", "us-central1-b"] {
        Mock::given(method("GET"))
            .and(path(format!("/compute/v1/projects/test-project/zones/{}/instances", zone).as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [instance(&format!("vm-{}", zone), zone, "dev")]
            })))
            .expect(1)
            .mount(&server)
            .await;
    }

    let target = ComputeEngine::new(client(&server), PollPolicy::immediate());
    let zones = vec!["us-central1-b".to_string(), "us-central1-a".to_string()];
    let instances = target
        .list_instances(PROJECT, &zones, &Default::default())
        .await
        .unwrap();

    let names: Vec<_> = instances.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["vm-us-central1-b", "vm-us-central1-a"]);
}

#[tokio::test]
async fn test_failed_instance_does_not_block_siblings() {
    let server = MockServer::start().await;
    let zone = "us-central1-a";
    let instances_path = format!("/compute/v1/projects/{}/zones/{}/instances", PROJECT, zone);

    Mock::given(method("GET"))
        .and(path(instances_path.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [instance("healthy", zone, "dev"), instance("broken", zone, "dev")]
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("{}/healthy/stop", instances_path).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(operation("op-healthy", zone, "RUNNING")))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("{}/broken/stop", instances_path).as_str()))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": {"code": 403, "message": "Required 'compute.instances.stop' permission"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    mount_wait_done(&server).await;

    let target = ComputeEngine::new(client(&server), PollPolicy::immediate());
    let report = stop_instances(&target, &request(&[zone], &[])).await.unwrap();

    assert_eq!(report.succeeded, vec!["healthy".to_string()]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].resource, "broken");
    assert!(report.failed[0].error.contains("403"));
    assert!(report.failed[0].hint.starts_with("Permission denied"));
}

#[tokio::test]
async fn test_stuck_operation_times_out() {
    let server = MockServer::start().await;
    let zone = "us-central1-a";
    let instances_path = format!("/compute/v1/projects/{}/zones/{}/instances", PROJECT, zone);

    Mock::given(method("GET"))
        .and(path(instances_path.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [instance("stuck", zone, "dev")]
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("{}/stuck/start", instances_path).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(operation("op-stuck", zone, "PENDING")))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path_regex(r"/operations/op-stuck/wait$"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(operation("op-stuck", zone, "RUNNING"))
                .set_delay(Duration::from_millis(20)),
        )
        .mount(&server)
        .await;

    let policy = PollPolicy::immediate().with_timeout(Duration::from_millis(100));
    let target = ComputeEngine::new(client(&server), policy);
    let report = start_instances(&target, &request(&[zone], &[])).await.unwrap();

    assert!(report.succeeded.is_empty());
    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].error.contains("did not complete"));
}

#[tokio::test]
async fn test_listing_failure_is_an_invocation_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/compute/v1/projects/test-project/zones/bogus-zone/instances"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {"code": 404, "message": "The resource 'bogus-zone' was not found"}
        })))
        .mount(&server)
        .await;

    let target = ComputeEngine::new(client(&server), PollPolicy::immediate());
    let err = stop_instances(&target, &request(&["bogus-zone"], &[]))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::ProviderCallFailure { status: Some(404), .. }));
}
