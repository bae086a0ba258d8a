//! Cluster balancer integration tests against a mocked HTTP balancer

use realtime_messaging::prelude::*;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn balancer_answering(template: ResponseTemplate) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/server/2.1"))
        .respond_with(template)
        .expect(1)
        .mount(&server)
        .await;
    server
}

fn balancer() -> HttpBalancer {
    HttpBalancer::new(BalancerConfig::default()).expect("Failed to build balancer")
}

#[tokio::test]
async fn test_resolves_assigned_server() {
    let server = balancer_answering(
        ResponseTemplate::new(200)
            .set_body_string("var SOCKET_SERVER = \"https://node3.example.com:443\";\n"),
    )
    .await;

    let url = balancer()
        .resolve(&format!("{}/server/2.1", server.uri()))
        .await
        .expect("Resolution failed");

    assert_eq!(url, "https://node3.example.com:443");
}

#[tokio::test]
async fn test_unexpected_body_is_a_resolution_error() {
    let server = balancer_answering(
        ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"),
    )
    .await;

    let result = balancer()
        .resolve(&format!("{}/server/2.1", server.uri()))
        .await;

    assert_eq!(
        result,
        Err(RealtimeError::ClusterResolution(
            "Unable to get URL from cluster".to_string()
        ))
    );
}

#[tokio::test]
async fn test_error_status_is_a_resolution_error() {
    let server = balancer_answering(ResponseTemplate::new(503)).await;

    let result = balancer()
        .resolve(&format!("{}/server/2.1", server.uri()))
        .await;

    match result {
        Err(RealtimeError::ClusterResolution(message)) => {
            assert!(message.contains("503"), "{}", message);
        }
        other => panic!("Unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_slow_balancer_times_out() {
    let server = balancer_answering(
        ResponseTemplate::new(200)
            .set_body_string("var SOCKET_SERVER = \"https://node3.example.com:443\";")
            .set_delay(std::time::Duration::from_secs(3)),
    )
    .await;

    let balancer = HttpBalancer::new(BalancerConfig {
        timeout_seconds: 1,
        ..Default::default()
    })
    .expect("Failed to build balancer");

    let result = balancer
        .resolve(&format!("{}/server/2.1", server.uri()))
        .await;

    assert!(matches!(result, Err(RealtimeError::ClusterResolution(_))));
}
