//! HTTP comparison client against a mock face-comparison service

use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use facematch_batch::domain::{ComparisonError, ImageBytes, RawComparison};
use facematch_batch::infrastructure::config::ComparisonApiConfig;
use facematch_batch::infrastructure::{ComparisonClient, HttpComparisonClient};

const ENDPOINT: &str = "/v1/faces/compare";

fn client_for(
    server: &MockServer,
    api_key: Option<&str>,
    timeout_seconds: u64,
) -> HttpComparisonClient {
    let config = ComparisonApiConfig {
        base_url: server.uri(),
        api_key: api_key.map(ToString::to_string),
        timeout_seconds,
        max_requests_per_second: 100,
        ..ComparisonApiConfig::default()
    };
    HttpComparisonClient::new(&config).unwrap()
}

async fn compare_with(
    client: &HttpComparisonClient,
    targets: usize,
) -> Result<Vec<RawComparison>, ComparisonError> {
    client.compare(&ImageBytes::jpeg(vec![1]), &images(targets)).await
}

fn images(n: usize) -> Vec<ImageBytes> {
    (0..n).map(|i| ImageBytes::jpeg(format!("target-bytes-{i}").into_bytes())).collect()
}

#[tokio::test]
async fn sends_multipart_and_decodes_ordered_results() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .and(header("authorization", "Bearer secret-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                {
                    "faceMatches": [{ "similarity": 99.2, "face": { "boundingBox": {} } }],
                    "unmatchedFaces": [],
                    "sourceFaceCount": 1,
                    "targetFaceCount": 1
                },
                {
                    "faceMatches": [],
                    "unmatchedFaces": [{ "confidence": 88.0 }],
                    "sourceFaceCount": 1,
                    "targetFaceCount": 1
                },
                { "error": "InvalidImageFormat" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, Some("secret-key"), 5);
    let source = ImageBytes::jpeg(b"source-bytes".to_vec());
    let results = client.compare(&source, &images(3)).await.unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].face_matches[0].similarity(), Some(99.2));
    assert!(results[1].face_matches.is_empty());
    assert_eq!(results[1].unmatched_faces.len(), 1);
    assert_eq!(results[2].error.as_deref(), Some("InvalidImageFormat"));
    assert_eq!(results[2].source_face_count, 0);

    let requests = server.received_requests().await.unwrap();
    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(body.contains(r#"name="source"; filename="source""#));
    let first = body.find(r#"filename="target-0""#).unwrap();
    let last = body.find(r#"filename="target-2""#).unwrap();
    assert!(first < last);
    assert!(body.contains("target-bytes-1"));
    assert!(body.contains("Content-Type: image/jpeg"));
}

#[tokio::test]
async fn error_status_keeps_truncated_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(502).set_body_string("x".repeat(4000)))
        .mount(&server)
        .await;

    let err = compare_with(&client_for(&server, None, 5), 1).await.unwrap_err();

    match err {
        ComparisonError::Status { status, body } => {
            assert_eq!(status, 502);
            assert!(body.chars().count() <= 513);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn garbage_body_is_malformed_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = compare_with(&client_for(&server, None, 5), 2).await.unwrap_err();
    assert!(matches!(err, ComparisonError::MalformedPayload(_)));
}

#[tokio::test]
async fn missing_results_decode_as_empty() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let results = compare_with(&client_for(&server, None, 5), 2).await.unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn slow_service_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(5))
                .set_body_json(json!({ "results": [] })),
        )
        .mount(&server)
        .await;

    let err = compare_with(&client_for(&server, None, 1), 1).await.unwrap_err();
    assert!(matches!(err, ComparisonError::Timeout(_)), "got {err:?}");
}

#[tokio::test]
async fn unreachable_service_is_network_error() {
    let config = ComparisonApiConfig {
        base_url: "http://127.0.0.1:9".to_string(),
        ..ComparisonApiConfig::default()
    };
    let client = HttpComparisonClient::new(&config).unwrap();

    let err = client.compare(&ImageBytes::jpeg(vec![1]), &images(1)).await.unwrap_err();
    assert!(
        matches!(err, ComparisonError::Network(_) | ComparisonError::Timeout(_)),
        "got {err:?}"
    );
}
