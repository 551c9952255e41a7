use facelink_remote::{run_enrollment, EnrollmentPlan, RecognitionClient, RemoteError};
use httpmock::prelude::*;
use serde_json::json;
use std::time::Duration;

fn client(server: &MockServer) -> RecognitionClient {
    RecognitionClient::new(server.base_url(), Duration::from_secs(2)).unwrap()
}

fn jpeg() -> Vec<u8> {
    vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0xFF, 0xD9]
}

#[tokio::test]
async fn test_recognize_bare_array() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/faces/recognition")
                .body_contains("name=\"image\"");
            then.status(200).json_body(json!([
                {"name": "Ana", "clerk_id": "user_1", "confidence": 0.31, "coords": [28, 28, 12, 12]},
                {"name": "Bo", "clerk_id": "user_2", "confidence": 0.55, "coords": [80, 10, 10, 10]}
            ]));
        })
        .await;

    let records = client(&server).recognize(jpeg()).await.unwrap();
    mock.assert_async().await;
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].identity_label, "Ana");
    assert_eq!(records[1].identity_id, "user_2");
}

#[tokio::test]
async fn test_recognize_wrapped_object() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/faces/recognition");
            then.status(200).json_body(json!({
                "recognitions": [
                    {"name": "Ana", "clerk_id": "user_1", "confidence": 0.2, "coords": [0, 0, 5, 5]}
                ]
            }));
        })
        .await;

    let records = client(&server).recognize(jpeg()).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].coords, [0.0, 0.0, 5.0, 5.0]);
}

#[tokio::test]
async fn test_recognize_keeps_good_records_beside_bad_ones() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/faces/recognition");
            then.status(200).json_body(json!([
                {"name": "Ana", "clerk_id": "user_1", "confidence": 0.31, "coords": [28, 28, 12, 12]},
                {"name": "Bo", "clerk_id": "user_2", "confidence": 0.4, "coords": [28, 28, 12]},
                {"name": "Cy", "clerk_id": "user_3", "coords": [5, 5, 5, 5]}
            ]));
        })
        .await;

    let records = client(&server).recognize(jpeg()).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].identity_id, "user_1");
}

#[tokio::test]
async fn test_recognize_server_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/faces/recognition");
            then.status(500).body("model offline");
        })
        .await;

    let err = client(&server).recognize(jpeg()).await.unwrap_err();
    match err {
        RemoteError::Status { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "model offline");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_recognize_malformed_body() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/faces/recognition");
            then.status(200).body("not json");
        })
        .await;

    let err = client(&server).recognize(jpeg()).await.unwrap_err();
    assert!(matches!(err, RemoteError::Malformed(_)));
}

#[tokio::test]
async fn test_recognize_timeout() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/faces/recognition");
            then.status(200).body("[]").delay(Duration::from_millis(300));
        })
        .await;

    let client = RecognitionClient::new(server.base_url(), Duration::from_millis(50)).unwrap();
    let err = client.recognize(jpeg()).await.unwrap_err();
    assert!(matches!(err, RemoteError::Request(_)));
}

#[tokio::test]
async fn test_enroll_sends_identity() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/faces")
                .body_contains("name=\"clerk_id\"")
                .body_contains("user_42")
                .body_contains("name=\"image\"");
            then.status(201).json_body(json!({"ok": true}));
        })
        .await;

    let value = client(&server)
        .enroll("user_42", jpeg(), "user_42_0.jpg")
        .await
        .unwrap();
    mock.assert_async().await;
    assert_eq!(value, json!({"ok": true}));
}

#[tokio::test]
async fn test_registered_faces() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/users/faces/user_42");
            then.status(200).json_body(json!({"faces": 5}));
        })
        .await;

    let value = client(&server).registered_faces("user_42").await.unwrap();
    assert_eq!(value["faces"], 5);
}

#[tokio::test]
async fn test_registered_faces_not_found() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/users/faces/ghost");
            then.status(404);
        })
        .await;

    let err = client(&server).registered_faces("ghost").await.unwrap_err();
    assert!(matches!(err, RemoteError::Status { status: 404, .. }));
}

#[tokio::test]
async fn test_enrollment_run_counts_failures() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/faces");
            then.status(200).json_body(json!({}));
        })
        .await;

    let plan = EnrollmentPlan {
        total: 5,
        interval: Duration::ZERO,
    };
    let mut progress = Vec::new();
    // Captures 1 and 3 fail before upload.
    let tally = run_enrollment(
        &client(&server),
        "user_7",
        plan,
        |index| {
            if index % 2 == 1 {
                Err("camera hiccup")
            } else {
                Ok(jpeg())
            }
        },
        |tally| progress.push(tally.progress()),
    )
    .await;

    mock.assert_hits_async(3).await;
    assert_eq!(progress, vec![0.2, 0.4, 0.6, 0.8, 1.0]);
    assert_eq!(tally.succeeded, 3);
    assert_eq!(tally.failed, 2);
    assert!(tally.is_accepted());
}

#[tokio::test]
async fn test_enrollment_rejected_when_backend_fails() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/faces");
            then.status(503);
        })
        .await;

    let plan = EnrollmentPlan {
        total: 3,
        interval: Duration::ZERO,
    };
    let tally = run_enrollment(
        &client(&server),
        "user_7",
        plan,
        |_| Ok::<_, String>(jpeg()),
        |_| {},
    )
    .await;

    assert_eq!(tally.succeeded, 0);
    assert_eq!(tally.failed, 3);
    assert!(!tally.is_accepted());
}
