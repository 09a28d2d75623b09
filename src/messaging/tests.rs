use super::*;
use crate::core::middleware::AuthMiddleware;
use crate::messaging::models::Message;
use crate::testing::service_account_key;
use httpmock::prelude::*;
use serde_json::json;

/// Starts a mock server that answers the OAuth2 token exchange and returns a
/// client pointed at it.
fn mock_messaging(server: &MockServer) -> FirebaseMessaging {
    crate::core::install_crypto_provider();

    server.mock(|when, then| {
        when.method(POST).path("/token");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "access_token": "fake-token",
                "token_type": "Bearer",
                "expires_in": 3600
            }));
    });

    let middleware = AuthMiddleware::new(service_account_key(server.url("/token")));
    FirebaseMessaging::with_endpoints(
        middleware,
        FcmEndpoints {
            send_url: server.url("/v1/projects/test-project/messages:send"),
            iid_base_url: server.url("/iid"),
        },
    )
}

#[tokio::test]
async fn test_send_message() {
    let server = MockServer::start();
    let messaging = mock_messaging(&server);

    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/projects/test-project/messages:send")
            .header("authorization", "Bearer fake-token")
            .json_body(json!({
                "message": {
                    "notification": {"title": "Test Title", "body": "Test Body"},
                    "token": "test-token"
                }
            }));
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "name": "projects/test-project/messages/12345"
            }));
    });

    let message = Message::notification(Some("Test Title"), "Test Body").with_token("test-token");

    let result = messaging.send(&message).await.unwrap();
    assert_eq!(result, "projects/test-project/messages/12345");

    mock.assert();
}

#[tokio::test]
async fn test_send_to_topic() {
    let server = MockServer::start();
    let messaging = mock_messaging(&server);

    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/projects/test-project/messages:send")
            .json_body(json!({
                "message": {
                    "notification": {"body": "Body only"},
                    "topic": "news"
                }
            }));
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({"name": "projects/test-project/messages/777"}));
    });

    let message = Message::notification(None, "Body only").with_topic("news");
    let result = messaging.send(&message).await.unwrap();
    assert_eq!(result, "projects/test-project/messages/777");

    mock.assert();
}

#[tokio::test]
async fn test_send_rejected_by_fcm() {
    let server = MockServer::start();
    let messaging = mock_messaging(&server);

    server.mock(|when, then| {
        when.method(POST).path("/v1/projects/test-project/messages:send");
        then.status(404)
            .header("content-type", "application/json")
            .json_body(json!({
                "error": {
                    "code": 404,
                    "message": "Requested entity was not found.",
                    "status": "NOT_FOUND",
                    "details": [{
                        "@type": "type.googleapis.com/google.firebase.fcm.v1.FcmError",
                        "errorCode": "UNREGISTERED"
                    }]
                }
            }));
    });

    let message = Message::notification(Some("t"), "b").with_token("stale-token");
    let err = messaging.send(&message).await.unwrap_err();
    match err {
        MessagingError::ApiError(reason) => assert!(reason.starts_with("UNREGISTERED")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_send_multicast_preserves_token_order() {
    let server = MockServer::start();
    let messaging = mock_messaging(&server);

    for (token, id) in [("token-a", "m-a"), ("token-c", "m-c")] {
        server.mock(move |when, then| {
            when.method(POST)
                .path("/v1/projects/test-project/messages:send")
                .body_includes(format!("\"token\":\"{token}\""));
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"name": id}));
        });
    }
    server.mock(|when, then| {
        when.method(POST)
            .path("/v1/projects/test-project/messages:send")
            .body_includes("\"token\":\"token-b\"");
        then.status(400)
            .header("content-type", "application/json")
            .json_body(json!({
                "error": {
                    "code": 400,
                    "message": "The registration token is not a valid FCM registration token",
                    "status": "INVALID_ARGUMENT"
                }
            }));
    });

    let base = Message::notification(Some("Hi"), "Body");
    let result = messaging
        .send_multicast(&base, &["token-a", "token-b", "token-c"])
        .await
        .unwrap();

    assert_eq!(result.success_count, 2);
    assert_eq!(result.failure_count, 1);
    assert_eq!(result.responses.len(), 3);
    assert_eq!(result.responses[0].message_id.as_deref(), Some("m-a"));
    assert!(!result.responses[1].success);
    assert!(result.responses[1]
        .error
        .as_deref()
        .unwrap()
        .starts_with("INVALID_ARGUMENT"));
    assert_eq!(result.responses[2].message_id.as_deref(), Some("m-c"));
}

#[tokio::test]
async fn test_send_multicast_keeps_delivered_results_when_one_send_breaks() {
    let server = MockServer::start();
    let messaging = mock_messaging(&server);

    let delivered = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/projects/test-project/messages:send")
            .body_includes("\"token\":\"token-a\"");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({"name": "m-a"}));
    });
    server.mock(|when, then| {
        when.method(POST)
            .path("/v1/projects/test-project/messages:send")
            .body_includes("\"token\":\"token-b\"");
        then.status(200)
            .header("content-type", "application/json")
            .body("not json");
    });

    let base = Message::notification(Some("Hi"), "Body");
    let result = messaging
        .send_multicast(&base, &["token-a", "token-b"])
        .await
        .unwrap();

    delivered.assert_calls(1);
    assert_eq!(result.success_count, 1);
    assert_eq!(result.failure_count, 1);
    assert_eq!(result.responses[0].message_id.as_deref(), Some("m-a"));
    assert!(!result.responses[1].success);
    assert!(result.responses[1].error.is_some());
}

#[tokio::test]
async fn test_send_multicast_spans_batches_in_order() {
    let server = MockServer::start();
    let messaging = mock_messaging(&server);

    let first_batch = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/projects/test-project/messages:send")
            .body_includes("\"token\":\"first-");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({"name": "m-first"}));
    });
    let second_batch = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/projects/test-project/messages:send")
            .body_includes("\"token\":\"second-");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({"name": "m-second"}));
    });

    let mut tokens: Vec<String> = (0..MAX_BATCH_SIZE).map(|i| format!("first-{i}")).collect();
    tokens.push("second-0".to_string());
    tokens.push("second-1".to_string());
    let tokens: Vec<&str> = tokens.iter().map(String::as_str).collect();

    let base = Message::notification(None, "Body");
    let result = messaging.send_multicast(&base, &tokens).await.unwrap();

    first_batch.assert_calls(MAX_BATCH_SIZE);
    second_batch.assert_calls(2);
    assert_eq!(result.responses.len(), MAX_BATCH_SIZE + 2);
    assert_eq!(result.success_count, MAX_BATCH_SIZE + 2);
    assert!(result.responses[..MAX_BATCH_SIZE]
        .iter()
        .all(|r| r.message_id.as_deref() == Some("m-first")));
    assert!(result.responses[MAX_BATCH_SIZE..]
        .iter()
        .all(|r| r.message_id.as_deref() == Some("m-second")));
}

#[tokio::test]
async fn test_send_multicast_rejects_targeted_base_message() {
    let server = MockServer::start();
    let messaging = mock_messaging(&server);

    let base = Message::notification(None, "Body").with_token("already-set");
    let err = messaging.send_multicast(&base, &["t1"]).await.unwrap_err();
    assert!(matches!(err, MessagingError::InvalidMessage(_)));
}

#[tokio::test]
async fn test_subscribe_to_topic() {
    let server = MockServer::start();
    let messaging = mock_messaging(&server);

    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/iid/iid/v1:batchAdd")
            .header("access_token_auth", "true")
            .json_body(json!({
                "to": "/topics/test-topic",
                "registration_tokens": ["token1", "token2"]
            }));
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "results": [
                    {},
                    { "error": "INVALID_ARGUMENT" }
                ]
            }));
    });

    let result = messaging
        .subscribe_to_topic("test-topic", &["token1", "token2"])
        .await
        .unwrap();
    assert_eq!(result.success_count, 1);
    assert_eq!(result.failure_count, 1);
    assert_eq!(result.errors[0].index, 1);
    assert_eq!(result.errors[0].reason, "INVALID_ARGUMENT");

    mock.assert();
}

#[tokio::test]
async fn test_unsubscribe_from_topic_with_prefixed_name() {
    let server = MockServer::start();
    let messaging = mock_messaging(&server);

    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/iid/iid/v1:batchRemove")
            .json_body(json!({
                "to": "/topics/test-topic",
                "registration_tokens": ["token1"]
            }));
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "results": [
                    {}
                ]
            }));
    });

    let result = messaging
        .unsubscribe_from_topic("/topics/test-topic", &["token1"])
        .await
        .unwrap();
    assert_eq!(result.success_count, 1);
    assert_eq!(result.failure_count, 0);

    mock.assert();
}

#[test]
fn test_normalize_topic() {
    assert_eq!(normalize_topic("weather").unwrap(), "weather");
    assert_eq!(normalize_topic("/topics/weather").unwrap(), "weather");
    assert_eq!(normalize_topic("a-b_c.d~e%20").unwrap(), "a-b_c.d~e%20");
    assert!(normalize_topic("").is_err());
    assert!(normalize_topic("/topics/").is_err());
    assert!(normalize_topic("has space").is_err());
}

#[test]
fn test_production_endpoints() {
    let endpoints = FcmEndpoints::for_project("my-project");
    assert_eq!(
        endpoints.send_url,
        "https://fcm.googleapis.com/v1/projects/my-project/messages:send"
    );
    assert_eq!(endpoints.iid_base_url, "https://iid.googleapis.com");
}
