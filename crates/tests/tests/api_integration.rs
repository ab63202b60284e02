use std::net::SocketAddr;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use axum::Router;
use intelli_api::{build_app, ApiConfig};
use intelli_core::follow_up;
use serde_json::{json, Value};
use tower::ServiceExt;

const API_KEY: &str = "test-key";

fn app() -> Router {
    app_with(ApiConfig {
        api_key: API_KEY.to_string(),
        ..ApiConfig::default()
    })
}

fn app_with(config: ApiConfig) -> Router {
    build_app(&config).expect("app should build")
}

fn chat_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/chat")
        .header("content-type", "application/json")
        .header("x-api-key", API_KEY)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn chat_from(peer: &str, body: Value) -> Request<Body> {
    let mut request = chat_request(body);
    let addr: SocketAddr = peer.parse().unwrap();
    request.extensions_mut().insert(ConnectInfo(addr));
    request
}

fn limited_app(trust_forwarded: bool) -> Router {
    app_with(ApiConfig {
        api_key: API_KEY.to_string(),
        rate_limit_window: Duration::from_secs(60),
        rate_limit_max: 2,
        trust_forwarded,
        ..ApiConfig::default()
    })
}

async fn json_body(response: axum::response::Response) -> Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let response = app()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("x-content-type-options").unwrap(),
        "nosniff"
    );
    let parsed = json_body(response).await;
    assert_eq!(parsed["status"], "ok");
    assert_eq!(parsed["rules"], 13);
}

#[tokio::test]
async fn chat_requires_api_key() {
    let request = Request::builder()
        .method("POST")
        .uri("/v1/chat")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "text": "hello" }).to_string()))
        .unwrap();

    let response = app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers().get("x-content-type-options").unwrap(),
        "nosniff"
    );
    assert_eq!(response.headers().get("cache-control").unwrap(), "no-store");
    let parsed = json_body(response).await;
    assert_eq!(parsed["error"], "unauthorized");
}

#[tokio::test]
async fn contact_reply_carries_structured_link() {
    let response = app()
        .oneshot(chat_request(json!({ "text": "What is the official website?" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let parsed = json_body(response).await;
    assert_eq!(parsed["intent"], "contact");
    assert_eq!(
        parsed["links"],
        json!([{ "label": "iitmjp.ac.in", "url": "https://iitmjp.ac.in/" }])
    );
    assert!(!parsed["body"].as_str().unwrap().contains("<a"));
}

#[tokio::test]
async fn conversation_keeps_topic_between_turns() {
    let app = app();

    let open = Request::builder()
        .method("POST")
        .uri("/v1/conversations")
        .header("x-api-key", API_KEY)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(open).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let opened = json_body(response).await;
    let id = opened["conversation_id"].as_str().unwrap().to_string();
    assert!(opened["reply"]["body"]
        .as_str()
        .unwrap()
        .contains("IntelliAssist"));

    let first = json_body(
        app.clone()
            .oneshot(chat_request(json!({ "conversation_id": id, "text": "Tell me about courses" })))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(first["topic"], "courses");

    let second = json_body(
        app.clone()
            .oneshot(chat_request(json!({ "conversation_id": id, "text": "asdkj random text" })))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(second["intent"], "fallback");
    assert_eq!(second["topic"], "courses");

    let third = json_body(
        app.clone()
            .oneshot(chat_request(json!({ "conversation_id": id, "text": "what about bca" })))
            .await
            .unwrap(),
    )
    .await;
    assert!(third["body"]
        .as_str()
        .unwrap()
        .ends_with(follow_up(Some(intelli_core::Topic::Courses))));

    let transcript = Request::builder()
        .uri(format!("/v1/conversations/{id}"))
        .header("x-api-key", API_KEY)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(transcript).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let record = json_body(response).await;
    assert_eq!(record["turns"].as_array().unwrap().len(), 3);
    assert_eq!(record["state"]["topic"], "courses");

    let end = || {
        Request::builder()
            .method("DELETE")
            .uri(format!("/v1/conversations/{id}"))
            .header("x-api-key", API_KEY)
            .body(Body::empty())
            .unwrap()
    };
    let response = app.clone().oneshot(end()).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let response = app.clone().oneshot(end()).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn blank_message_is_rejected() {
    let response = app()
        .oneshot(chat_request(json!({ "text": "   " })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let parsed = json_body(response).await;
    assert_eq!(parsed["error"], "empty_message");
}

#[tokio::test]
async fn malformed_chat_body_gets_json_error() {
    let response = app()
        .oneshot(chat_request(json!({ "txt": 1 })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/json"
    );
    let parsed = json_body(response).await;
    assert_eq!(parsed["error"], "invalid_request");
    assert!(parsed["message"].as_str().unwrap().contains("text"));
}

#[tokio::test]
async fn malformed_conversation_id_is_rejected() {
    let app = app();
    let too_long = "a".repeat(65);
    for id in ["", "has space", too_long.as_str()] {
        let response = app
            .clone()
            .oneshot(chat_request(json!({ "conversation_id": id, "text": "hello" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let parsed = json_body(response).await;
        assert_eq!(parsed["error"], "invalid_conversation_id");
    }
}

#[tokio::test]
async fn unknown_conversation_is_not_found() {
    let request = Request::builder()
        .uri("/v1/conversations/does-not-exist")
        .header("x-api-key", API_KEY)
        .body(Body::empty())
        .unwrap();

    let response = app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn rules_are_listed_in_table_order() {
    let request = Request::builder()
        .uri("/v1/rules")
        .header("x-api-key", API_KEY)
        .body(Body::empty())
        .unwrap();

    let parsed = json_body(app().oneshot(request).await.unwrap()).await;
    let rules = parsed["rules"].as_array().unwrap();
    assert_eq!(rules.len(), 13);
    assert_eq!(rules[0]["intent"], "greeting");
    assert_eq!(rules[2]["intent"], "admission");
    assert_eq!(rules[3]["intent"], "fees");
}

#[tokio::test]
async fn rate_limit_applies_per_client() {
    let app = limited_app(false);

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(chat_from("10.1.1.1:5000", json!({ "text": "hello" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .clone()
        .oneshot(chat_from("10.1.1.1:5001", json!({ "text": "hello" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        response.headers().get("x-content-type-options").unwrap(),
        "nosniff"
    );

    let response = app
        .clone()
        .oneshot(chat_from("10.2.2.2:5000", json!({ "text": "hello" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn forwarded_header_is_ignored_unless_trusted() {
    let app = limited_app(false);

    let mut statuses = Vec::new();
    for index in 0..5 {
        let mut request = chat_from("10.1.1.1:5000", json!({ "text": "hello" }));
        request.headers_mut().insert(
            "x-forwarded-for",
            format!("203.0.113.{index}").parse().unwrap(),
        );
        statuses.push(app.clone().oneshot(request).await.unwrap().status());
    }

    assert_eq!(
        statuses,
        vec![
            StatusCode::OK,
            StatusCode::OK,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::TOO_MANY_REQUESTS,
        ]
    );
}

#[tokio::test]
async fn trusted_forwarded_header_separates_clients() {
    let app = limited_app(true);
    let from = |client: &str| {
        let mut request = chat_from("10.0.0.1:5000", json!({ "text": "hello" }));
        request
            .headers_mut()
            .insert("x-forwarded-for", format!("{client}, 10.0.0.1").parse().unwrap());
        request
    };

    for _ in 0..2 {
        assert_eq!(
            app.clone().oneshot(from("198.51.100.7")).await.unwrap().status(),
            StatusCode::OK
        );
    }
    assert_eq!(
        app.clone().oneshot(from("198.51.100.7")).await.unwrap().status(),
        StatusCode::TOO_MANY_REQUESTS
    );
    assert_eq!(
        app.clone().oneshot(from("198.51.100.8")).await.unwrap().status(),
        StatusCode::OK
    );
}

#[tokio::test]
async fn missing_rules_file_fails_startup() {
    let result = build_app(&ApiConfig {
        rules_path: Some("/nonexistent/intelli-rules.json".into()),
        ..ApiConfig::default()
    });
    assert!(result.is_err());
}
