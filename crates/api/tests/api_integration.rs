//! API integration tests.
//!
//! These tests drive the full router over an in-memory store.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::redundant_clone)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use livepoll_api::{AppState, app};
use livepoll_core::{
    MemoryPollStore, PollService, RetryPolicy, RoomRegistry, TokenVerifier, VoteIntake,
    VoteLedger,
};
use serde_json::{Value, json};
use tower::ServiceExt;

const SECRET: &str = "integration-secret";

/// Create test app state over an in-memory store.
fn create_test_state() -> AppState {
    let ledger = VoteLedger::new(
        Arc::new(MemoryPollStore::new()),
        RoomRegistry::new(),
        Duration::from_secs(5),
    );
    let intake = VoteIntake::new(
        ledger.clone(),
        TokenVerifier::new(SECRET),
        RetryPolicy::none(),
    );
    AppState::new(PollService::new(ledger), intake)
}

fn token(user: &str) -> String {
    TokenVerifier::new(SECRET)
        .issue(user, Duration::from_secs(300))
        .unwrap()
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    user: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().uri(uri).method(method);
    if let Some(user) = user {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token(user)));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn create_poll(app: &Router, user: &str) -> Value {
    let (status, body) = send(
        app,
        "POST",
        "/api/polls",
        Some(user),
        Some(json!({ "title": "Lunch?", "options": ["Pizza", "Tacos"] })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["data"].clone()
}

#[tokio::test]
async fn test_create_poll_requires_auth() {
    let app = app(create_test_state());

    let (status, body) = send(
        &app,
        "POST",
        "/api/polls",
        None,
        Some(json!({ "title": "Lunch?", "options": ["Pizza", "Tacos"] })),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_create_poll_validation() {
    let app = app(create_test_state());

    let (status, body) = send(
        &app,
        "POST",
        "/api/polls",
        Some("alice"),
        Some(json!({ "title": "Lunch?", "options": ["Pizza"] })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_create_and_fetch_poll() {
    let state = create_test_state();
    let mut created_rx = state.streaming.poll_created_tx.subscribe();
    let app = app(state);

    let poll = create_poll(&app, "alice").await;
    let id = poll["id"].as_str().unwrap();
    assert_eq!(poll["creator"], "alice");
    assert_eq!(poll["isActive"], true);
    assert_eq!(poll["totalVotes"], 0);
    assert_eq!(created_rx.recv().await.unwrap().poll_id, id);

    let (status, body) = send(&app, "GET", &format!("/api/polls/{id}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["title"], "Lunch?");

    let (status, body) = send(&app, "GET", "/api/polls", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_unknown_poll_returns_404() {
    let app = app(create_test_state());

    let (status, body) = send(&app, "GET", "/api/polls/nope", None, None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "POLL_NOT_FOUND");
}

#[tokio::test]
async fn test_vote_flow() {
    let app = app(create_test_state());
    let poll = create_poll(&app, "alice").await;
    let id = poll["id"].as_str().unwrap();
    let option_a = poll["options"][0]["id"].as_str().unwrap();
    let option_b = poll["options"][1]["id"].as_str().unwrap();
    let vote_uri = format!("/api/polls/{id}/vote");

    let (status, body) = send(
        &app,
        "POST",
        &vote_uri,
        None,
        Some(json!({ "optionId": option_a })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let (status, body) = send(
        &app,
        "POST",
        &vote_uri,
        Some("bob"),
        Some(json!({ "optionId": option_a })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["options"][0]["voteCount"], 1);
    assert_eq!(body["data"]["voters"], json!(["bob"]));

    let (status, body) = send(
        &app,
        "POST",
        &vote_uri,
        Some("bob"),
        Some(json!({ "optionId": option_b })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "ALREADY_VOTED");

    let (status, body) = send(
        &app,
        "POST",
        &vote_uri,
        Some("carol"),
        Some(json!({ "optionId": "missing" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "OPTION_NOT_FOUND");

    let (status, body) = send(
        &app,
        "POST",
        "/api/polls/nope/vote",
        Some("carol"),
        Some(json!({ "optionId": option_a })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "POLL_NOT_FOUND");
}

#[tokio::test]
async fn test_end_poll() {
    let app = app(create_test_state());
    let poll = create_poll(&app, "alice").await;
    let id = poll["id"].as_str().unwrap();
    let option_a = poll["options"][0]["id"].as_str().unwrap();
    let end_uri = format!("/api/polls/{id}/end");

    let (status, body) = send(&app, "PUT", &end_uri, Some("bob"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");

    let (status, body) = send(&app, "PUT", &end_uri, Some("alice"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["isActive"], false);
    assert!(body["data"]["endDate"].is_string());

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/polls/{id}/vote"),
        Some("bob"),
        Some(json!({ "optionId": option_a })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "POLL_CLOSED");

    let (_, body) = send(&app, "GET", "/api/polls/active", None, None).await;
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_user_views() {
    let app = app(create_test_state());
    let poll = create_poll(&app, "alice").await;
    create_poll(&app, "bob").await;
    let id = poll["id"].as_str().unwrap();
    let option_a = poll["options"][0]["id"].as_str().unwrap();

    send(
        &app,
        "POST",
        &format!("/api/polls/{id}/vote"),
        Some("carol"),
        Some(json!({ "optionId": option_a })),
    )
    .await;

    let (status, body) = send(&app, "GET", "/api/polls/user/created", Some("alice"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["id"], id);

    let (status, body) = send(&app, "GET", "/api/polls/user/voted", Some("carol"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["id"], id);

    let (status, _) = send(&app, "GET", "/api/polls/user/voted", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_user_stats() {
    let app = app(create_test_state());
    let lunch = create_poll(&app, "alice").await;
    let dinner = create_poll(&app, "alice").await;
    let breakfast = create_poll(&app, "bob").await;

    let votes = [
        ("bob", &lunch),
        ("carol", &lunch),
        ("carol", &dinner),
        ("alice", &breakfast),
    ];
    for (voter, poll) in votes {
        let (status, _) = send(
            &app,
            "POST",
            &format!("/api/polls/{}/vote", poll["id"].as_str().unwrap()),
            Some(voter),
            Some(json!({ "optionId": poll["options"][0]["id"] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = send(&app, "GET", "/api/polls/user/stats", Some("alice"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["data"],
        json!({ "pollsCreated": 2, "pollsVoted": 1, "totalVotesReceived": 3 })
    );

    let (status, body) = send(&app, "GET", "/api/polls/user/stats", Some("dave"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["data"],
        json!({ "pollsCreated": 0, "pollsVoted": 0, "totalVotesReceived": 0 })
    );

    let (status, _) = send(&app, "GET", "/api/polls/user/stats", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_empty_option_id_is_option_not_found() {
    let app = app(create_test_state());
    let poll = create_poll(&app, "alice").await;
    let id = poll["id"].as_str().unwrap();

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/polls/{id}/vote"),
        Some("bob"),
        Some(json!({ "optionId": "" })),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "OPTION_NOT_FOUND");

    let (_, body) = send(&app, "GET", &format!("/api/polls/{id}"), None, None).await;
    assert_eq!(body["data"]["totalVotes"], 0);
}

#[tokio::test]
async fn test_invalid_token_is_unauthorized() {
    let app = app(create_test_state());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/polls/user/created")
                .method("GET")
                .header(header::AUTHORIZATION, "Bearer not-a-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unknown_endpoint_returns_404() {
    let app = app(create_test_state());

    let (status, _) = send(&app, "GET", "/api/nonexistent", None, None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}
