#![allow(clippy::unwrap_used, clippy::panic, missing_debug_implementations, unreachable_pub)]
use golfchat_server::domain::actor::Actor;
use reqwest::StatusCode;
use serde_json::Value;
use uuid::Uuid;

mod common;

#[tokio::test]
async fn test_golfer_resolves_assigned_professional() {
    let app = common::TestApp::spawn().await;
    let (golfer, pro) = app.golfer_with_pro();

    let resp = app.get_counterpart(&golfer.token).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["kind"], "professional");
    assert_eq!(body["professional_id"], pro.id.to_string());
}

#[tokio::test]
async fn test_golfer_resolution_is_idempotent() {
    let app = common::TestApp::spawn().await;
    let (golfer, _pro) = app.golfer_with_pro();

    let first: Value = app.get_counterpart(&golfer.token).await.json().await.unwrap();
    let second: Value = app.get_counterpart(&golfer.token).await.json().await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_unassigned_golfer_gets_not_found() {
    let app = common::TestApp::spawn().await;
    let golfer = app.actor(Actor::golfer(Uuid::new_v4()));

    let resp = app.get_counterpart(&golfer.token).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "No professional assigned");
    assert!(app.store.is_empty().await);
}

#[tokio::test]
async fn test_professional_gets_assigned_golfers() {
    let app = common::TestApp::spawn().await;
    let pro = app.pro();
    let g1 = app.golfer_of(&pro);
    let g2 = app.golfer_of(&pro);
    let _elsewhere = app.golfer_of(&app.pro());

    let body: Value = app.get_counterpart(&pro.token).await.json().await.unwrap();
    assert_eq!(body["kind"], "candidates");

    let mut ids: Vec<String> =
        body["golfer_ids"].as_array().unwrap().iter().map(|v| v.as_str().unwrap().to_string()).collect();
    ids.sort();
    let mut expected = vec![g1.id.to_string(), g2.id.to_string()];
    expected.sort();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn test_directory_outage_is_service_unavailable() {
    let app = common::TestApp::spawn().await;
    let (golfer, _pro) = app.golfer_with_pro();
    app.directory.set_offline(true);

    let resp = app.get_counterpart(&golfer.token).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

    app.directory.set_offline(false);
    assert_eq!(app.get_counterpart(&golfer.token).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_missing_or_forged_token_is_unauthorized() {
    let app = common::TestApp::spawn().await;

    let resp = app.client.get(format!("{}/v1/counterpart", app.server_url)).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = app.get_counterpart("not-a-token").await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_request_id_is_propagated() {
    let app = common::TestApp::spawn().await;
    let (golfer, _pro) = app.golfer_with_pro();

    let resp = app
        .client
        .get(format!("{}/v1/counterpart", app.server_url))
        .bearer_auth(&golfer.token)
        .header("x-request-id", "lesson-42")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.headers()["x-request-id"], "lesson-42");
}
