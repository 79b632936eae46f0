#![allow(clippy::unwrap_used, clippy::panic, missing_debug_implementations, unreachable_pub)]
mod common;

use base64::Engine;
use common::TestApp;
use reqwest::StatusCode;
use reqwest::header::COOKIE;
use serde_json::{Value, json};
use uuid::Uuid;

const PNG_1X1: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52, 0x00, 0x00, 0x00,
    0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F, 0x15, 0xC4, 0x89,
];

#[tokio::test]
async fn test_send_and_list_thread() {
    let app = TestApp::spawn().await;
    let alice = app.register_user("alice").await;
    let bob = app.register_user("bob").await;

    let resp = app.send_text(&alice, bob.id, "  hello bob  ").await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let sent: Value = resp.json().await.unwrap();
    assert_eq!(sent["text"], "hello bob");
    assert_eq!(sent["senderId"], alice.id.to_string());
    assert_eq!(sent["receiverId"], bob.id.to_string());
    assert_eq!(sent["isSeen"], false);

    assert_eq!(app.send_text(&bob, alice.id, "hi alice").await.status(), StatusCode::CREATED);

    // Both participants see the same thread, oldest first.
    for (viewer, other) in [(&alice, bob.id), (&bob, alice.id)] {
        let resp = app
            .client
            .get(format!("{}/messages/{other}", app.server_url))
            .header(COOKIE, &viewer.cookie)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let thread: Vec<Value> = resp.json().await.unwrap();
        assert_eq!(thread.len(), 2);
        assert_eq!(thread[0]["text"], "hello bob");
        assert_eq!(thread[1]["text"], "hi alice");
    }
}

#[tokio::test]
async fn test_send_rejects_empty_and_unknown_receiver() {
    let app = TestApp::spawn().await;
    let alice = app.register_user("alice").await;
    let bob = app.register_user("bob").await;

    let resp = app
        .client
        .post(format!("{}/messages/send/{}", app.server_url, bob.id))
        .header(COOKIE, &alice.cookie)
        .json(&json!({ "text": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app.send_text(&alice, Uuid::new_v4(), "anyone there?").await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = app
        .client
        .post(format!("{}/messages/send/{}", app.server_url, bob.id))
        .json(&json!({ "text": "no session" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_send_image_stores_public_url() {
    let app = TestApp::spawn().await;
    let alice = app.register_user("alice").await;
    let bob = app.register_user("bob").await;

    let data_uri =
        format!("data:image/png;base64,{}", base64::engine::general_purpose::STANDARD.encode(PNG_1X1));
    let resp = app
        .client
        .post(format!("{}/messages/send/{}", app.server_url, bob.id))
        .header(COOKIE, &alice.cookie)
        .json(&json!({ "image": data_uri }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let sent: Value = resp.json().await.unwrap();
    let image = sent["image"].as_str().unwrap();
    assert!(image.starts_with("http://media.test/parley/messages/"));
    assert!(image.ends_with(".png"));
    assert!(sent["text"].is_null());
}

#[tokio::test]
async fn test_only_sender_can_edit_or_delete() {
    let app = TestApp::spawn().await;
    let alice = app.register_user("alice").await;
    let bob = app.register_user("bob").await;

    let sent: Value = app.send_text(&alice, bob.id, "original").await.json().await.unwrap();
    let id = sent["id"].as_str().unwrap().to_string();

    let resp = app
        .client
        .put(format!("{}/messages/{id}", app.server_url))
        .header(COOKIE, &bob.cookie)
        .json(&json!({ "text": "hijacked" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = app
        .client
        .delete(format!("{}/messages/{id}", app.server_url))
        .header(COOKIE, &bob.cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = app
        .client
        .put(format!("{}/messages/{id}", app.server_url))
        .header(COOKIE, &alice.cookie)
        .json(&json!({ "text": "edited" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let edited: Value = resp.json().await.unwrap();
    assert_eq!(edited["text"], "edited");
    assert_ne!(edited["updatedAt"], edited["createdAt"]);

    let resp = app
        .client
        .delete(format!("{}/messages/{id}", app.server_url))
        .header(COOKIE, &alice.cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["id"], id);

    let resp = app
        .client
        .delete(format!("{}/messages/{id}", app.server_url))
        .header(COOKIE, &alice.cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_mark_seen_counts_only_unseen_from_sender() {
    let app = TestApp::spawn().await;
    let alice = app.register_user("alice").await;
    let bob = app.register_user("bob").await;

    app.send_text(&alice, bob.id, "one").await;
    app.send_text(&alice, bob.id, "two").await;
    app.send_text(&bob, alice.id, "reply").await;

    let mark = || {
        app.client
            .patch(format!("{}/messages/seen/{}", app.server_url, alice.id))
            .header(COOKIE, &bob.cookie)
            .send()
    };

    let body: Value = mark().await.unwrap().json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["count"], 2);

    let body: Value = mark().await.unwrap().json().await.unwrap();
    assert_eq!(body["count"], 0);

    let thread: Vec<Value> = app
        .client
        .get(format!("{}/messages/{}", app.server_url, bob.id))
        .header(COOKIE, &alice.cookie)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let from_alice: Vec<&Value> = thread.iter().filter(|m| m["senderId"] == alice.id.to_string()).collect();
    assert!(from_alice.iter().all(|m| m["isSeen"] == true));
    let from_bob: Vec<&Value> = thread.iter().filter(|m| m["senderId"] == bob.id.to_string()).collect();
    assert!(from_bob.iter().all(|m| m["isSeen"] == false));
}

#[tokio::test]
async fn test_malformed_id_and_body_get_json_errors() {
    let app = TestApp::spawn().await;
    let alice = app.register_user("alice").await;
    let bob = app.register_user("bob").await;

    let resp = app
        .client
        .get(format!("{}/messages/not-a-uuid", app.server_url))
        .header(COOKIE, &alice.cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Invalid path parameter");

    let resp = app
        .client
        .post(format!("{}/messages/send/{}", app.server_url, bob.id))
        .header(COOKIE, &alice.cookie)
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Malformed request body");
    assert!(!body["message"].as_str().unwrap().contains("line 1"));
}
