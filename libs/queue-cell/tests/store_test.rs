mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{live_session, test_config, waiting_token};
use queue_cell::store::{QueueStore, SupabaseQueueStore};
use queue_cell::QueueError;
use shared_database::SupabaseClient;

fn store_for(server: &MockServer) -> SupabaseQueueStore {
    let mut config = test_config();
    config.supabase_url = server.uri();
    config.supabase_anon_key = "test-anon-key".to_string();
    SupabaseQueueStore::new(
        Arc::new(SupabaseClient::new(&config)),
        Some("service-token".to_string()),
    )
}

#[tokio::test]
async fn get_session_round_trips_through_postgrest() {
    let server = MockServer::start().await;
    let session = live_session(Uuid::new_v4());

    Mock::given(method("GET"))
        .and(path("/rest/v1/queue_sessions"))
        .and(query_param("id", format!("eq.{}", session.id)))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([serde_json::to_value(&session).unwrap()])),
        )
        .mount(&server)
        .await;

    let store = store_for(&server);
    let fetched = store.get_session(session.id).await.unwrap().unwrap();
    assert_eq!(fetched.id, session.id);
    assert_eq!(fetched.version, session.version);
}

#[tokio::test]
async fn missing_session_comes_back_as_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/queue_sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let store = store_for(&server);
    assert!(store.get_session(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn save_session_advances_the_version_guard() {
    let server = MockServer::start().await;
    let session = live_session(Uuid::new_v4());
    let mut stored = session.clone();
    stored.version = session.version + 1;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/queue_sessions"))
        .and(query_param("id", format!("eq.{}", session.id)))
        .and(query_param("version", format!("eq.{}", session.version)))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([serde_json::to_value(&stored).unwrap()])),
        )
        .mount(&server)
        .await;

    let store = store_for(&server);
    let saved = store.save_session(&session).await.unwrap();
    assert_eq!(saved.version, session.version + 1);
}

#[tokio::test]
async fn stale_version_save_is_session_busy() {
    let server = MockServer::start().await;
    let session = live_session(Uuid::new_v4());

    // The version filter matches no rows: someone else already wrote.
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/queue_sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let store = store_for(&server);
    let err = store.save_session(&session).await.unwrap_err();
    assert_matches!(err, QueueError::SessionBusy { session_id } if session_id == session.id);
    assert!(err.is_retryable());
}

#[tokio::test]
async fn find_tokens_requests_ascending_token_order() {
    let server = MockServer::start().await;
    let session = live_session(Uuid::new_v4());
    let tokens = vec![waiting_token(&session, 1), waiting_token(&session, 2)];

    Mock::given(method("GET"))
        .and(path("/rest/v1/queue_tokens"))
        .and(query_param("session_id", format!("eq.{}", session.id)))
        .and(query_param("order", "token_number.asc"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::to_value(&tokens).unwrap()),
        )
        .mount(&server)
        .await;

    let store = store_for(&server);
    let fetched = store.find_tokens(session.id).await.unwrap();
    assert_eq!(fetched.len(), 2);
    assert_eq!(fetched[0].token_number, Some(1));
}

#[tokio::test]
async fn save_token_for_unknown_row_is_not_found() {
    let server = MockServer::start().await;
    let session = live_session(Uuid::new_v4());
    let token = waiting_token(&session, 1);

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/queue_tokens"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let store = store_for(&server);
    let err = store.save_token(&token).await.unwrap_err();
    assert_matches!(err, QueueError::NotFound(_));
}
