//! Integration tests for the control surface (§6 "Control surface (HTTP,
//! loopback)"). Mirrors `gglib-axum`'s `tower::ServiceExt::oneshot` style —
//! build the router against a stub session and drive requests through it
//! without binding a socket.

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use maestro_core::engine::EngineConfig;
use maestro_core::model::Mode;
use maestro_core::provider::batch_local::{BatchLocal, ModelHandle};
use maestro_core::provider::{Provider, StubAcousticModel};
use maestro_core::session::{SessionCoordinator, SessionPaths};
use maestro_core::speaking::FakeSpeakingState;
use maestro_daemon::http::router;

fn test_state() -> Arc<SessionCoordinator> {
    let dir = std::env::temp_dir();
    Arc::new(SessionCoordinator::new(
        SessionPaths {
            command_file: dir.join(format!("maestro-http-test-command-{}.txt", std::process::id())),
            status_file: dir.join(format!("maestro-http-test-status-{}.json", std::process::id())),
            vocab_file: PathBuf::from("/nonexistent/maestro-http-test-vocab.json"),
        },
        EngineConfig::default(),
        None,
        Arc::new(FakeSpeakingState::new(false)),
        Arc::new(|| Provider::BatchLocal(BatchLocal::new(ModelHandle::new(StubAcousticModel::new())))),
        Mode::Command,
        None,
    ))
}

#[tokio::test]
async fn status_endpoint_reports_idle_session() {
    let app = router(test_state());

    let response = app
        .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let body_str = std::str::from_utf8(&body).unwrap();
    assert!(body_str.contains("\"running\":false"));
    assert!(body_str.contains("\"mode\":\"command\""));
}

#[tokio::test]
async fn nonexistent_route_returns_404_with_error_body() {
    let app = router(test_state());

    let response = app
        .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let body_str = std::str::from_utf8(&body).unwrap();
    assert!(body_str.contains("\"error\""));
}

#[tokio::test]
async fn pause_then_resume_round_trips_through_status() {
    let app = router(test_state());

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/pause").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert!(std::str::from_utf8(&body).unwrap().contains("\"paused\":true"));

    let response = app
        .oneshot(Request::builder().uri("/resume").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert!(std::str::from_utf8(&body).unwrap().contains("\"paused\":false"));
}

#[tokio::test]
async fn mode_post_switches_session_mode() {
    let app = router(test_state());

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/mode")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"mode":"dictation"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert!(std::str::from_utf8(&body).unwrap().contains("\"mode\":\"dictation\""));
}

#[tokio::test]
async fn cancel_on_empty_pending_is_a_harmless_no_op() {
    let app = router(test_state());

    let response = app
        .oneshot(Request::builder().method("POST").uri("/cancel").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert!(std::str::from_utf8(&body).unwrap().contains("\"counters\""));
}
