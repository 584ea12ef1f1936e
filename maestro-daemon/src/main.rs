//! Maestro daemon entry point — a headless process wiring together the
//! speech-recognition core (`maestro-core`) and the HTTP control surface
//! (§6). No Tauri, no tray, no desktop shell: the UI is an external
//! collaborator that only consumes files and this HTTP surface.

use std::sync::Arc;

use maestro_daemon::config::{DaemonConfig, ProviderKind};
use maestro_daemon::error::Result;
use maestro_daemon::http;
use maestro_core::model::Mode;
use maestro_core::provider::batch_local::{BatchLocal, ModelHandle};
use maestro_core::provider::stub::StubAcousticModel;
use maestro_core::provider::streaming_local::StreamingLocal;
use maestro_core::provider::Provider;
use maestro_core::session::{SessionCoordinator, SessionPaths};
use maestro_core::speaking::{FileSpeakingState, SpeakingState};
use tracing::info;

/// Build a fresh `Provider` per the configured backend (§6 `ASR_PROVIDER`).
///
/// The acoustic model itself is an external collaborator (§4.4) — this
/// daemon only wires the session/error-handling shape around it, the same
/// division the teacher draws between `DictumEngine` and `inference::*`.
/// No real model weights ship with this crate, so the local branches
/// currently resolve to `StubAcousticModel`; swapping in a real backend
/// means constructing it here instead.
fn build_provider_factory(
    kind: ProviderKind,
    speaking: Arc<dyn SpeakingState>,
) -> Arc<dyn Fn() -> Provider + Send + Sync> {
    match kind {
        ProviderKind::Local => {
            Arc::new(|| Provider::BatchLocal(BatchLocal::new(ModelHandle::new(StubAcousticModel::new()))))
        }
        ProviderKind::StreamingLocal => {
            Arc::new(|| Provider::StreamingLocal(StreamingLocal::new(ModelHandle::new(StubAcousticModel::new()))))
        }
        // `maestro-daemon` always depends on `maestro-core` with
        // `remote-provider` enabled (see Cargo.toml), so this module is
        // unconditionally available — no local `#[cfg]` needed here.
        ProviderKind::StreamingRemote => Arc::new(move || {
            let config = maestro_core::provider::streaming_remote::StreamingRemoteConfig {
                ws_url: std::env::var("MAESTRO_REMOTE_ENDPOINT")
                    .unwrap_or_else(|_| "ws://127.0.0.1:9000/asr".to_string()),
                api_key: std::env::var("MAESTRO_REMOTE_API_KEY").unwrap_or_default(),
            };
            Provider::StreamingRemote(maestro_core::provider::streaming_remote::StreamingRemote::new(
                config,
                Arc::clone(&speaking),
            ))
        }),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "maestro=info".parse().unwrap()),
        )
        .init();

    info!("maestro-daemon starting");

    let cfg = DaemonConfig::from_env();
    std::fs::create_dir_all(&cfg.profiles_dir).ok();

    let paths = SessionPaths {
        command_file: cfg.command_file.clone(),
        status_file: cfg.status_file.clone(),
        vocab_file: cfg.vocab_file.clone(),
    };

    let speaking: Arc<dyn SpeakingState> = Arc::new(FileSpeakingState::new(
        cfg.speaking_flag_file.clone(),
        cfg.barge_in_file.clone(),
    ));

    let provider_factory = build_provider_factory(cfg.provider, Arc::clone(&speaking));

    let session = Arc::new(SessionCoordinator::new(
        paths,
        cfg.engine.clone(),
        cfg.device_preference.clone(),
        speaking,
        provider_factory,
        Mode::Command,
        cfg.profile_name.clone(),
    ));

    let app = http::router(Arc::clone(&session));

    info!(bind = %cfg.http_bind, "control surface listening");
    let listener = tokio::net::TcpListener::bind(&cfg.http_bind).await?;

    let shutdown_session = Arc::clone(&session);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received, stopping session");
            if let Err(err) = shutdown_session.stop() {
                tracing::warn!(error = %err, "error stopping session during shutdown");
            }
        })
        .await?;

    Ok(())
}
