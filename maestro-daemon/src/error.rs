use thiserror::Error;

/// Daemon-level errors — process wiring and the HTTP surface. Session/engine
/// failures arrive wrapped in `Other` via `maestro_core::Error`'s own
/// `#[from] anyhow::Error` catch-all.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("session error: {0}")]
    Session(#[from] maestro_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, DaemonError>;
