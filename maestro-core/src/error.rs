use thiserror::Error;

/// All errors produced by maestro-core.
///
/// Variants map onto the error *kinds* the session coordinator distinguishes
/// between fatal (surface + stop) and retryable/absorbed failures; see
/// `session::SessionCoordinator` for how each kind is handled.
#[derive(Debug, Error)]
pub enum Error {
    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default input device found")]
    NoDefaultInputDevice,

    #[error("ring buffer is full — pipeline cannot keep up")]
    RingBufferFull,

    #[error("provider authentication failed: {0}")]
    ProviderAuthFailed(String),

    #[error("provider network error: {0}")]
    ProviderTransient(String),

    #[error("provider returned a malformed response: {0}")]
    SchemaViolation(String),

    #[error("provider call timed out")]
    Timeout,

    #[error("engine is already running")]
    AlreadyRunning,

    #[error("engine is not running")]
    NotRunning,

    #[error("calibration session is not active")]
    CalibrationNotActive,

    #[error("model file not found: {path}")]
    ModelNotFound { path: std::path::PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
