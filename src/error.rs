use thiserror::Error;

/// Errors surfaced by the engine to its control-thread callers.
///
/// Nothing here is fatal: an `OutputUnavailable` or `ResumeFailed` leaves the
/// controller in a state where the same call can simply be retried.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("audio output unavailable: {0}")]
    OutputUnavailable(String),
    #[error("audio output could not be started: {0}")]
    ResumeFailed(String),
    #[error("engine is not initialized")]
    NotInitialized,
    #[error("engine has been disposed")]
    Disposed,
    #[error("parameter event queue is full")]
    QueueFull,
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("invalid preset data: {0}")]
    Preset(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
