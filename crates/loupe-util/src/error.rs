//! Error types for loupe

use thiserror::Error;

/// Core error type for loupe operations
#[derive(Debug, Error)]
pub enum LoupeError {
    #[error("Debug controller already running")]
    AlreadyRunning,

    #[error("Debug controller not running")]
    NotRunning,

    #[error("Debug controller task ended unexpectedly: {0}")]
    ControllerGone(String),

    #[error("Tracing initialization failed: {0}")]
    TracingInit(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LoupeError {
    pub fn controller_gone(msg: impl Into<String>) -> Self {
        Self::ControllerGone(msg.into())
    }

    pub fn tracing_init(msg: impl Into<String>) -> Self {
        Self::TracingInit(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Lifecycle misuse is recoverable: the caller asked for a state the
    /// controller is already in.
    pub fn is_lifecycle_misuse(&self) -> bool {
        matches!(self, Self::AlreadyRunning | Self::NotRunning)
    }
}

pub type Result<T> = std::result::Result<T, LoupeError>;
