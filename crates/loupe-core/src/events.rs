//! Transition events emitted by the controller loop

use chrono::{DateTime, Local};
use loupe_util::ServiceName;
use serde::Serialize;

/// Events emitted by the debug controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DebugEvent {
    /// Controller loop started
    Started,

    /// Debug mode was turned on and the idle timer (re)armed
    Enabled {
        /// None when the global override was set
        service: Option<ServiceName>,
        expires_at: DateTime<Local>,
    },

    /// Debug mode fully quiesced and the idle timer disarmed
    Disabled {
        /// None when everything was turned off at once
        service: Option<ServiceName>,
    },

    /// Idle timer ran out and every flag was reset
    Expired {
        /// Flags that were on at expiry, the global override included
        cleared: usize,
    },

    /// Controller loop stopped
    Stopped,
}

impl DebugEvent {
    /// Plain-text description for the log sink
    pub fn message(&self) -> &'static str {
        match self {
            Self::Started => "Debug controller started",
            Self::Enabled { .. } => "Debug mode enabled",
            Self::Disabled { .. } => "Debug mode disabled",
            Self::Expired { .. } => "Debug timer expired",
            Self::Stopped => "Debug controller stopped",
        }
    }
}
