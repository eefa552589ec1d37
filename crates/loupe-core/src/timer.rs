//! Idle timer owned by the controller loop

use chrono::{DateTime, Local};
use std::time::Duration;
use tokio::time::Instant;

/// Observable state of the idle timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    /// No countdown in progress
    Disarmed,
    /// Counting down to `deadline`
    Armed {
        /// Monotonic deadline (for enforcement)
        deadline: Instant,
        /// Wall-clock deadline (for display)
        expires_at: DateTime<Local>,
    },
}

impl TimerState {
    pub fn is_armed(&self) -> bool {
        matches!(self, Self::Armed { .. })
    }

    /// Time left before expiry, or None when disarmed
    pub fn remaining(&self) -> Option<Duration> {
        match self {
            Self::Disarmed => None,
            Self::Armed { deadline, .. } => {
                Some(deadline.saturating_duration_since(Instant::now()))
            }
        }
    }
}

/// Deadline used when the idle timeout does not fit the monotonic clock
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Restartable, stoppable countdown
#[derive(Debug)]
pub struct IdleTimer {
    duration: Duration,
    state: TimerState,
}

impl IdleTimer {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            state: TimerState::Disarmed,
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn is_armed(&self) -> bool {
        self.state.is_armed()
    }

    /// Monotonic deadline, if armed
    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            TimerState::Disarmed => None,
            TimerState::Armed { deadline, .. } => Some(deadline),
        }
    }

    /// Start a full countdown, discarding whatever was left of the previous one.
    /// Returns the wall-clock deadline.
    pub fn arm(&mut self) -> DateTime<Local> {
        let now = Instant::now();
        let deadline = now
            .checked_add(self.duration)
            .unwrap_or_else(|| now + FAR_FUTURE);
        let expires_at = loupe_util::deadline_after(self.duration);
        self.state = TimerState::Armed {
            deadline,
            expires_at,
        };
        expires_at
    }

    /// Stop the countdown. Returns true if it was armed.
    pub fn disarm(&mut self) -> bool {
        let was_armed = self.is_armed();
        self.state = TimerState::Disarmed;
        was_armed
    }

}

/// Resolve at `deadline`, or never when there is none.
pub(crate) async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}
