//! Debug registry and idle-expiry controller for loupe
//!
//! This crate is the heart of loupe, containing:
//! - The registry of per-service debug flags plus the global override
//! - The idle timer (Disarmed <-> Armed, expiring back to Disarmed)
//! - The controller loop that owns the timer and linearizes activity
//! - Transition events for the log sink

mod controller;
mod events;
mod gate;
mod registry;
mod timer;

pub use controller::*;
pub use events::*;
pub use gate::*;
pub use registry::*;
pub use timer::*;
