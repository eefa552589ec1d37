//! Logger facade for services sharing one process
//!
//! Lines are emitted through `tracing` under the `loupe::service` target
//! with the originating service in the `service` field. Debug lines are
//! gated by a [`DebugGate`](loupe_core::DebugGate), normally the
//! [`DebugController`](loupe_core::DebugController), rather than by the
//! subscriber's filter.

mod init;
mod logger;

pub use init::*;
pub use logger::*;

/// Target for every line logged through [`Logger`]
pub const SERVICE_TARGET: &str = "loupe::service";
