//! Configuration for loupe
//!
//! Settings are read once at setup from an environment-style map:
//! - `debugtimer`: idle minutes before debug mode reverts (default 10)
//! - `LOUPE_LOG_FORMAT`: `json`, `pretty` or `compact` (default `json`)
//! - `RUST_LOG`: tracing filter directives (default `info`)
//!
//! Malformed values never fail setup; the default is substituted.

mod settings;

pub use settings::*;

/// Environment key holding the idle timeout in minutes
pub const DEBUG_TIMER_ENV: &str = "debugtimer";

/// Environment key selecting the log line format
pub const LOG_FORMAT_ENV: &str = "LOUPE_LOG_FORMAT";

/// Environment key holding tracing filter directives
pub const LOG_FILTER_ENV: &str = "RUST_LOG";

/// Default idle timeout in minutes
pub const DEFAULT_DEBUG_TIMER_MINUTES: u64 = 10;

/// Largest accepted idle timeout in minutes (one year)
pub const MAX_DEBUG_TIMER_MINUTES: u64 = 525_600;

/// Default tracing filter
pub const DEFAULT_LOG_FILTER: &str = "info";
