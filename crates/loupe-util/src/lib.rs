//! Shared utilities for loupe
//!
//! This crate provides:
//! - The `ServiceName` identifier
//! - Wall-clock helpers for reporting idle deadlines
//! - Error types

mod error;
mod ids;
mod time;

pub use error::*;
pub use ids::*;
pub use time::*;
