//! Resolved settings for the debug controller and its logger

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::{
    DEBUG_TIMER_ENV, DEFAULT_DEBUG_TIMER_MINUTES, DEFAULT_LOG_FILTER, LOG_FILTER_ENV,
    LOG_FORMAT_ENV, MAX_DEBUG_TIMER_MINUTES,
};

/// Default idle timeout before debug mode reverts
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(DEFAULT_DEBUG_TIMER_MINUTES * 60);

/// Output format for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line
    #[default]
    Json,
    /// Multi-line human-readable output
    Pretty,
    /// Single-line human-readable output
    Compact,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Json => "json",
            Self::Pretty => "pretty",
            Self::Compact => "compact",
        };
        f.write_str(s)
    }
}

/// Settings resolved from the environment at setup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Name used for lines logged by shared components
    pub common_name: String,

    /// Idle period after which debug mode reverts
    pub idle_timeout: Duration,

    /// Log line format
    pub log_format: LogFormat,

    /// Tracing filter directives
    pub log_filter: String,
}

impl Settings {
    /// Settings with every value at its default
    pub fn new(common_name: impl Into<String>) -> Self {
        Self {
            common_name: common_name.into(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            log_format: LogFormat::default(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }

    /// Resolve settings from an environment map
    pub fn from_env_map(common_name: impl Into<String>, envs: &HashMap<String, String>) -> Self {
        let idle_timeout = parse_idle_timeout(envs.get(DEBUG_TIMER_ENV).map(String::as_str));

        let log_format = match envs.get(LOG_FORMAT_ENV) {
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                debug!(error = %e, "Falling back to JSON log format");
                LogFormat::default()
            }),
            None => LogFormat::default(),
        };

        let log_filter = envs
            .get(LOG_FILTER_ENV)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_LOG_FILTER)
            .to_string();

        Self {
            common_name: common_name.into(),
            idle_timeout,
            log_format,
            log_filter,
        }
    }

    /// Resolve settings from the process environment
    pub fn from_process_env(common_name: impl Into<String>) -> Self {
        let envs: HashMap<String, String> = std::env::vars().collect();
        Self::from_env_map(common_name, &envs)
    }

    /// Override the idle timeout with a minute count, applying the same
    /// fallback rules as the environment key.
    pub fn with_idle_minutes(mut self, minutes: i64) -> Self {
        self.idle_timeout = idle_timeout_from_minutes(minutes);
        self
    }

    pub fn with_log_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }
}

/// Parse the idle timeout from the raw `debugtimer` value.
///
/// Missing, empty, non-numeric and non-positive values yield the default.
pub fn parse_idle_timeout(raw: Option<&str>) -> Duration {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return DEFAULT_IDLE_TIMEOUT;
    };

    match raw.parse::<i64>() {
        Ok(minutes) => idle_timeout_from_minutes(minutes),
        Err(e) => {
            debug!(value = raw, error = %e, "Invalid debug timer, using default");
            DEFAULT_IDLE_TIMEOUT
        }
    }
}

fn idle_timeout_from_minutes(minutes: i64) -> Duration {
    if minutes <= 0 {
        debug!(minutes, "Non-positive debug timer, using default");
        return DEFAULT_IDLE_TIMEOUT;
    }

    let minutes = minutes as u64;
    if minutes > MAX_DEBUG_TIMER_MINUTES {
        debug!(minutes, max = MAX_DEBUG_TIMER_MINUTES, "Debug timer too large, clamping");
        return Duration::from_secs(MAX_DEBUG_TIMER_MINUTES * 60);
    }
    Duration::from_secs(minutes * 60)
}
