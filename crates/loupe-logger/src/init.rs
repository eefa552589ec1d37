//! Global tracing subscriber setup

use loupe_config::{LogFormat, Settings, DEFAULT_LOG_FILTER};
use loupe_util::{LoupeError, Result};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

use crate::SERVICE_TARGET;

/// Build the filter for `settings`.
///
/// Service lines always pass at DEBUG; whether they are produced at all is
/// up to the debug gate.
pub fn build_filter(settings: &Settings) -> Result<EnvFilter> {
    resolve_filter(settings).map(|(filter, _)| filter)
}

/// The filter plus the parse error when the configured filter was rejected
/// and the default used instead.
fn resolve_filter(settings: &Settings) -> Result<(EnvFilter, Option<String>)> {
    let (filter, rejected) = match EnvFilter::try_new(&settings.log_filter) {
        Ok(filter) => (filter, None),
        Err(e) => (EnvFilter::new(DEFAULT_LOG_FILTER), Some(e.to_string())),
    };

    let directive = format!("{SERVICE_TARGET}=debug")
        .parse::<Directive>()
        .map_err(|e| LoupeError::tracing_init(format!("service directive: {e}")))?;

    Ok((filter.add_directive(directive), rejected))
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_tracing(settings: &Settings) -> Result<()> {
    let (filter, rejected) = resolve_filter(settings)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let result = match settings.log_format {
        LogFormat::Json => builder.json().flatten_event(true).try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    };

    result.map_err(|e| LoupeError::tracing_init(e.to_string()))?;

    if let Some(error) = rejected {
        tracing::warn!(
            filter = %settings.log_filter,
            error = %error,
            fallback = DEFAULT_LOG_FILTER,
            "Invalid log filter, using default"
        );
    }

    tracing::debug!(
        common_name = %settings.common_name,
        format = %settings.log_format,
        filter = %settings.log_filter,
        "Logging setup complete"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_keeps_service_target_at_debug() {
        let settings = Settings::new("common");
        let filter = build_filter(&settings).unwrap();
        let rendered = filter.to_string().to_ascii_lowercase();
        assert!(rendered.contains("loupe::service=debug"), "{rendered}");
        assert!(rendered.contains("info"), "{rendered}");
    }

    #[test]
    fn invalid_filter_falls_back() {
        let mut settings = Settings::new("common");
        settings.log_filter = "loupe=verbose".into();
        assert!(build_filter(&settings).is_ok());

        let (filter, rejected) = resolve_filter(&settings).unwrap();
        assert!(rejected.is_some());
        assert!(filter.to_string().to_ascii_lowercase().contains("info"));
    }

    #[test]
    fn valid_filter_is_not_rejected() {
        let mut settings = Settings::new("common");
        settings.log_filter = "warn,loupe=trace".into();
        let (filter, rejected) = resolve_filter(&settings).unwrap();
        assert_eq!(rejected, None);
        assert!(filter.to_string().contains("warn"));
    }
}
