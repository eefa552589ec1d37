//! Service-scoped logger

use loupe_config::Settings;
use loupe_core::{DebugController, DebugGate};
use loupe_util::{LoupeError, Result};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::SERVICE_TARGET;

/// Logger shared by every service in the process.
///
/// Lines without an explicit service are attributed to the common name.
/// Debug lines are dropped unless the gate reports debug enabled: the
/// global flag for common lines, global-or-service for service lines.
#[derive(Clone)]
pub struct Logger {
    common_name: String,
    gate: Arc<dyn DebugGate>,
    controller: Option<Arc<DebugController>>,
}

impl Logger {
    /// Logger gated by an arbitrary gate, with no controller to manage
    pub fn new(common_name: impl Into<String>, gate: Arc<dyn DebugGate>) -> Self {
        Self {
            common_name: common_name.into(),
            gate,
            controller: None,
        }
    }

    /// Logger that owns a fresh controller built from `settings`.
    /// The controller is stopped until [`Logger::start`].
    pub fn configure(settings: &Settings) -> Self {
        let controller = Arc::new(DebugController::from_settings(settings));
        Self::with_controller(settings.common_name.clone(), controller)
    }

    pub fn with_controller(common_name: impl Into<String>, controller: Arc<DebugController>) -> Self {
        Self {
            common_name: common_name.into(),
            gate: controller.clone(),
            controller: Some(controller),
        }
    }

    pub fn common_name(&self) -> &str {
        &self.common_name
    }

    pub fn controller(&self) -> Option<&Arc<DebugController>> {
        self.controller.as_ref()
    }

    fn require_controller(&self) -> Result<&Arc<DebugController>> {
        self.controller
            .as_ref()
            .ok_or_else(|| LoupeError::internal("logger has no debug controller"))
    }

    pub async fn start(&self) -> Result<()> {
        self.require_controller()?.start().await
    }

    pub async fn stop(&self) -> Result<()> {
        self.require_controller()?.stop().await
    }

    /// Register a service for debug control. False if already registered
    /// or if this logger has no controller.
    pub fn register_service(&self, name: &str) -> bool {
        self.controller
            .as_ref()
            .is_some_and(|c| c.register_service(name))
    }

    pub fn enable_debug(&self, service: Option<&str>) -> bool {
        self.controller
            .as_ref()
            .is_some_and(|c| c.enable_debug(service))
    }

    pub fn disable_debug(&self, service: Option<&str>) -> bool {
        self.controller
            .as_ref()
            .is_some_and(|c| c.disable_debug(service))
    }

    pub fn is_debug_enabled(&self, service: Option<&str>) -> bool {
        self.gate.is_debug_enabled(service)
    }

    /// Log a debug line under the common name. Returns whether it was emitted.
    pub fn debug(&self, content: &str) -> bool {
        if !self.gate.is_debug_enabled(None) {
            return false;
        }
        debug!(target: SERVICE_TARGET, service = %self.common_name, "{content}");
        true
    }

    pub fn info(&self, content: &str) {
        info!(target: SERVICE_TARGET, service = %self.common_name, "{content}");
    }

    pub fn warn(&self, content: &str) {
        warn!(target: SERVICE_TARGET, service = %self.common_name, "{content}");
    }

    pub fn error(&self, err: &dyn fmt::Display) {
        error!(target: SERVICE_TARGET, service = %self.common_name, "{err}");
    }

    /// `logger.format_error(format_args!("retry {} failed", n))`
    pub fn format_error(&self, args: fmt::Arguments<'_>) {
        error!(target: SERVICE_TARGET, service = %self.common_name, "{args}");
    }

    /// Logs at ERROR with `severity = "fatal"`; the process keeps running.
    pub fn fatal(&self, content: &str) {
        error!(
            target: SERVICE_TARGET,
            service = %self.common_name,
            severity = "fatal",
            "{content}"
        );
    }

    /// Log a debug line for `service`. Returns whether it was emitted.
    pub fn debug_service(&self, service: &str, content: &str) -> bool {
        if !self.gate.is_debug_enabled(Some(service)) {
            return false;
        }
        debug!(target: SERVICE_TARGET, service, "{content}");
        true
    }

    pub fn info_service(&self, service: &str, content: &str) {
        info!(target: SERVICE_TARGET, service, "{content}");
    }

    pub fn warn_service(&self, service: &str, content: &str) {
        warn!(target: SERVICE_TARGET, service, "{content}");
    }

    pub fn error_service(&self, service: &str, err: &dyn fmt::Display) {
        error!(target: SERVICE_TARGET, service, "{err}");
    }

    pub fn format_error_service(&self, service: &str, args: fmt::Arguments<'_>) {
        error!(target: SERVICE_TARGET, service, "{args}");
    }

    pub fn fatal_service(&self, service: &str, content: &str) {
        error!(target: SERVICE_TARGET, service, severity = "fatal", "{content}");
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("common_name", &self.common_name)
            .field("controller", &self.controller)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loupe_core::FixedGate;
    use std::collections::HashSet;
    use std::io;
    use std::sync::Mutex;
    use std::time::Duration;
    use tracing_subscriber::fmt::MakeWriter;

    /// Gate that enables an explicit set of services
    struct SetGate {
        global: bool,
        services: HashSet<String>,
    }

    impl DebugGate for SetGate {
        fn is_debug_enabled(&self, service: Option<&str>) -> bool {
            match service {
                None => self.global,
                Some(name) => self.services.contains(name),
            }
        }
    }

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Capture {
        type Writer = Capture;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    impl Capture {
        fn lines(&self) -> Vec<serde_json::Value> {
            let bytes = self.0.lock().unwrap();
            String::from_utf8_lossy(&bytes)
                .lines()
                .map(|line| serde_json::from_str(line).unwrap())
                .collect()
        }
    }

    fn capture<F: FnOnce()>(f: F) -> Vec<serde_json::Value> {
        let writer = Capture::default();
        let subscriber = tracing_subscriber::fmt()
            .json()
            .flatten_event(true)
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        writer.lines()
    }

    #[test]
    fn debug_suppressed_when_gate_closed() {
        let logger = Logger::new("common", Arc::new(FixedGate(false)));

        let lines = capture(|| {
            assert!(!logger.debug("hidden"));
            assert!(!logger.debug_service("svc-a", "hidden"));
        });
        assert!(lines.is_empty());
    }

    #[test]
    fn debug_service_follows_gate() {
        let gate = SetGate {
            global: false,
            services: ["svc-a".to_string()].into_iter().collect(),
        };
        let logger = Logger::new("common", Arc::new(gate));

        let lines = capture(|| {
            assert!(logger.debug_service("svc-a", "visible"));
            assert!(!logger.debug_service("svc-b", "hidden"));
            assert!(!logger.debug("hidden"));
        });

        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["service"], "svc-a");
        assert_eq!(lines[0]["message"], "visible");
        assert_eq!(lines[0]["level"], "DEBUG");
        assert_eq!(lines[0]["target"], SERVICE_TARGET);
    }

    #[test]
    fn non_debug_levels_always_emit() {
        let logger = Logger::new("common", Arc::new(FixedGate(false)));

        let lines = capture(|| {
            logger.info("up");
            logger.warn_service("svc-a", "slow");
            logger.error(&"boom");
            logger.format_error_service("svc-b", format_args!("retry {} failed", 3));
        });

        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0]["service"], "common");
        assert_eq!(lines[0]["level"], "INFO");
        assert_eq!(lines[1]["level"], "WARN");
        assert_eq!(lines[2]["message"], "boom");
        assert_eq!(lines[3]["message"], "retry 3 failed");
        assert_eq!(lines[3]["service"], "svc-b");
    }

    #[test]
    fn fatal_is_tagged_and_not_fatal() {
        let logger = Logger::new("common", Arc::new(FixedGate(true)));

        let lines = capture(|| {
            logger.fatal("disk gone");
            logger.fatal_service("svc-a", "lost broker");
        });

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["level"], "ERROR");
        assert_eq!(lines[0]["severity"], "fatal");
        assert_eq!(lines[1]["service"], "svc-a");
    }

    #[test]
    fn logger_without_controller_cannot_toggle() {
        let logger = Logger::new("common", Arc::new(FixedGate(true)));
        assert!(!logger.register_service("svc-a"));
        assert!(!logger.enable_debug(None));
        assert!(logger.is_debug_enabled(Some("anything")));
    }

    #[tokio::test]
    async fn logger_without_controller_cannot_start() {
        let logger = Logger::new("common", Arc::new(FixedGate(false)));
        assert!(matches!(logger.start().await, Err(LoupeError::Internal(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn configured_logger_gates_on_controller() {
        let settings = Settings::new("common");
        let logger = Logger::configure(&settings);
        logger.start().await.unwrap();

        assert!(logger.register_service("svc-a"));
        assert!(!logger.debug_service("svc-a", "before"));

        assert!(logger.enable_debug(Some("svc-a")));
        assert!(logger.debug_service("svc-a", "during"));
        assert!(!logger.debug("common lines follow the global flag"));

        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
        tokio::time::advance(settings.idle_timeout + Duration::from_secs(1)).await;
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
        assert!(!logger.debug_service("svc-a", "after expiry"));

        logger.stop().await.unwrap();
    }
}
