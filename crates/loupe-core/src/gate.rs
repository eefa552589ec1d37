//! Query seam between the controller and the log sink

/// Answers whether debug lines should be emitted.
///
/// `None` asks about the process as a whole (the global override); a name
/// asks about one service.
pub trait DebugGate: Send + Sync {
    fn is_debug_enabled(&self, service: Option<&str>) -> bool;
}

/// Gate with a fixed answer, for sinks that run without a controller
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedGate(pub bool);

impl DebugGate for FixedGate {
    fn is_debug_enabled(&self, _service: Option<&str>) -> bool {
        self.0
    }
}
