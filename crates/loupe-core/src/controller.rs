//! Debug controller: public API and the loop that owns the idle timer
//!
//! Callers mutate the registry under its lock and then hand an activity
//! signal to the loop over an unbounded channel, so toggling never blocks.
//! The loop is the only code that arms, disarms or expires the timer:
//!
//! - turn-on: re-arm with the full idle timeout if anything is on
//! - turn-off of one service: disarm only once nothing is on; a partial
//!   disable leaves the running countdown alone
//! - turn-off of everything: disarm
//! - expiry: reset every flag and disarm

use chrono::{DateTime, Local};
use loupe_config::Settings;
use loupe_util::{LoupeError, Result, ServiceName};
use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::timer::sleep_until_deadline;
use crate::{DebugEvent, DebugGate, DebugRegistry, IdleTimer, RegistrySnapshot, TimerState};

/// Capacity of the transition event channel
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Lifecycle state of the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Stopped,
    Running(TimerState),
}

impl ControllerState {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running(_))
    }

    /// Timer state while running, None when stopped
    pub fn timer(&self) -> Option<TimerState> {
        match self {
            Self::Stopped => None,
            Self::Running(timer) => Some(*timer),
        }
    }
}

/// Point-in-time status for display
#[derive(Debug, Clone, Serialize)]
pub struct DebugStatus {
    pub running: bool,
    pub idle_timeout_secs: u64,
    pub timer_armed: bool,
    pub expires_at: Option<DateTime<Local>>,
    pub remaining_secs: Option<u64>,
    pub registry: RegistrySnapshot,
}

/// Signal sent to the loop after a registry mutation has committed
#[derive(Debug, Clone, PartialEq, Eq)]
enum Activity {
    /// Something was enabled (None: the global override)
    TurnOn { service: Option<ServiceName> },
    /// One service was disabled
    TurnOff { service: ServiceName },
    /// Everything was disabled
    TurnOffAll,
}

struct RunningLoop {
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// State shared between the controller handle and its loop task
struct Shared {
    registry: DebugRegistry,
    idle_timeout: Duration,
    event_tx: broadcast::Sender<DebugEvent>,
    state_tx: watch::Sender<ControllerState>,
}

impl Shared {
    fn emit(&self, event: DebugEvent) {
        // No subscribers is fine; the trace line is the primary sink
        let _ = self.event_tx.send(event);
    }

    fn publish(&self, timer: &IdleTimer) {
        self.state_tx
            .send_replace(ControllerState::Running(timer.state()));
    }

    fn handle_activity(&self, timer: &mut IdleTimer, activity: Activity) {
        match activity {
            Activity::TurnOn { service } => {
                if self.registry.any_enabled() {
                    let expires_at = timer.arm();
                    info!(
                        service = service.as_ref().map(ServiceName::as_str),
                        idle_timeout_secs = self.idle_timeout.as_secs(),
                        expires_at = %loupe_util::format_datetime_full(&expires_at),
                        "Debug mode enabled"
                    );
                    self.emit(DebugEvent::Enabled {
                        service,
                        expires_at,
                    });
                } else if timer.disarm() {
                    // Raced with an expiry or a disable; nothing is on any more
                    info!(
                        service = service.as_ref().map(ServiceName::as_str),
                        "Debug mode disabled"
                    );
                    self.emit(DebugEvent::Disabled { service });
                } else {
                    debug!(
                        service = service.as_ref().map(ServiceName::as_str),
                        "Enable request left no flag on"
                    );
                }
            }

            Activity::TurnOff { service } => {
                if self.registry.any_enabled() {
                    debug!(
                        service = %service,
                        "Other flags still on, idle timer left running"
                    );
                } else if timer.disarm() {
                    info!(service = %service, "Debug mode disabled");
                    self.emit(DebugEvent::Disabled {
                        service: Some(service),
                    });
                }
            }

            Activity::TurnOffAll => {
                if timer.disarm() {
                    info!("Debug mode disabled");
                    self.emit(DebugEvent::Disabled { service: None });
                } else {
                    debug!("Disable-all with idle timer already disarmed");
                }
            }
        }
    }

    fn expire(&self, timer: &mut IdleTimer) {
        let cleared = self.registry.expire();
        timer.disarm();
        info!(
            cleared,
            idle_timeout_secs = self.idle_timeout.as_secs(),
            "Debug timer expired"
        );
        self.emit(DebugEvent::Expired { cleared });
    }

    async fn run(
        self: Arc<Self>,
        mut activity_rx: mpsc::UnboundedReceiver<Activity>,
        mut stop_rx: oneshot::Receiver<()>,
    ) {
        let mut timer = IdleTimer::new(self.idle_timeout);

        // Flags can be set while the loop is stopped; honor them now
        if self.registry.any_enabled() {
            let expires_at = timer.arm();
            info!(
                expires_at = %loupe_util::format_datetime_full(&expires_at),
                "Debug mode enabled"
            );
            self.emit(DebugEvent::Enabled {
                service: None,
                expires_at,
            });
        }
        self.publish(&timer);

        loop {
            let deadline = timer.deadline();

            tokio::select! {
                biased;

                // Stop requested, or the controller handle was dropped
                _ = &mut stop_rx => break,

                Some(activity) = activity_rx.recv() => {
                    self.handle_activity(&mut timer, activity);
                }

                _ = sleep_until_deadline(deadline) => {
                    self.expire(&mut timer);
                }
            }

            self.publish(&timer);
        }

        if timer.disarm() {
            debug!("Idle timer cancelled by stop");
        }
    }
}

/// Runtime debug-verbosity controller for a set of named services
pub struct DebugController {
    shared: Arc<Shared>,
    /// Present only while the loop runs
    activity_tx: RwLock<Option<mpsc::UnboundedSender<Activity>>>,
    running: Mutex<Option<RunningLoop>>,
    state_rx: watch::Receiver<ControllerState>,
}

impl DebugController {
    /// Create a stopped controller with an empty registry
    pub fn new(idle_timeout: Duration) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (state_tx, state_rx) = watch::channel(ControllerState::Stopped);

        Self {
            shared: Arc::new(Shared {
                registry: DebugRegistry::new(),
                idle_timeout,
                event_tx,
                state_tx,
            }),
            activity_tx: RwLock::new(None),
            running: Mutex::new(None),
            state_rx,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.idle_timeout)
    }

    pub fn idle_timeout(&self) -> Duration {
        self.shared.idle_timeout
    }

    /// Spawn the controller loop on the current tokio runtime
    pub async fn start(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(LoupeError::AlreadyRunning);
        }

        let (activity_tx, activity_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel();

        self.shared
            .state_tx
            .send_replace(ControllerState::Running(TimerState::Disarmed));
        *self.activity_sender() = Some(activity_tx);

        let handle = tokio::spawn(self.shared.clone().run(activity_rx, stop_rx));
        *running = Some(RunningLoop { stop_tx, handle });

        info!(
            idle_timeout_secs = self.shared.idle_timeout.as_secs(),
            "Debug controller started"
        );
        self.shared.emit(DebugEvent::Started);

        Ok(())
    }

    /// Stop the loop, wait for it to exit, then clear every flag and
    /// registration.
    pub async fn stop(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        let Some(RunningLoop { stop_tx, handle }) = running.take() else {
            return Err(LoupeError::NotRunning);
        };

        // Signals from here on are dropped; the loop is going away
        self.activity_sender().take();

        // The loop may already be gone if its task panicked
        let _ = stop_tx.send(());
        let joined = handle.await;

        self.shared.registry.clear();
        self.shared.state_tx.send_replace(ControllerState::Stopped);

        if let Err(e) = joined {
            warn!(error = %e, "Debug controller task ended abnormally");
            return Err(LoupeError::controller_gone(e.to_string()));
        }

        info!("Debug controller stopped");
        self.shared.emit(DebugEvent::Stopped);

        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    pub fn state(&self) -> ControllerState {
        *self.state_rx.borrow()
    }

    /// Receiver that observes every controller state change
    pub fn watch_state(&self) -> watch::Receiver<ControllerState> {
        self.state_rx.clone()
    }

    /// Subscribe to transition events
    pub fn subscribe(&self) -> broadcast::Receiver<DebugEvent> {
        self.shared.event_tx.subscribe()
    }

    /// Register a service with debug off. Idempotent; returns false if the
    /// service was already registered.
    pub fn register_service(&self, name: &str) -> bool {
        let inserted = self.shared.registry.register(name);
        if inserted {
            debug!(service = name, "Service registered for debug control");
        }
        inserted
    }

    /// Turn debug on for one registered service, or globally when `service`
    /// is None. Returns false if the named service is not registered; the
    /// idle timer still sees the activity.
    pub fn enable_debug(&self, service: Option<&str>) -> bool {
        let applied = match service {
            Some(name) => self.shared.registry.enable(name),
            None => {
                self.shared.registry.enable_all();
                true
            }
        };

        if !applied {
            debug!(service, "Enable ignored for unregistered service");
        }

        self.signal(Activity::TurnOn {
            service: service.map(ServiceName::from),
        });
        applied
    }

    /// Turn debug off for one registered service, or everything when
    /// `service` is None. Returns false if the named service is not
    /// registered; the idle timer still sees the activity.
    pub fn disable_debug(&self, service: Option<&str>) -> bool {
        let (applied, activity) = match service {
            Some(name) => (
                self.shared.registry.disable(name),
                Activity::TurnOff {
                    service: ServiceName::from(name),
                },
            ),
            None => {
                self.shared.registry.disable_all();
                (true, Activity::TurnOffAll)
            }
        };

        if !applied {
            debug!(service, "Disable ignored for unregistered service");
        }

        self.signal(activity);
        applied
    }

    /// Create or update a service's flag directly
    pub fn update_service(&self, name: &str, enabled: bool) {
        self.shared.registry.set_service(name, enabled);

        let activity = if enabled {
            Activity::TurnOn {
                service: Some(ServiceName::from(name)),
            }
        } else {
            Activity::TurnOff {
                service: ServiceName::from(name),
            }
        };
        self.signal(activity);
    }

    /// Whether debug lines should be emitted, globally (None) or for a service.
    /// Never waits on the loop.
    pub fn is_debug_enabled(&self, service: Option<&str>) -> bool {
        self.shared.registry.query_effective(service)
    }

    /// The service's own flag
    pub fn service_flag(&self, name: &str) -> bool {
        self.shared.registry.query(name)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.shared.registry.exists(name)
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        self.shared.registry.snapshot()
    }

    pub fn status(&self) -> DebugStatus {
        let state = self.state();
        let timer = state.timer().unwrap_or(TimerState::Disarmed);
        let expires_at = match timer {
            TimerState::Armed { expires_at, .. } => Some(expires_at),
            TimerState::Disarmed => None,
        };

        DebugStatus {
            running: state.is_running(),
            idle_timeout_secs: self.shared.idle_timeout.as_secs(),
            timer_armed: timer.is_armed(),
            expires_at,
            remaining_secs: timer.remaining().map(|d| d.as_secs()),
            registry: self.snapshot(),
        }
    }

    fn activity_sender(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, Option<mpsc::UnboundedSender<Activity>>> {
        self.activity_tx
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn signal(&self, activity: Activity) {
        let sender = self
            .activity_tx
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        match sender.as_ref() {
            Some(tx) => {
                if tx.send(activity).is_err() {
                    debug!("Debug controller loop gone, activity dropped");
                }
            }
            None => debug!(?activity, "Debug controller stopped, activity dropped"),
        }
    }
}

impl DebugGate for DebugController {
    fn is_debug_enabled(&self, service: Option<&str>) -> bool {
        DebugController::is_debug_enabled(self, service)
    }
}

impl std::fmt::Debug for DebugController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugController")
            .field("idle_timeout", &self.shared.idle_timeout)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDLE: Duration = Duration::from_secs(60);

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_stop_lifecycle() {
        let controller = DebugController::new(IDLE);
        assert_eq!(controller.state(), ControllerState::Stopped);

        controller.start().await.unwrap();
        assert!(controller.is_running());
        assert!(matches!(
            controller.start().await,
            Err(LoupeError::AlreadyRunning)
        ));

        controller.stop().await.unwrap();
        assert_eq!(controller.state(), ControllerState::Stopped);
        assert!(matches!(controller.stop().await, Err(LoupeError::NotRunning)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_enable_arms_timer() {
        let controller = DebugController::new(IDLE);
        controller.start().await.unwrap();
        controller.register_service("svc-a");

        assert!(controller.enable_debug(Some("svc-a")));
        settle().await;

        let timer = controller.state().timer().unwrap();
        assert!(timer.is_armed());
        assert_eq!(timer.remaining(), Some(IDLE));

        controller.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_enable_unregistered_leaves_timer_disarmed() {
        let controller = DebugController::new(IDLE);
        controller.start().await.unwrap();

        assert!(!controller.enable_debug(Some("ghost")));
        settle().await;

        assert_eq!(
            controller.state(),
            ControllerState::Running(TimerState::Disarmed)
        );
        assert!(!controller.is_debug_enabled(Some("ghost")));

        controller.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_quiesce_disarms() {
        let controller = DebugController::new(IDLE);
        controller.start().await.unwrap();
        controller.register_service("svc-a");
        controller.register_service("svc-b");

        controller.enable_debug(Some("svc-a"));
        controller.enable_debug(Some("svc-b"));
        controller.disable_debug(Some("svc-a"));
        settle().await;
        assert!(controller.state().timer().unwrap().is_armed());

        controller.disable_debug(Some("svc-b"));
        settle().await;
        assert_eq!(controller.state().timer(), Some(TimerState::Disarmed));

        controller.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_disable_all_disarms() {
        let controller = DebugController::new(IDLE);
        controller.start().await.unwrap();
        controller.register_service("svc-a");

        controller.enable_debug(None);
        settle().await;
        assert!(controller.is_debug_enabled(Some("svc-a")));
        assert!(controller.state().timer().unwrap().is_armed());

        controller.disable_debug(None);
        settle().await;
        assert!(!controller.is_debug_enabled(None));
        assert!(!controller.is_debug_enabled(Some("svc-a")));
        assert_eq!(controller.state().timer(), Some(TimerState::Disarmed));

        controller.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_service_signals_activity() {
        let controller = DebugController::new(IDLE);
        controller.start().await.unwrap();

        controller.update_service("svc-a", true);
        settle().await;
        assert!(controller.exists("svc-a"));
        assert!(controller.state().timer().unwrap().is_armed());

        controller.update_service("svc-a", false);
        settle().await;
        assert_eq!(controller.state().timer(), Some(TimerState::Disarmed));

        controller.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_flags_set_while_stopped_arm_on_start() {
        let controller = DebugController::new(IDLE);
        controller.register_service("svc-a");
        controller.enable_debug(Some("svc-a"));
        assert!(controller.is_debug_enabled(Some("svc-a")));

        controller.start().await.unwrap();
        settle().await;
        assert!(controller.state().timer().unwrap().is_armed());

        controller.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_broadcast() {
        let controller = DebugController::new(IDLE);
        let mut events = controller.subscribe();

        controller.start().await.unwrap();
        controller.register_service("svc-a");
        controller.enable_debug(Some("svc-a"));
        settle().await;

        tokio::time::advance(IDLE).await;
        settle().await;
        controller.stop().await.unwrap();

        assert_eq!(events.recv().await.unwrap(), DebugEvent::Started);
        assert!(matches!(
            events.recv().await.unwrap(),
            DebugEvent::Enabled { service: Some(ref s), .. } if s.as_str() == "svc-a"
        ));
        assert_eq!(
            events.recv().await.unwrap(),
            DebugEvent::Expired { cleared: 1 }
        );
        assert_eq!(events.recv().await.unwrap(), DebugEvent::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_reports_remaining() {
        let controller = DebugController::new(IDLE);
        controller.start().await.unwrap();
        controller.register_service("svc-a");
        controller.enable_debug(Some("svc-a"));
        settle().await;

        tokio::time::advance(Duration::from_secs(15)).await;
        let status = controller.status();
        assert!(status.running);
        assert!(status.timer_armed);
        assert_eq!(status.idle_timeout_secs, 60);
        assert_eq!(status.remaining_secs, Some(45));
        assert!(status.expires_at.is_some());
        assert_eq!(status.registry.services.len(), 1);

        controller.stop().await.unwrap();
        let status = controller.status();
        assert!(!status.running);
        assert!(!status.timer_armed);
        assert!(status.registry.services.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_controller_ends_loop() {
        let controller = DebugController::new(IDLE);
        let mut state = controller.watch_state();
        controller.start().await.unwrap();
        settle().await;

        drop(controller);
        // Sender side lives in the loop task; it closes once the task exits
        while state.changed().await.is_ok() {}
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_idle_timeout_keeps_loop_alive() {
        let controller = DebugController::new(Duration::MAX);
        controller.start().await.unwrap();
        controller.register_service("svc-a");

        assert!(controller.enable_debug(Some("svc-a")));
        settle().await;
        assert!(controller.state().timer().unwrap().is_armed());

        assert!(controller.disable_debug(Some("svc-a")));
        settle().await;
        assert_eq!(
            controller.state(),
            ControllerState::Running(TimerState::Disarmed)
        );

        controller.stop().await.unwrap();
    }
}
