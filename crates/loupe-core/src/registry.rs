//! Per-service debug flags and the global override
//!
//! Every read and write goes through one `RwLock`, so the global flag can
//! never be observed out of step with the per-service map. Guards are held
//! only for map operations; nothing inside a critical section logs or
//! sends.

use loupe_util::ServiceName;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct RegistryState {
    services: HashMap<ServiceName, bool>,
    global: bool,
}

impl RegistryState {
    fn any_enabled(&self) -> bool {
        self.global || self.services.values().any(|enabled| *enabled)
    }

    fn set_all(&mut self, enabled: bool) {
        for flag in self.services.values_mut() {
            *flag = enabled;
        }
        self.global = enabled;
    }
}

/// Consistent copy of the registry at one instant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistrySnapshot {
    pub global: bool,
    pub services: BTreeMap<ServiceName, bool>,
}

impl RegistrySnapshot {
    pub fn any_enabled(&self) -> bool {
        self.global || self.services.values().any(|enabled| *enabled)
    }

    /// Names currently in debug mode, sorted
    pub fn enabled_services(&self) -> Vec<&ServiceName> {
        self.services
            .iter()
            .filter(|(_, enabled)| **enabled)
            .map(|(name, _)| name)
            .collect()
    }
}

/// Registry of debug flags
#[derive(Debug, Default)]
pub struct DebugRegistry {
    state: RwLock<RegistryState>,
}

impl DebugRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // No mutation can leave the state half-written, so a poisoned guard is
    // still usable.
    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert `name` with debug off. Returns false if it was already present,
    /// in which case its flag is left untouched.
    pub fn register(&self, name: &str) -> bool {
        let mut state = self.write();
        if state.services.contains_key(name) {
            return false;
        }
        state.services.insert(ServiceName::from(name), false);
        true
    }

    /// Create or update `name` with the given flag
    pub fn set_service(&self, name: &str, enabled: bool) {
        let mut state = self.write();
        match state.services.get_mut(name) {
            Some(flag) => *flag = enabled,
            None => {
                state.services.insert(ServiceName::from(name), enabled);
            }
        }
    }

    /// Turn debug on for a registered service. Returns false if `name`
    /// is not registered.
    pub fn enable(&self, name: &str) -> bool {
        self.set_existing(name, true)
    }

    /// Turn debug off for a registered service. Returns false if `name`
    /// is not registered.
    pub fn disable(&self, name: &str) -> bool {
        self.set_existing(name, false)
    }

    fn set_existing(&self, name: &str, enabled: bool) -> bool {
        let mut state = self.write();
        match state.services.get_mut(name) {
            Some(flag) => {
                *flag = enabled;
                true
            }
            None => false,
        }
    }

    /// Set the global flag and every registered service on
    pub fn enable_all(&self) {
        self.write().set_all(true);
    }

    /// Set the global flag and every registered service off
    pub fn disable_all(&self) {
        self.write().set_all(false);
    }

    /// The service's own flag
    pub fn query(&self, name: &str) -> bool {
        self.read().services.get(name).copied().unwrap_or(false)
    }

    /// Whether debug lines should be emitted.
    ///
    /// With no name this is the global flag; with a name it is the service's
    /// own flag, false if it was never registered.
    pub fn query_effective(&self, name: Option<&str>) -> bool {
        match name {
            None => self.read().global,
            Some(name) => self.query(name),
        }
    }

    pub fn exists(&self, name: &str) -> bool {
        self.read().services.contains_key(name)
    }

    /// True if the global flag or any service flag is on
    pub fn any_enabled(&self) -> bool {
        self.read().any_enabled()
    }

    /// Turn every flag off, keeping registrations. Returns how many flags
    /// (services plus the global override) were on.
    pub fn expire(&self) -> usize {
        let mut state = self.write();
        let cleared = state.services.values().filter(|enabled| **enabled).count()
            + usize::from(state.global);
        state.set_all(false);
        cleared
    }

    /// Forget every registration and turn the global flag off
    pub fn clear(&self) {
        let mut state = self.write();
        state.services.clear();
        state.global = false;
    }

    pub fn len(&self) -> usize {
        self.read().services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().services.is_empty()
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        let state = self.read();
        RegistrySnapshot {
            global: state.global,
            services: state
                .services
                .iter()
                .map(|(name, enabled)| (name.clone(), *enabled))
                .collect(),
        }
    }
}
