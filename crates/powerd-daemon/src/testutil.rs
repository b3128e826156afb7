//! Shared test doubles for the daemon test suites.

use std::sync::{Arc, Mutex};

use powerd_core::driver::{Action, ActionError, Driver, DriverError, DriverKind};
use powerd_core::profile::{ActivationReason, ProbeResult, Profile, ProfileSet};
use powerd_core::store::StateStore;
use tempfile::TempDir;

use crate::state::DaemonState;

/// Shared record of the activations a test driver received.
pub type ActivationLog = Arc<Mutex<Vec<(Profile, ActivationReason)>>>;

/// A scriptable driver. Clones share the activation log and the probe
/// result, so a registry constructor can hand out fresh instances per
/// probe cycle while the test observes all of them.
#[derive(Clone)]
pub struct TestDriver {
    name: String,
    kind: DriverKind,
    profiles: ProfileSet,
    probe_result: Arc<Mutex<ProbeResult>>,
    fail_profile: Option<Profile>,
    degraded: Option<String>,
    log: ActivationLog,
}

impl TestDriver {
    pub fn cpu(name: &str) -> Self {
        Self::new(name, DriverKind::Cpu)
    }

    pub fn platform(name: &str) -> Self {
        Self::new(name, DriverKind::Platform)
    }

    fn new(name: &str, kind: DriverKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            profiles: ProfileSet::ALL,
            probe_result: Arc::new(Mutex::new(ProbeResult::Success)),
            fail_profile: None,
            degraded: None,
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_profiles(mut self, profiles: ProfileSet) -> Self {
        self.profiles = profiles;
        self
    }

    pub fn with_probe(self, result: ProbeResult) -> Self {
        *self.probe_result.lock().unwrap() = result;
        self
    }

    pub fn failing_on(mut self, profile: Profile) -> Self {
        self.fail_profile = Some(profile);
        self
    }

    pub fn with_degraded(mut self, reason: &str) -> Self {
        self.degraded = Some(reason.to_string());
        self
    }

    /// Handle observing every activation across all clones.
    pub fn activation_log(&self) -> ActivationLog {
        Arc::clone(&self.log)
    }

    /// Flip the probe outcome for subsequent cycles.
    pub fn set_probe_result(&self, result: ProbeResult) {
        *self.probe_result.lock().unwrap() = result;
    }
}

impl Driver for TestDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> DriverKind {
        self.kind
    }

    fn profiles(&self) -> ProfileSet {
        self.profiles
    }

    fn probe(&mut self) -> ProbeResult {
        *self.probe_result.lock().unwrap()
    }

    fn activate(&mut self, profile: Profile, reason: ActivationReason) -> Result<(), DriverError> {
        if self.fail_profile == Some(profile) {
            return Err(DriverError::Other(format!(
                "test driver refuses profile '{profile}'"
            )));
        }
        self.log.lock().unwrap().push((profile, reason));
        Ok(())
    }

    fn performance_degraded(&self) -> Option<String> {
        self.degraded.clone()
    }
}

/// Shared record of the profiles a test action was told about.
pub type ActionLog = Arc<Mutex<Vec<Profile>>>;

/// A scriptable action.
#[derive(Clone)]
pub struct TestAction {
    name: String,
    probe_ok: bool,
    fail: bool,
    log: ActionLog,
}

impl TestAction {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            probe_ok: true,
            fail: false,
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn failing_probe(mut self) -> Self {
        self.probe_ok = false;
        self
    }

    pub fn action_log(&self) -> ActionLog {
        Arc::clone(&self.log)
    }
}

impl Action for TestAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn probe(&mut self) -> bool {
        self.probe_ok
    }

    fn profile_activated(&mut self, profile: Profile) -> Result<(), ActionError> {
        if self.fail {
            return Err(ActionError::Other("test action failure".to_string()));
        }
        self.log.lock().unwrap().push(profile);
        Ok(())
    }
}

/// Fresh daemon state over a store in `tmp`.
pub fn state_in(tmp: &TempDir) -> DaemonState {
    DaemonState::new(StateStore::load(tmp.path().join("state.toml")))
}
