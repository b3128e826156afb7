//! The daemon state value.
//!
//! One `DaemonState` is constructed at startup and owned by the event
//! loop; components receive it by mutable reference. There are no
//! ambient globals and no locks: the single-threaded loop is the only
//! mutator.

use std::collections::BTreeMap;

use powerd_core::driver::{Action, Driver, DriverKind};
use powerd_core::ipc::{ConnectionId, Interface};
use powerd_core::profile::Profile;
use powerd_core::store::StateStore;

/// Identity of the client that owns a hold: the connection the call
/// arrived on and the interface identity it was addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requester {
    /// The owning connection. Its termination releases the hold.
    pub connection: ConnectionId,
    /// The interface the `HoldProfile` call used; `ProfileReleased` is
    /// emitted under the same identity.
    pub interface: Interface,
}

/// A temporary profile override requested by a client.
#[derive(Debug, Clone)]
pub struct ProfileHold {
    /// The held profile; always Performance or PowerSaver.
    pub profile: Profile,
    /// Free-form reason given by the application.
    pub reason: String,
    /// Identifier of the holding application.
    pub application_id: String,
    /// Who owns the hold.
    pub requester: Requester,
}

/// All mutable daemon state.
pub struct DaemonState {
    /// The profile currently applied to the hardware.
    pub active_profile: Profile,
    /// The last profile explicitly chosen by a user, independent of any
    /// hold.
    pub selected_profile: Profile,
    /// The registered CPU driver, if any.
    pub cpu_driver: Option<Box<dyn Driver>>,
    /// The registered platform driver, if any.
    pub platform_driver: Option<Box<dyn Driver>>,
    /// Registered actions, in probe order.
    pub actions: Vec<Box<dyn Action>>,
    /// Drivers whose probe deferred; retained until the next cycle.
    pub deferred: Vec<Box<dyn Driver>>,
    /// Active holds, keyed by cookie. Cookies are allocated
    /// monotonically, so iteration order is creation order.
    pub holds: BTreeMap<u32, ProfileHold>,
    /// The persisted-state handle.
    pub store: StateStore,
    next_cookie: u32,
}

impl DaemonState {
    /// Fresh state around a loaded store. Both profiles start Balanced;
    /// the orchestrator resolves the real initial profile.
    #[must_use]
    pub fn new(store: StateStore) -> Self {
        Self {
            active_profile: Profile::Balanced,
            selected_profile: Profile::Balanced,
            cpu_driver: None,
            platform_driver: None,
            actions: Vec::new(),
            deferred: Vec::new(),
            holds: BTreeMap::new(),
            store,
            next_cookie: 1,
        }
    }

    /// Allocate a hold cookie. Non-zero, unique for the daemon lifetime.
    pub fn allocate_cookie(&mut self) -> u32 {
        let cookie = self.next_cookie;
        self.next_cookie = self.next_cookie.checked_add(1).unwrap_or(1);
        cookie
    }

    /// The registered driver slot for `kind`.
    #[must_use]
    pub fn driver_of_kind(&self, kind: DriverKind) -> Option<&dyn Driver> {
        match kind {
            DriverKind::Cpu => self.cpu_driver.as_deref(),
            DriverKind::Platform => self.platform_driver.as_deref(),
        }
    }

    /// Whether at least one active driver supports `profile`.
    #[must_use]
    pub fn profile_available(&self, profile: Profile) -> bool {
        self.registered_drivers()
            .any(|driver| driver.profiles().contains(profile))
    }

    /// Iterate the registered drivers, CPU first.
    pub fn registered_drivers(&self) -> impl Iterator<Item = &dyn Driver> {
        self.cpu_driver
            .as_deref()
            .into_iter()
            .chain(self.platform_driver.as_deref())
    }

    /// The driver-reported reason Performance is degraded, or the empty
    /// string. Only drivers that actually support Performance are
    /// consulted.
    #[must_use]
    pub fn performance_degraded(&self) -> String {
        self.registered_drivers()
            .filter(|driver| driver.profiles().contains(Profile::Performance))
            .find_map(|driver| driver.performance_degraded())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use powerd_core::profile::ProfileSet;
    use tempfile::TempDir;

    use super::*;
    use crate::testutil::TestDriver;

    #[test]
    fn cookies_are_non_zero_and_unique() {
        let tmp = TempDir::new().unwrap();
        let mut state = DaemonState::new(StateStore::load(tmp.path().join("state.toml")));

        let first = state.allocate_cookie();
        let second = state.allocate_cookie();
        assert_ne!(first, 0);
        assert_ne!(second, 0);
        assert_ne!(first, second);
    }

    #[test]
    fn profile_availability_spans_both_drivers() {
        let tmp = TempDir::new().unwrap();
        let mut state = DaemonState::new(StateStore::load(tmp.path().join("state.toml")));

        state.cpu_driver = Some(Box::new(
            TestDriver::cpu("cpu0").with_profiles(ProfileSet::from_profiles(&[Profile::Balanced])),
        ));
        state.platform_driver = Some(Box::new(TestDriver::platform("plat0").with_profiles(
            ProfileSet::from_profiles(&[Profile::PowerSaver, Profile::Balanced]),
        )));

        assert!(state.profile_available(Profile::Balanced));
        assert!(state.profile_available(Profile::PowerSaver));
        assert!(!state.profile_available(Profile::Performance));
    }

    #[test]
    fn degraded_reason_requires_performance_support() {
        let tmp = TempDir::new().unwrap();
        let mut state = DaemonState::new(StateStore::load(tmp.path().join("state.toml")));

        state.cpu_driver = Some(Box::new(
            TestDriver::cpu("cpu0")
                .with_profiles(ProfileSet::from_profiles(&[Profile::Balanced]))
                .with_degraded("lap-detected"),
        ));
        assert_eq!(state.performance_degraded(), "");

        state.platform_driver = Some(Box::new(
            TestDriver::platform("plat0").with_degraded("thermal-limits"),
        ));
        assert_eq!(state.performance_degraded(), "thermal-limits");
    }
}
