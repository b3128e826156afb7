//! Plugin discovery and probing.
//!
//! Iterates a fixed, priority-ordered registry of plugin constructors:
//! hardware-specific driver candidates first, the generic fallback
//! after them, actions last. Each probe cycle rebuilds the driver and
//! action set from scratch; a deferred driver is retained unregistered
//! and triggers a full restart when it announces readiness.
//!
//! A cycle that ends without a driver supporting balanced and a driver
//! supporting power-saver is fatal; performance may legitimately be
//! unavailable.

use powerd_core::driver::{Action, Driver, DriverKind, Plugin};
use powerd_core::events::PluginEventSender;
use powerd_core::profile::{ActivationReason, ProbeResult, Profile};
use thiserror::Error;
use tracing::{debug, warn};

use crate::engine;
use crate::holds;
use crate::notify::{Notifier, PropertyMask};
use crate::protocol::registry::ConnectionRegistry;
use crate::state::DaemonState;

/// A plugin constructor in the probe registry.
///
/// Called once per probe cycle; the returned plugin is probed and then
/// registered, retained, or dropped.
pub type PluginConstructor = Box<dyn Fn(PluginEventSender) -> Plugin + Send>;

/// Fatal probe-cycle outcome.
#[derive(Debug, Error)]
pub enum StartupError {
    /// No active driver supports the named required profile.
    #[error("required profile drivers are missing: no active driver supports '{0}'")]
    InsufficientDrivers(Profile),
}

/// Runs probe cycles over a fixed plugin registry.
pub struct Orchestrator {
    registry: Vec<PluginConstructor>,
    plugin_events: PluginEventSender,
}

impl Orchestrator {
    /// Create an orchestrator over `registry`.
    #[must_use]
    pub fn new(registry: Vec<PluginConstructor>, plugin_events: PluginEventSender) -> Self {
        Self {
            registry,
            plugin_events,
        }
    }

    /// Discover and register drivers and actions, then resolve and apply
    /// the initial profile.
    ///
    /// # Errors
    ///
    /// Returns [`StartupError`] when the cycle ends without the required
    /// driver coverage. The caller exits with a non-zero status.
    pub fn start(
        &self,
        state: &mut DaemonState,
        notifier: &mut Notifier,
    ) -> Result<(), StartupError> {
        for constructor in &self.registry {
            match constructor(self.plugin_events.clone()) {
                Plugin::Driver(mut driver) => {
                    debug!("handling driver '{}'", driver.name());

                    let kind = driver.kind();
                    if state.driver_of_kind(kind).is_some() {
                        debug!(
                            "a {kind} driver is already registered, skipping driver '{}'",
                            driver.name()
                        );
                        continue;
                    }

                    if driver.profiles().is_empty() {
                        warn!("driver '{}' implements no profiles", driver.name());
                        continue;
                    }

                    match driver.probe() {
                        ProbeResult::Fail => {
                            debug!("probe() failed for driver '{}', skipping", driver.name());
                        },
                        ProbeResult::Defer => {
                            debug!("driver '{}' deferred, retaining for later", driver.name());
                            state.deferred.push(driver);
                        },
                        ProbeResult::Success => {
                            debug!("registered {kind} driver '{}'", driver.name());
                            match kind {
                                DriverKind::Cpu => state.cpu_driver = Some(driver),
                                DriverKind::Platform => state.platform_driver = Some(driver),
                            }
                        },
                    }
                },
                Plugin::Action(mut action) => {
                    debug!("handling action '{}'", action.name());
                    if action.probe() {
                        state.actions.push(action);
                    } else {
                        debug!("probe() failed for action '{}', skipping", action.name());
                    }
                },
            }
        }

        check_required_drivers(state)?;

        // Initial state from the store when it matches the probed
        // drivers, the default otherwise.
        let initial = resolve_initial_profile(state);
        state.selected_profile = initial;
        if let Err(err) = engine::activate_target_profile(
            state,
            notifier,
            initial,
            ActivationReason::Reset,
            true,
        ) {
            warn!("could not apply initial profile '{initial}': {err}");
            state.selected_profile = state.active_profile;
        }

        notifier.mark(PropertyMask::ALL);
        Ok(())
    }

    /// Tear the current plugin set down. Holds are released first, since
    /// they reference the drivers.
    pub fn stop(
        &self,
        state: &mut DaemonState,
        notifier: &mut Notifier,
        connections: &ConnectionRegistry,
    ) {
        holds::release_all_holds(state, notifier, connections);
        state.deferred.clear();
        state.actions.clear();
        state.cpu_driver = None;
        state.platform_driver = None;
    }

    /// Tear down and run a fresh probe cycle. Triggered when a deferred
    /// plugin fires its probe request.
    ///
    /// # Errors
    ///
    /// Returns [`StartupError`] when the new cycle ends without the
    /// required driver coverage.
    pub fn restart(
        &self,
        state: &mut DaemonState,
        notifier: &mut Notifier,
        connections: &ConnectionRegistry,
    ) -> Result<(), StartupError> {
        self.stop(state, notifier, connections);
        self.start(state, notifier)
    }
}

fn check_required_drivers(state: &DaemonState) -> Result<(), StartupError> {
    for profile in [Profile::Balanced, Profile::PowerSaver] {
        if !state.profile_available(profile) {
            return Err(StartupError::InsufficientDrivers(profile));
        }
    }
    Ok(())
}

/// The persisted profile, when the persisted driver names match the
/// registered drivers and the profile is currently supported; balanced
/// otherwise. An absent persisted name matches an absent driver.
fn resolve_initial_profile(state: &DaemonState) -> Profile {
    let persisted = state.store.state();

    let cpu_name = state.cpu_driver.as_deref().map(|d| d.name());
    if persisted.cpu_driver.as_deref() != cpu_name {
        debug!("persisted CPU driver does not match, using the default profile");
        return Profile::Balanced;
    }
    let platform_name = state.platform_driver.as_deref().map(|d| d.name());
    if persisted.platform_driver.as_deref() != platform_name {
        debug!("persisted platform driver does not match, using the default profile");
        return Profile::Balanced;
    }

    match persisted.profile {
        Some(profile) if state.profile_available(profile) => {
            debug!("applying profile '{profile}' from the state file");
            profile
        },
        Some(profile) => {
            debug!("persisted profile '{profile}' is not available, using the default");
            Profile::Balanced
        },
        None => Profile::Balanced,
    }
}
