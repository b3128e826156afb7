//! The profile activation engine.
//!
//! Applies a target profile across the independently-failing hardware
//! backends. Ordering is fixed: the CPU driver first, the platform
//! driver second, actions last. A CPU failure aborts the transition
//! before anything else is touched; a platform failure after a
//! successful CPU activation reverts the CPU driver to the previous
//! profile. Action failures never block or roll back anything.

use powerd_core::driver::{Action, Driver, DriverError};
use powerd_core::profile::{ActivationReason, Profile};
use powerd_core::store::PersistedState;
use thiserror::Error;
use tracing::{debug, warn};

use crate::notify::{Notifier, PropertyMask};
use crate::state::DaemonState;

/// A failed profile transition.
#[derive(Debug, Error)]
pub enum ActivationError {
    /// A driver refused or failed the activation.
    #[error("failed to activate driver '{driver}': {source}")]
    Driver {
        /// Name of the failing driver.
        driver: String,
        /// The driver's error.
        #[source]
        source: DriverError,
    },
}

impl ActivationError {
    /// The underlying driver error.
    #[must_use]
    pub fn driver_error(&self) -> &DriverError {
        match self {
            Self::Driver { source, .. } => source,
        }
    }
}

/// Apply `target` to every backend.
///
/// With `force` unset, a target equal to the active profile is a silent
/// no-op; forced reapplication is used for startup/reprobe resets. On
/// success the active profile is updated and, for persisting reasons,
/// written to the state store.
///
/// # Errors
///
/// Returns an [`ActivationError`] when a driver fails; the active
/// profile is left unchanged and any partial CPU activation has been
/// reverted.
pub fn activate_target_profile(
    state: &mut DaemonState,
    notifier: &mut Notifier,
    target: Profile,
    reason: ActivationReason,
    force: bool,
) -> Result<(), ActivationError> {
    if target == state.active_profile && !force {
        return Ok(());
    }

    debug!(
        "setting active profile '{target}' for reason '{reason}' (current: '{}')",
        state.active_profile
    );

    let previous = state.active_profile;
    let mut cpu_activated = false;

    if let Some(cpu) = state.cpu_driver.as_mut() {
        if cpu.profiles().contains(target) {
            let name = cpu.name().to_string();
            cpu.activate(target, reason).map_err(|source| {
                warn!("failed to activate CPU driver '{name}': {source}");
                ActivationError::Driver {
                    driver: name.clone(),
                    source,
                }
            })?;
            cpu_activated = true;
        }
    }

    let platform_result = match state.platform_driver.as_mut() {
        Some(platform) if platform.profiles().contains(target) => {
            let name = platform.name().to_string();
            platform.activate(target, reason).map_err(|source| (name, source))
        },
        _ => Ok(()),
    };
    if let Err((name, source)) = platform_result {
        warn!("failed to activate platform driver '{name}': {source}");
        if cpu_activated {
            revert_cpu_driver(state, previous);
        }
        return Err(ActivationError::Driver {
            driver: name,
            source,
        });
    }

    for action in &mut state.actions {
        if let Err(err) = action.profile_activated(target) {
            warn!(
                "failed to activate action '{}' to profile '{target}': {err}",
                action.name()
            );
        }
    }

    state.active_profile = target;
    if previous != target {
        notifier.mark(PropertyMask::ACTIVE_PROFILE);
    }

    if reason.persists() {
        persist(state);
    }

    Ok(())
}

/// A driver reported a profile change outside the daemon's control.
/// Follow it with an `Internal` activation; the user's selection is
/// untouched.
pub fn handle_external_profile_change(
    state: &mut DaemonState,
    notifier: &mut Notifier,
    driver: &str,
    profile: Profile,
) {
    debug!(
        "driver '{driver}' switched internally to profile '{profile}' (current: '{}')",
        state.active_profile
    );
    if profile == state.active_profile {
        return;
    }

    if let Err(err) =
        activate_target_profile(state, notifier, profile, ActivationReason::Internal, false)
    {
        warn!("could not follow external profile change: {err}");
    }
}

fn revert_cpu_driver(state: &mut DaemonState, previous: Profile) {
    let Some(cpu) = state.cpu_driver.as_mut() else {
        return;
    };
    if let Err(err) = cpu.activate(previous, ActivationReason::Internal) {
        warn!(
            "failed to revert CPU driver '{}' to profile '{previous}': {err}",
            cpu.name()
        );
    }
}

fn persist(state: &mut DaemonState) {
    let record = PersistedState {
        cpu_driver: state.cpu_driver.as_deref().map(|d| d.name().to_string()),
        platform_driver: state
            .platform_driver
            .as_deref()
            .map(|d| d.name().to_string()),
        profile: Some(state.active_profile),
    };
    if let Err(err) = state.store.save(record) {
        warn!(
            "could not save state file '{}': {err}",
            state.store.path().display()
        );
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;
    use crate::testutil::{state_in, TestAction, TestDriver};

    #[test]
    fn equal_target_without_force_is_a_no_op() {
        let tmp = TempDir::new().unwrap();
        let mut state = state_in(&tmp);
        let driver = TestDriver::cpu("cpu0");
        let log = driver.activation_log();
        state.cpu_driver = Some(Box::new(driver));
        let mut notifier = Notifier::new();

        activate_target_profile(
            &mut state,
            &mut notifier,
            Profile::Balanced,
            ActivationReason::Internal,
            false,
        )
        .unwrap();

        assert!(log.lock().unwrap().is_empty());
        assert!(notifier.pending().is_empty());
        assert!(!state.store.path().exists());
    }

    #[test]
    fn forced_reapply_reaches_the_drivers() {
        let tmp = TempDir::new().unwrap();
        let mut state = state_in(&tmp);
        let driver = TestDriver::cpu("cpu0");
        let log = driver.activation_log();
        state.cpu_driver = Some(Box::new(driver));
        let mut notifier = Notifier::new();

        activate_target_profile(
            &mut state,
            &mut notifier,
            Profile::Balanced,
            ActivationReason::Reset,
            true,
        )
        .unwrap();

        assert_eq!(
            log.lock().unwrap().as_slice(),
            &[(Profile::Balanced, ActivationReason::Reset)]
        );
        // Reset never persists.
        assert!(!state.store.path().exists());
    }

    #[test]
    fn platform_failure_reverts_the_cpu_driver() {
        let tmp = TempDir::new().unwrap();
        let mut state = state_in(&tmp);
        let cpu = TestDriver::cpu("cpu0");
        let cpu_log = cpu.activation_log();
        state.cpu_driver = Some(Box::new(cpu));
        state.platform_driver =
            Some(Box::new(TestDriver::platform("plat0").failing_on(Profile::Performance)));
        let mut notifier = Notifier::new();

        let err = activate_target_profile(
            &mut state,
            &mut notifier,
            Profile::Performance,
            ActivationReason::User,
            false,
        )
        .unwrap_err();

        let ActivationError::Driver { driver, .. } = err;
        assert_eq!(driver, "plat0");
        assert_eq!(state.active_profile, Profile::Balanced);
        assert_eq!(
            cpu_log.lock().unwrap().as_slice(),
            &[
                (Profile::Performance, ActivationReason::User),
                (Profile::Balanced, ActivationReason::Internal),
            ]
        );
        assert!(notifier.pending().is_empty());
        // A failed transition is never persisted.
        assert!(!state.store.path().exists());
    }

    #[test]
    fn cpu_failure_leaves_platform_and_actions_untouched() {
        let tmp = TempDir::new().unwrap();
        let mut state = state_in(&tmp);
        state.cpu_driver = Some(Box::new(TestDriver::cpu("cpu0").failing_on(Profile::PowerSaver)));
        let platform = TestDriver::platform("plat0");
        let platform_log = platform.activation_log();
        state.platform_driver = Some(Box::new(platform));
        let action = TestAction::new("charge_throttle");
        let action_log = action.action_log();
        state.actions.push(Box::new(action));
        let mut notifier = Notifier::new();

        let err = activate_target_profile(
            &mut state,
            &mut notifier,
            Profile::PowerSaver,
            ActivationReason::User,
            false,
        )
        .unwrap_err();

        let ActivationError::Driver { driver, .. } = err;
        assert_eq!(driver, "cpu0");
        assert!(platform_log.lock().unwrap().is_empty());
        assert!(action_log.lock().unwrap().is_empty());
        assert_eq!(state.active_profile, Profile::Balanced);
    }

    #[test]
    fn failing_action_does_not_block_the_transition() {
        let tmp = TempDir::new().unwrap();
        let mut state = state_in(&tmp);
        state.cpu_driver = Some(Box::new(TestDriver::cpu("cpu0")));
        state.actions.push(Box::new(TestAction::new("bad").failing()));
        let good = TestAction::new("good");
        let good_log = good.action_log();
        state.actions.push(Box::new(good));
        let mut notifier = Notifier::new();

        activate_target_profile(
            &mut state,
            &mut notifier,
            Profile::Performance,
            ActivationReason::User,
            false,
        )
        .unwrap();

        assert_eq!(state.active_profile, Profile::Performance);
        // The action after the failing one still ran.
        assert_eq!(good_log.lock().unwrap().as_slice(), &[Profile::Performance]);
        assert!(notifier.pending().contains(PropertyMask::ACTIVE_PROFILE));
    }

    #[test]
    fn only_user_and_internal_persist() {
        let tmp = TempDir::new().unwrap();
        let mut state = state_in(&tmp);
        state.cpu_driver = Some(Box::new(TestDriver::cpu("cpu0")));
        let mut notifier = Notifier::new();

        activate_target_profile(
            &mut state,
            &mut notifier,
            Profile::Performance,
            ActivationReason::ProgramHold,
            false,
        )
        .unwrap();
        assert!(!state.store.path().exists());

        activate_target_profile(
            &mut state,
            &mut notifier,
            Profile::PowerSaver,
            ActivationReason::User,
            false,
        )
        .unwrap();
        let content = fs::read_to_string(state.store.path()).unwrap();
        assert!(content.contains("power-saver"));
        assert!(content.contains("cpu0"));
    }

    #[test]
    fn repeated_internal_activation_writes_nothing_twice() {
        let tmp = TempDir::new().unwrap();
        let mut state = state_in(&tmp);
        let driver = TestDriver::cpu("cpu0");
        let log = driver.activation_log();
        state.cpu_driver = Some(Box::new(driver));
        let mut notifier = Notifier::new();

        activate_target_profile(
            &mut state,
            &mut notifier,
            Profile::Performance,
            ActivationReason::Internal,
            false,
        )
        .unwrap();
        assert_eq!(log.lock().unwrap().len(), 1);
        assert!(notifier.pending().contains(PropertyMask::ACTIVE_PROFILE));
        let first_write = fs::read_to_string(state.store.path()).unwrap();

        // A fresh notifier stands in for the flush between events.
        let mut notifier = Notifier::new();
        activate_target_profile(
            &mut state,
            &mut notifier,
            Profile::Performance,
            ActivationReason::Internal,
            false,
        )
        .unwrap();

        assert_eq!(log.lock().unwrap().len(), 1);
        assert!(notifier.pending().is_empty());
        assert_eq!(fs::read_to_string(state.store.path()).unwrap(), first_write);
    }

    #[test]
    fn external_change_follows_with_internal_reason() {
        let tmp = TempDir::new().unwrap();
        let mut state = state_in(&tmp);
        let driver = TestDriver::platform("plat0");
        let log = driver.activation_log();
        state.platform_driver = Some(Box::new(driver));
        state.selected_profile = Profile::Balanced;
        let mut notifier = Notifier::new();

        handle_external_profile_change(&mut state, &mut notifier, "plat0", Profile::Performance);

        assert_eq!(state.active_profile, Profile::Performance);
        assert_eq!(state.selected_profile, Profile::Balanced);
        assert_eq!(
            log.lock().unwrap().as_slice(),
            &[(Profile::Performance, ActivationReason::Internal)]
        );
        assert!(notifier.pending().contains(PropertyMask::ACTIVE_PROFILE));

        // An echo of the current profile is ignored.
        handle_external_profile_change(&mut state, &mut notifier, "plat0", Profile::Performance);
        assert_eq!(log.lock().unwrap().len(), 1);
    }
}
