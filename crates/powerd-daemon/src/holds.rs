//! Temporary profile overrides.
//!
//! Clients may hold the performance or power-saver profile, superseding
//! the user's selection until every hold is gone. Holds are tracked per
//! requester; a requester disconnecting releases its holds exactly as an
//! explicit `ReleaseProfile` would, through the same internal primitive.
//!
//! Effective-profile precedence: holds are scanned in cookie (creation)
//! order; any power-saver hold wins immediately. With only performance
//! holds present, the most recently created one wins.

use powerd_core::ipc::{DaemonSignal, ServerMessage};
use powerd_core::profile::{ActivationReason, Profile};
use thiserror::Error;
use tracing::{debug, warn};

use crate::engine::{self, ActivationError};
use crate::notify::{Notifier, PropertyMask};
use crate::protocol::registry::ConnectionRegistry;
use crate::state::{DaemonState, ProfileHold, Requester};

/// Errors from the hold operations.
#[derive(Debug, Error)]
pub enum HoldError {
    /// Only performance and power-saver can be held.
    #[error("only profiles 'performance' and 'power-saver' can be a hold profile")]
    InvalidHoldProfile,

    /// No active driver supports the requested profile.
    #[error("cannot hold profile '{0}' as it is not available")]
    Unavailable(Profile),

    /// No hold with the given cookie exists.
    #[error("no hold with cookie {0}")]
    UnknownCookie(u32),
}

/// Errors from the global profile switch.
#[derive(Debug, Error)]
pub enum SetProfileError {
    /// No active driver supports the requested profile.
    #[error("cannot switch to unavailable profile '{0}'")]
    Unavailable(Profile),

    /// The activation failed.
    #[error(transparent)]
    Activation(#[from] ActivationError),
}

/// Take a hold on `profile` for `requester`.
///
/// On success the hold is recorded, the effective hold profile is
/// recomputed, and, when it differs from the active profile, applied
/// with reason `ProgramHold`. A failing activation keeps the hold and is
/// only logged; the cookie is returned regardless.
///
/// # Errors
///
/// Returns a [`HoldError`] for balanced or unavailable profiles.
pub fn hold_profile(
    state: &mut DaemonState,
    notifier: &mut Notifier,
    profile: Profile,
    reason: &str,
    application_id: &str,
    requester: Requester,
) -> Result<u32, HoldError> {
    if profile == Profile::Balanced {
        return Err(HoldError::InvalidHoldProfile);
    }
    if !state.profile_available(profile) {
        return Err(HoldError::Unavailable(profile));
    }

    let cookie = state.allocate_cookie();
    debug!(
        "{application_id} ({}) requesting to hold profile '{profile}', reason: '{reason}'",
        requester.connection
    );
    state.holds.insert(
        cookie,
        ProfileHold {
            profile,
            reason: reason.to_string(),
            application_id: application_id.to_string(),
            requester,
        },
    );
    notifier.mark(PropertyMask::HOLDS);

    if profile != state.active_profile {
        apply_effective_hold_profile(state, notifier);
    }

    Ok(cookie)
}

/// Release the hold identified by `cookie`.
///
/// The one primitive behind both explicit release and requester
/// disconnect: removes the entry, notifies the original requester with
/// `ProfileReleased`, and reactivates whatever profile now applies.
///
/// # Errors
///
/// Returns [`HoldError::UnknownCookie`] when no such hold exists.
pub fn release_hold(
    state: &mut DaemonState,
    notifier: &mut Notifier,
    connections: &ConnectionRegistry,
    cookie: u32,
) -> Result<(), HoldError> {
    let hold = state
        .holds
        .remove(&cookie)
        .ok_or(HoldError::UnknownCookie(cookie))?;

    debug!("releasing profile hold {cookie}");
    send_released_signal(connections, &hold.requester, cookie);
    notifier.mark(PropertyMask::HOLDS);

    if state.holds.is_empty() {
        if state.active_profile != state.selected_profile {
            debug!("no profile holds anymore, going back to last selected profile");
            let selected = state.selected_profile;
            if let Err(err) = engine::activate_target_profile(
                state,
                notifier,
                selected,
                ActivationReason::ProgramHold,
                false,
            ) {
                warn!("could not restore selected profile: {err}");
            }
        }
    } else if hold.profile == state.active_profile {
        apply_effective_hold_profile(state, notifier);
    }

    Ok(())
}

/// React to a requester's connection going away: release every hold it
/// owns, with the same externally visible effects as explicit releases.
pub fn requester_disconnected(
    state: &mut DaemonState,
    notifier: &mut Notifier,
    connections: &ConnectionRegistry,
    connection: powerd_core::ipc::ConnectionId,
) {
    let cookies: Vec<u32> = state
        .holds
        .iter()
        .filter(|(_, hold)| hold.requester.connection == connection)
        .map(|(cookie, _)| *cookie)
        .collect();

    for cookie in cookies {
        debug!("holder {connection} disappeared, removing profile hold {cookie}");
        if let Err(err) = release_hold(state, notifier, connections, cookie) {
            warn!("could not release hold {cookie} after disconnect: {err}");
        }
    }
}

/// The profile the current holds resolve to, if any.
///
/// Power-saver wins immediately; otherwise the most recently created
/// hold's profile is returned.
#[must_use]
pub fn effective_hold_profile(state: &DaemonState) -> Option<Profile> {
    let mut profile = None;
    for hold in state.holds.values() {
        if hold.profile == Profile::PowerSaver {
            return Some(Profile::PowerSaver);
        }
        profile = Some(hold.profile);
    }
    profile
}

/// An end user selected `target`.
///
/// Every current hold is released first (each requester is notified),
/// then the selection is updated and applied with reason `User`.
///
/// # Errors
///
/// Returns a [`SetProfileError`] for unavailable profiles or a failing
/// activation; the selection is only updated on success.
pub fn set_active_profile(
    state: &mut DaemonState,
    notifier: &mut Notifier,
    connections: &ConnectionRegistry,
    target: Profile,
) -> Result<(), SetProfileError> {
    if !state.profile_available(target) {
        return Err(SetProfileError::Unavailable(target));
    }

    debug!(
        "transitioning active profile from '{}' to '{target}' by user request",
        state.active_profile
    );

    if !state.holds.is_empty() {
        debug!("releasing active profile holds");
        release_all_holds(state, notifier, connections);
    }

    engine::activate_target_profile(state, notifier, target, ActivationReason::User, false)?;
    state.selected_profile = target;
    Ok(())
}

/// Drop every hold at once, notifying each requester, without any
/// reactivation. Used before a user switch and on orchestrator stop.
pub fn release_all_holds(
    state: &mut DaemonState,
    notifier: &mut Notifier,
    connections: &ConnectionRegistry,
) {
    if state.holds.is_empty() {
        return;
    }
    for (cookie, hold) in std::mem::take(&mut state.holds) {
        send_released_signal(connections, &hold.requester, cookie);
    }
    notifier.mark(PropertyMask::HOLDS);
}

fn apply_effective_hold_profile(state: &mut DaemonState, notifier: &mut Notifier) {
    let Some(target) = effective_hold_profile(state) else {
        return;
    };
    if target == state.active_profile {
        return;
    }
    debug!("next hold profile is '{target}'");
    if let Err(err) = engine::activate_target_profile(
        state,
        notifier,
        target,
        ActivationReason::ProgramHold,
        false,
    ) {
        warn!("could not apply hold profile '{target}': {err}");
    }
}

fn send_released_signal(connections: &ConnectionRegistry, requester: &Requester, cookie: u32) {
    connections.send_to(
        requester.connection,
        &ServerMessage::Signal {
            signal: DaemonSignal::ProfileReleased {
                interface: requester.interface.name().to_string(),
                cookie,
            },
        },
    );
}

#[cfg(test)]
mod tests {
    use powerd_core::ipc::{ConnectionId, Interface};
    use powerd_core::profile::ProfileSet;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    use super::*;
    use crate::testutil::{state_in, TestDriver};

    fn requester(connection: u64) -> Requester {
        Requester {
            connection: ConnectionId(connection),
            interface: Interface::Primary,
        }
    }

    fn registry_for(
        connection: u64,
    ) -> (ConnectionRegistry, mpsc::UnboundedReceiver<ServerMessage>) {
        let mut registry = ConnectionRegistry::new();
        let (tx, rx) = mpsc::unbounded_channel();
        registry.register(ConnectionId(connection), tx);
        (registry, rx)
    }

    fn state_with_cpu_driver(tmp: &TempDir) -> DaemonState {
        let mut state = state_in(tmp);
        state.cpu_driver = Some(Box::new(TestDriver::cpu("amd_pstate")));
        state
    }

    fn released_cookies(rx: &mut mpsc::UnboundedReceiver<ServerMessage>) -> Vec<u32> {
        let mut cookies = Vec::new();
        while let Ok(message) = rx.try_recv() {
            if let ServerMessage::Signal {
                signal: DaemonSignal::ProfileReleased { cookie, .. },
            } = message
            {
                cookies.push(cookie);
            }
        }
        cookies
    }

    #[test]
    fn balanced_holds_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let mut state = state_with_cpu_driver(&tmp);
        let mut notifier = Notifier::new();

        let err = hold_profile(
            &mut state,
            &mut notifier,
            Profile::Balanced,
            "reason",
            "app",
            requester(1),
        )
        .unwrap_err();
        assert!(matches!(err, HoldError::InvalidHoldProfile));
        assert!(state.holds.is_empty());
        assert!(notifier.pending().is_empty());
    }

    #[test]
    fn unavailable_holds_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let mut state = state_in(&tmp);
        state.cpu_driver = Some(Box::new(TestDriver::cpu("cpu0").with_profiles(
            ProfileSet::from_profiles(&[Profile::PowerSaver, Profile::Balanced]),
        )));
        let mut notifier = Notifier::new();

        let err = hold_profile(
            &mut state,
            &mut notifier,
            Profile::Performance,
            "reason",
            "app",
            requester(1),
        )
        .unwrap_err();
        assert!(matches!(err, HoldError::Unavailable(Profile::Performance)));
    }

    #[test]
    fn power_saver_wins_regardless_of_insertion_order() {
        let tmp = TempDir::new().unwrap();
        let mut state = state_with_cpu_driver(&tmp);
        let mut notifier = Notifier::new();

        hold_profile(
            &mut state,
            &mut notifier,
            Profile::PowerSaver,
            "save",
            "a",
            requester(1),
        )
        .unwrap();
        hold_profile(
            &mut state,
            &mut notifier,
            Profile::Performance,
            "fast",
            "b",
            requester(2),
        )
        .unwrap();

        assert_eq!(effective_hold_profile(&state), Some(Profile::PowerSaver));
        assert_eq!(state.active_profile, Profile::PowerSaver);
    }

    #[test]
    fn latest_performance_hold_wins_without_power_saver() {
        let tmp = TempDir::new().unwrap();
        let mut state = state_with_cpu_driver(&tmp);
        let mut notifier = Notifier::new();

        hold_profile(
            &mut state,
            &mut notifier,
            Profile::Performance,
            "one",
            "a",
            requester(1),
        )
        .unwrap();
        hold_profile(
            &mut state,
            &mut notifier,
            Profile::Performance,
            "two",
            "b",
            requester(2),
        )
        .unwrap();

        assert_eq!(effective_hold_profile(&state), Some(Profile::Performance));
        assert_eq!(state.active_profile, Profile::Performance);
    }

    #[test]
    fn hold_scenario_with_release_ordering() {
        let tmp = TempDir::new().unwrap();
        let mut state = state_with_cpu_driver(&tmp);
        let (registry, mut rx) = registry_for(1);
        let mut notifier = Notifier::new();

        // Startup resolved balanced, no platform driver.
        assert_eq!(state.active_profile, Profile::Balanced);
        assert_eq!(state.selected_profile, Profile::Balanced);

        let c1 = hold_profile(
            &mut state,
            &mut notifier,
            Profile::Performance,
            "benchmark",
            "com.example.bench",
            requester(1),
        )
        .unwrap();
        assert_eq!(state.active_profile, Profile::Performance);

        let c2 = hold_profile(
            &mut state,
            &mut notifier,
            Profile::PowerSaver,
            "save",
            "com.example.saver",
            requester(1),
        )
        .unwrap();
        assert_eq!(state.active_profile, Profile::PowerSaver);

        release_hold(&mut state, &mut notifier, &registry, c2).unwrap();
        assert_eq!(state.active_profile, Profile::Performance);

        release_hold(&mut state, &mut notifier, &registry, c1).unwrap();
        assert_eq!(state.active_profile, Profile::Balanced);
        assert_eq!(state.active_profile, state.selected_profile);

        assert_eq!(released_cookies(&mut rx), vec![c2, c1]);
    }

    #[test]
    fn releasing_an_unknown_cookie_fails() {
        let tmp = TempDir::new().unwrap();
        let mut state = state_with_cpu_driver(&tmp);
        let (registry, _rx) = registry_for(1);
        let mut notifier = Notifier::new();

        let err = release_hold(&mut state, &mut notifier, &registry, 42).unwrap_err();
        assert!(matches!(err, HoldError::UnknownCookie(42)));
    }

    #[test]
    fn disconnect_releases_only_the_requesters_holds() {
        let tmp = TempDir::new().unwrap();
        let mut state = state_with_cpu_driver(&tmp);
        let (registry, mut rx) = registry_for(1);
        let mut notifier = Notifier::new();

        let c1 = hold_profile(
            &mut state,
            &mut notifier,
            Profile::PowerSaver,
            "save",
            "a",
            requester(1),
        )
        .unwrap();
        let c2 = hold_profile(
            &mut state,
            &mut notifier,
            Profile::Performance,
            "fast",
            "b",
            requester(2),
        )
        .unwrap();
        assert_eq!(state.active_profile, Profile::PowerSaver);

        requester_disconnected(&mut state, &mut notifier, &registry, ConnectionId(1));

        assert!(!state.holds.contains_key(&c1));
        assert!(state.holds.contains_key(&c2));
        // The surviving performance hold takes over.
        assert_eq!(state.active_profile, Profile::Performance);
        assert_eq!(released_cookies(&mut rx), vec![c1]);
    }

    #[test]
    fn disconnect_of_last_holder_restores_selected_profile() {
        let tmp = TempDir::new().unwrap();
        let mut state = state_with_cpu_driver(&tmp);
        let (registry, mut rx) = registry_for(1);
        let mut notifier = Notifier::new();

        let c1 = hold_profile(
            &mut state,
            &mut notifier,
            Profile::Performance,
            "fast",
            "a",
            requester(1),
        )
        .unwrap();
        assert_eq!(state.active_profile, Profile::Performance);

        requester_disconnected(&mut state, &mut notifier, &registry, ConnectionId(1));

        assert!(state.holds.is_empty());
        assert_eq!(state.active_profile, Profile::Balanced);
        assert_eq!(released_cookies(&mut rx), vec![c1]);
    }

    #[test]
    fn user_switch_releases_all_holds_first() {
        let tmp = TempDir::new().unwrap();
        let mut state = state_with_cpu_driver(&tmp);
        let (registry, mut rx) = registry_for(1);
        let mut notifier = Notifier::new();

        let c1 = hold_profile(
            &mut state,
            &mut notifier,
            Profile::PowerSaver,
            "save",
            "a",
            requester(1),
        )
        .unwrap();

        set_active_profile(&mut state, &mut notifier, &registry, Profile::Performance).unwrap();

        assert!(state.holds.is_empty());
        assert_eq!(state.active_profile, Profile::Performance);
        assert_eq!(state.selected_profile, Profile::Performance);
        assert_eq!(released_cookies(&mut rx), vec![c1]);
    }

    #[test]
    fn user_switch_to_unavailable_profile_changes_nothing() {
        let tmp = TempDir::new().unwrap();
        let mut state = state_in(&tmp);
        state.cpu_driver = Some(Box::new(TestDriver::cpu("cpu0").with_profiles(
            ProfileSet::from_profiles(&[Profile::PowerSaver, Profile::Balanced]),
        )));
        let (registry, _rx) = registry_for(1);
        let mut notifier = Notifier::new();

        let err = set_active_profile(&mut state, &mut notifier, &registry, Profile::Performance)
            .unwrap_err();
        assert!(matches!(
            err,
            SetProfileError::Unavailable(Profile::Performance)
        ));
        assert_eq!(state.active_profile, Profile::Balanced);
        assert_eq!(state.selected_profile, Profile::Balanced);
        assert!(notifier.pending().is_empty());
    }

    #[test]
    fn failed_user_activation_keeps_the_old_selection() {
        let tmp = TempDir::new().unwrap();
        let mut state = state_in(&tmp);
        state.cpu_driver =
            Some(Box::new(TestDriver::cpu("cpu0").failing_on(Profile::Performance)));
        let (registry, _rx) = registry_for(1);
        let mut notifier = Notifier::new();

        let err = set_active_profile(&mut state, &mut notifier, &registry, Profile::Performance)
            .unwrap_err();
        assert!(matches!(err, SetProfileError::Activation(_)));
        assert_eq!(state.selected_profile, Profile::Balanced);
        assert_eq!(state.active_profile, Profile::Balanced);
    }
}
