//! Property composition.
//!
//! One place builds every property value, used both by reads
//! (`GetProperty`/`GetAllProperties`) and by the notification
//! aggregator, so observers always see the same shapes.

use std::collections::BTreeMap;

use powerd_core::driver::{Action, Driver};
use powerd_core::ipc::{
    HoldEntry, Interface, ProfileEntry, PropertyValue, PROP_ACTIONS, PROP_ACTIVE_PROFILE,
    PROP_ACTIVE_PROFILE_HOLDS, PROP_PROFILES, PROP_VERSION,
};
use powerd_core::profile::Profile;

use crate::state::DaemonState;

/// `ActiveProfile`.
#[must_use]
pub fn active_profile_value(state: &DaemonState) -> PropertyValue {
    PropertyValue::String(state.active_profile.as_str().to_string())
}

/// `Profiles`: every profile supported by at least one active driver,
/// with the names of the supplying drivers.
#[must_use]
pub fn profiles_value(state: &DaemonState) -> PropertyValue {
    let entries = Profile::ALL
        .into_iter()
        .filter_map(|profile| {
            let cpu_driver = state
                .cpu_driver
                .as_deref()
                .filter(|d| d.profiles().contains(profile))
                .map(|d| d.name().to_string());
            let platform_driver = state
                .platform_driver
                .as_deref()
                .filter(|d| d.profiles().contains(profile))
                .map(|d| d.name().to_string());
            if cpu_driver.is_none() && platform_driver.is_none() {
                return None;
            }
            Some(ProfileEntry {
                profile,
                cpu_driver,
                platform_driver,
            })
        })
        .collect();
    PropertyValue::Profiles(entries)
}

/// `Actions`: names of the active actions, in registration order.
#[must_use]
pub fn actions_value(state: &DaemonState) -> PropertyValue {
    PropertyValue::StringList(state.actions.iter().map(|a| a.name().to_string()).collect())
}

/// `PerformanceDegraded` / `PerformanceInhibited`.
#[must_use]
pub fn degraded_value(state: &DaemonState) -> PropertyValue {
    PropertyValue::String(state.performance_degraded())
}

/// `ActiveProfileHolds`, in creation order.
#[must_use]
pub fn holds_value(state: &DaemonState) -> PropertyValue {
    let entries = state
        .holds
        .values()
        .map(|hold| HoldEntry {
            application_id: hold.application_id.clone(),
            profile: hold.profile,
            reason: hold.reason.clone(),
        })
        .collect();
    PropertyValue::Holds(entries)
}

/// `Version`.
#[must_use]
pub fn version_value() -> PropertyValue {
    PropertyValue::String(crate::version().to_string())
}

/// Look up a single property on an interface. `None` when the property
/// does not exist there.
#[must_use]
pub fn property_value(
    state: &DaemonState,
    interface: Interface,
    property: &str,
) -> Option<PropertyValue> {
    if property == interface.degraded_property() {
        return Some(degraded_value(state));
    }
    match property {
        PROP_ACTIVE_PROFILE => Some(active_profile_value(state)),
        PROP_PROFILES => Some(profiles_value(state)),
        PROP_ACTIONS => Some(actions_value(state)),
        PROP_ACTIVE_PROFILE_HOLDS => Some(holds_value(state)),
        PROP_VERSION => Some(version_value()),
        _ => None,
    }
}

/// All properties of an interface.
#[must_use]
pub fn all_properties(state: &DaemonState, interface: Interface) -> BTreeMap<String, PropertyValue> {
    let mut values = BTreeMap::new();
    values.insert(PROP_ACTIVE_PROFILE.to_string(), active_profile_value(state));
    values.insert(PROP_PROFILES.to_string(), profiles_value(state));
    values.insert(PROP_ACTIONS.to_string(), actions_value(state));
    values.insert(
        interface.degraded_property().to_string(),
        degraded_value(state),
    );
    values.insert(PROP_ACTIVE_PROFILE_HOLDS.to_string(), holds_value(state));
    values.insert(PROP_VERSION.to_string(), version_value());
    values
}
