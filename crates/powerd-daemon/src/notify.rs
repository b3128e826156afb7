//! Dirty-property aggregation.
//!
//! Mutating operations never emit change notifications directly; they
//! set bits in a [`PropertyMask`]. The event loop flushes once per
//! external event, so a single call that cascades through several
//! internal transitions yields one coalesced `PropertiesChanged` signal
//! per interface identity, not one per step.

use std::collections::BTreeMap;
use std::ops::BitOr;

use powerd_core::ipc::{
    DaemonSignal, Interface, PropertyValue, ServerMessage, PROP_ACTIONS, PROP_ACTIVE_PROFILE,
    PROP_ACTIVE_PROFILE_HOLDS, PROP_PROFILES, PROP_VERSION,
};

use crate::properties;
use crate::protocol::registry::ConnectionRegistry;
use crate::state::DaemonState;

/// Bitmask of property groups pending notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PropertyMask(u32);

impl PropertyMask {
    pub const NONE: Self = Self(0);
    pub const ACTIVE_PROFILE: Self = Self(1 << 0);
    pub const DEGRADED: Self = Self(1 << 1);
    pub const PROFILES: Self = Self(1 << 2);
    pub const ACTIONS: Self = Self(1 << 3);
    pub const HOLDS: Self = Self(1 << 4);
    pub const VERSION: Self = Self(1 << 5);
    pub const ALL: Self = Self(0b11_1111);

    /// Whether every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether no bit is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for PropertyMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Accumulates dirty bits and composes the outgoing notifications.
#[derive(Debug, Default)]
pub struct Notifier {
    dirty: PropertyMask,
}

impl Notifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark property groups dirty.
    pub fn mark(&mut self, mask: PropertyMask) {
        self.dirty = self.dirty | mask;
    }

    /// The currently pending mask.
    #[must_use]
    pub const fn pending(&self) -> PropertyMask {
        self.dirty
    }

    /// Compose one `PropertiesChanged` signal per interface identity
    /// from the pending bits, broadcast them, and clear the mask.
    /// Does nothing when no bit is set.
    pub fn flush(&mut self, state: &DaemonState, connections: &ConnectionRegistry) {
        let mask = std::mem::take(&mut self.dirty);
        if mask.is_empty() {
            return;
        }

        for interface in Interface::ALL {
            let changed = Self::changed_properties(state, interface, mask);
            connections.broadcast(&ServerMessage::Signal {
                signal: DaemonSignal::PropertiesChanged {
                    interface: interface.name().to_string(),
                    changed,
                },
            });
        }
    }

    fn changed_properties(
        state: &DaemonState,
        interface: Interface,
        mask: PropertyMask,
    ) -> BTreeMap<String, PropertyValue> {
        let mut changed = BTreeMap::new();
        if mask.contains(PropertyMask::ACTIVE_PROFILE) {
            changed.insert(
                PROP_ACTIVE_PROFILE.to_string(),
                properties::active_profile_value(state),
            );
        }
        if mask.contains(PropertyMask::DEGRADED) {
            changed.insert(
                interface.degraded_property().to_string(),
                properties::degraded_value(state),
            );
        }
        if mask.contains(PropertyMask::PROFILES) {
            changed.insert(PROP_PROFILES.to_string(), properties::profiles_value(state));
        }
        if mask.contains(PropertyMask::ACTIONS) {
            changed.insert(PROP_ACTIONS.to_string(), properties::actions_value(state));
        }
        if mask.contains(PropertyMask::HOLDS) {
            changed.insert(
                PROP_ACTIVE_PROFILE_HOLDS.to_string(),
                properties::holds_value(state),
            );
        }
        if mask.contains(PropertyMask::VERSION) {
            changed.insert(PROP_VERSION.to_string(), properties::version_value());
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use powerd_core::ipc::{ConnectionId, PROP_PERFORMANCE_DEGRADED, PROP_PERFORMANCE_INHIBITED};
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    use super::*;
    use crate::testutil::{state_in, TestDriver};

    fn registry_with_one_connection() -> (
        ConnectionRegistry,
        mpsc::UnboundedReceiver<ServerMessage>,
    ) {
        let mut registry = ConnectionRegistry::new();
        let (tx, rx) = mpsc::unbounded_channel();
        registry.register(ConnectionId(1), tx);
        (registry, rx)
    }

    #[test]
    fn mask_operations() {
        let mut mask = PropertyMask::NONE;
        assert!(mask.is_empty());
        mask = mask | PropertyMask::ACTIVE_PROFILE | PropertyMask::HOLDS;
        assert!(mask.contains(PropertyMask::ACTIVE_PROFILE));
        assert!(mask.contains(PropertyMask::HOLDS));
        assert!(!mask.contains(PropertyMask::DEGRADED));
        assert!(PropertyMask::ALL.contains(mask));
    }

    #[test]
    fn flush_emits_one_signal_per_interface() {
        let tmp = TempDir::new().unwrap();
        let state = state_in(&tmp);
        let (registry, mut rx) = registry_with_one_connection();

        let mut notifier = Notifier::new();
        notifier.mark(PropertyMask::ACTIVE_PROFILE);
        notifier.mark(PropertyMask::HOLDS);
        notifier.flush(&state, &registry);

        let mut interfaces = Vec::new();
        for _ in 0..2 {
            match rx.try_recv().unwrap() {
                ServerMessage::Signal {
                    signal: DaemonSignal::PropertiesChanged { interface, changed },
                } => {
                    assert_eq!(changed.len(), 2);
                    assert!(changed.contains_key(PROP_ACTIVE_PROFILE));
                    assert!(changed.contains_key(PROP_ACTIVE_PROFILE_HOLDS));
                    interfaces.push(interface);
                },
                other => panic!("unexpected message: {other:?}"),
            }
        }
        assert!(rx.try_recv().is_err());
        assert_eq!(
            interfaces,
            vec![
                Interface::Primary.name().to_string(),
                Interface::Legacy.name().to_string()
            ]
        );

        // The mask is cleared; a second flush is silent.
        notifier.flush(&state, &registry);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn degraded_property_uses_the_legacy_name_on_the_alias() {
        let tmp = TempDir::new().unwrap();
        let mut state = state_in(&tmp);
        state.platform_driver = Some(Box::new(
            TestDriver::platform("plat0").with_degraded("lap-detected"),
        ));
        let (registry, mut rx) = registry_with_one_connection();

        let mut notifier = Notifier::new();
        notifier.mark(PropertyMask::DEGRADED);
        notifier.flush(&state, &registry);

        let expect = [
            (Interface::Primary, PROP_PERFORMANCE_DEGRADED),
            (Interface::Legacy, PROP_PERFORMANCE_INHIBITED),
        ];
        for (interface, property) in expect {
            match rx.try_recv().unwrap() {
                ServerMessage::Signal {
                    signal: DaemonSignal::PropertiesChanged {
                        interface: name,
                        changed,
                    },
                } => {
                    assert_eq!(name, interface.name());
                    assert_eq!(
                        changed.get(property),
                        Some(&PropertyValue::String("lap-detected".to_string()))
                    );
                },
                other => panic!("unexpected message: {other:?}"),
            }
        }
    }
}
