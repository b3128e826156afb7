//! Capability contracts for plugins.
//!
//! Plugins come in three roles: CPU drivers, platform drivers, and
//! actions. The two driver roles share the [`Driver`] trait and are told
//! apart by [`DriverKind`]; the orchestrator dispatches on the tag, never
//! on the concrete type. Actions implement the smaller [`Action`]
//! contract: they are notified of every transition but can neither fail a
//! transition nor roll one back.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::profile::{ActivationReason, ProbeResult, Profile, ProfileSet};

/// The two kinds of hardware drivers.
///
/// At most one driver of each kind is registered at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverKind {
    /// Changes CPU efficiency (frequency scaling, energy-performance
    /// preference) to match the desired state.
    Cpu,
    /// Changes firmware/platform state (ACPI platform profile or a
    /// vendor-specific equivalent) for the whole system.
    Platform,
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => f.write_str("cpu"),
            Self::Platform => f.write_str("platform"),
        }
    }
}

/// Error returned by a failing driver activation.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Sysfs or device I/O failed.
    #[error("failed to write {path}: {source}")]
    Io {
        /// Path that could not be written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The profile is technically selectable but the driver reports it
    /// should not be activated right now.
    #[error("profile is inhibited: {reason}")]
    Inhibited {
        /// Driver-reported reason.
        reason: String,
    },

    /// Any other driver-specific failure.
    #[error("{0}")]
    Other(String),
}

/// Error returned by a failing action.
///
/// Action failures are logged by the activation engine and never
/// propagate further.
#[derive(Debug, Error)]
pub enum ActionError {
    /// Sysfs or device I/O failed.
    #[error("failed to write {path}: {source}")]
    Io {
        /// Path that could not be written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Any other action-specific failure.
    #[error("{0}")]
    Other(String),
}

/// A hardware driver realizing power profiles.
///
/// Drivers are constructed fresh for every probe cycle and receive a
/// [`crate::events::PluginEventSender`] from their constructor; a driver
/// that observes state changes outside the daemon's control reports them
/// through that channel.
pub trait Driver: Send {
    /// Stable driver name, also used to match persisted state.
    fn name(&self) -> &str;

    /// Which driver slot this plugin competes for.
    fn kind(&self) -> DriverKind;

    /// The profiles this driver can realize. Must not be empty.
    fn profiles(&self) -> ProfileSet;

    /// One-time usability check, run once per probe cycle.
    fn probe(&mut self) -> ProbeResult;

    /// Apply `profile` to the hardware.
    ///
    /// # Errors
    ///
    /// Returns a [`DriverError`] when the hardware rejects the change;
    /// the activation engine decides whether to roll back.
    fn activate(&mut self, profile: Profile, reason: ActivationReason) -> Result<(), DriverError>;

    /// Driver-reported reason why Performance is currently degraded,
    /// if any.
    fn performance_degraded(&self) -> Option<String> {
        None
    }
}

/// A side-effect plugin tied to the active profile.
pub trait Action: Send {
    /// Stable action name, listed in the `Actions` property.
    fn name(&self) -> &str;

    /// One-time usability check; `false` discards the action.
    fn probe(&mut self) -> bool;

    /// Notification that the system is now on `profile`.
    ///
    /// # Errors
    ///
    /// Returns an [`ActionError`] on failure; the engine logs it and
    /// moves on.
    fn profile_activated(&mut self, profile: Profile) -> Result<(), ActionError>;
}

/// A freshly constructed plugin, before classification.
pub enum Plugin {
    /// A CPU or platform driver.
    Driver(Box<dyn Driver>),
    /// An action.
    Action(Box<dyn Action>),
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Driver(driver) => f
                .debug_struct("Driver")
                .field("name", &driver.name())
                .field("kind", &driver.kind())
                .finish(),
            Self::Action(action) => {
                f.debug_struct("Action").field("name", &action.name()).finish()
            },
        }
    }
}
