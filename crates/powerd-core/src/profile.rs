//! Power profiles and the vocabulary around them.
//!
//! A [`Profile`] is the user-visible unit of system power behavior. The
//! daemon state always holds a single profile; drivers advertise the set
//! they can realize as a [`ProfileSet`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One of the three power profiles a machine can run under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Profile {
    /// The battery-saving profile.
    PowerSaver,
    /// The default profile.
    Balanced,
    /// As fast as possible, regardless of noise or battery consumption.
    /// Only available on some systems.
    Performance,
}

impl Profile {
    /// All profiles, in precedence-scan order.
    pub const ALL: [Self; 3] = [Self::PowerSaver, Self::Balanced, Self::Performance];

    /// The canonical string form used on the wire and in persisted state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PowerSaver => "power-saver",
            Self::Balanced => "balanced",
            Self::Performance => "performance",
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not a known profile name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid profile name '{0}'")]
pub struct ProfileParseError(pub String);

impl FromStr for Profile {
    type Err = ProfileParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "power-saver" => Ok(Self::PowerSaver),
            "balanced" => Ok(Self::Balanced),
            "performance" => Ok(Self::Performance),
            other => Err(ProfileParseError(other.to_string())),
        }
    }
}

/// A set of profiles, as advertised by a driver.
///
/// Never empty for a registered driver; the orchestrator discards drivers
/// that advertise an empty set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProfileSet(u8);

impl ProfileSet {
    /// The empty set.
    pub const EMPTY: Self = Self(0);
    /// All three profiles.
    pub const ALL: Self = Self(0b111);

    const fn bit(profile: Profile) -> u8 {
        match profile {
            Profile::PowerSaver => 1 << 0,
            Profile::Balanced => 1 << 1,
            Profile::Performance => 1 << 2,
        }
    }

    /// Build a set from a list of profiles.
    #[must_use]
    pub fn from_profiles(profiles: &[Profile]) -> Self {
        let mut set = Self::EMPTY;
        for profile in profiles {
            set.insert(*profile);
        }
        set
    }

    /// Add a profile to the set.
    pub fn insert(&mut self, profile: Profile) {
        self.0 |= Self::bit(profile);
    }

    /// Whether the set contains `profile`.
    #[must_use]
    pub const fn contains(self, profile: Profile) -> bool {
        self.0 & Self::bit(profile) != 0
    }

    /// Whether the set is empty.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterate the contained profiles in canonical order.
    pub fn iter(self) -> impl Iterator<Item = Profile> {
        Profile::ALL.into_iter().filter(move |p| self.contains(*p))
    }
}

impl FromIterator<Profile> for ProfileSet {
    fn from_iter<I: IntoIterator<Item = Profile>>(iter: I) -> Self {
        let mut set = Self::EMPTY;
        for profile in iter {
            set.insert(profile);
        }
        set
    }
}

/// Why a profile activation is happening.
///
/// Drivers may interpret the reason; notably a driver is free to treat an
/// `Internal` activation as an echo of a state change it reported itself.
/// Only `User` and `Internal` activations are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationReason {
    /// The driver profile changed internally, usually because of a key
    /// combination, and the daemon is following it.
    Internal,
    /// Setting the profile on startup or because drivers are reprobed.
    Reset,
    /// The user requested the profile.
    User,
    /// A program requested the profile through a hold.
    ProgramHold,
}

impl ActivationReason {
    /// Short string form for log lines.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Internal => "internal",
            Self::Reset => "reset",
            Self::User => "user",
            Self::ProgramHold => "program-hold",
        }
    }

    /// Whether activations for this reason are written to the state store.
    #[must_use]
    pub const fn persists(self) -> bool {
        matches!(self, Self::User | Self::Internal)
    }
}

impl fmt::Display for ActivationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a plugin probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    /// The plugin loaded successfully and should be registered.
    Success,
    /// The plugin failed to load and should be discarded.
    Fail,
    /// The plugin should be kept alive without being registered, as
    /// kernel support might appear later.
    Defer,
}
