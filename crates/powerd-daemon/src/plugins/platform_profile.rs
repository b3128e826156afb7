//! Platform driver over the ACPI platform-profile interface.
//!
//! Consumes the kernel's `platform_profile` sysfs API, which is how
//! system-specific firmware profiles are meant to be exposed; the probe
//! requires the choices file to offer the low-power, balanced, and
//! performance values this driver maps onto.

use std::fs;
use std::path::PathBuf;

use powerd_core::driver::{Driver, DriverError, DriverKind, Plugin};
use powerd_core::events::PluginEventSender;
use powerd_core::profile::{ActivationReason, ProbeResult, Profile, ProfileSet};
use tracing::debug;

use super::{read_sysfs, sysfs_root};

/// Name under which the driver registers.
pub const DRIVER_NAME: &str = "platform_profile";

const PROFILE_PATH: &str = "sys/firmware/acpi/platform_profile";
const CHOICES_PATH: &str = "sys/firmware/acpi/platform_profile_choices";

/// The ACPI platform-profile driver.
pub struct PlatformProfileDriver {
    root: PathBuf,
    current: Option<Profile>,
}

/// Registry constructor.
#[must_use]
pub fn plugin(_events: PluginEventSender) -> Plugin {
    Plugin::Driver(Box::new(PlatformProfileDriver::new(sysfs_root())))
}

impl PlatformProfileDriver {
    /// Create the driver over a sysfs root.
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            current: None,
        }
    }

    fn verify_choices(&self) -> bool {
        let Ok(choices) = read_sysfs(&self.root.join(CHOICES_PATH)) else {
            return false;
        };
        let choices: Vec<&str> = choices.split_whitespace().collect();
        ["low-power", "balanced", "performance"]
            .iter()
            .all(|value| choices.contains(value))
    }
}

impl Driver for PlatformProfileDriver {
    fn name(&self) -> &str {
        DRIVER_NAME
    }

    fn kind(&self) -> DriverKind {
        DriverKind::Platform
    }

    fn profiles(&self) -> ProfileSet {
        ProfileSet::ALL
    }

    fn probe(&mut self) -> ProbeResult {
        let profile_path = self.root.join(PROFILE_PATH);
        if !profile_path.exists() {
            debug!("no platform_profile sysfs file");
            return ProbeResult::Fail;
        }
        if !self.verify_choices() {
            debug!("no supported platform_profile choices");
            return ProbeResult::Fail;
        }

        if let Ok(value) = read_sysfs(&profile_path) {
            self.current = acpi_value_to_profile(&value);
        }
        ProbeResult::Success
    }

    fn activate(&mut self, profile: Profile, _reason: ActivationReason) -> Result<(), DriverError> {
        if self.current == Some(profile) {
            debug!("not switching to '{profile}', already there");
            return Ok(());
        }

        let path = self.root.join(PROFILE_PATH);
        fs::write(&path, profile_to_acpi_value(profile)).map_err(|source| DriverError::Io {
            path,
            source,
        })?;
        debug!("successfully switched to profile '{profile}'");
        self.current = Some(profile);
        Ok(())
    }
}

const fn profile_to_acpi_value(profile: Profile) -> &'static str {
    match profile {
        Profile::PowerSaver => "low-power",
        Profile::Balanced => "balanced",
        Profile::Performance => "performance",
    }
}

fn acpi_value_to_profile(value: &str) -> Option<Profile> {
    match value.chars().next() {
        // low-power, cool, quiet
        Some('l' | 'c' | 'q') => Some(Profile::PowerSaver),
        Some('b') => Some(Profile::Balanced),
        Some('p') => Some(Profile::Performance),
        _ => {
            debug!("unsupported platform_profile value '{value}'");
            None
        },
    }
}
