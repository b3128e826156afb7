//! The generic fallback driver.
//!
//! Always probes successfully and does nothing on activation. Its job
//! is to guarantee the required balanced and power-saver coverage on
//! systems with no hardware-specific platform driver; performance is
//! deliberately not offered.

use powerd_core::driver::{Driver, DriverError, DriverKind, Plugin};
use powerd_core::events::PluginEventSender;
use powerd_core::profile::{ActivationReason, ProbeResult, Profile, ProfileSet};
use tracing::debug;

/// Name under which the driver registers.
pub const DRIVER_NAME: &str = "placeholder";

/// The fallback platform driver.
pub struct PlaceholderDriver;

/// Registry constructor.
#[must_use]
pub fn plugin(_events: PluginEventSender) -> Plugin {
    Plugin::Driver(Box::new(PlaceholderDriver))
}

impl Driver for PlaceholderDriver {
    fn name(&self) -> &str {
        DRIVER_NAME
    }

    fn kind(&self) -> DriverKind {
        DriverKind::Platform
    }

    fn profiles(&self) -> ProfileSet {
        ProfileSet::from_profiles(&[Profile::PowerSaver, Profile::Balanced])
    }

    fn probe(&mut self) -> ProbeResult {
        ProbeResult::Success
    }

    fn activate(&mut self, profile: Profile, reason: ActivationReason) -> Result<(), DriverError> {
        debug!("placeholder driver activating '{profile}' for reason '{reason}'");
        Ok(())
    }
}
