//! Battery charge-throttling action.
//!
//! On power-saver the first device-scoped power supply exposing a
//! `charge_type` attribute is switched to trickle charging; any other
//! profile switches it back to fast charging. Supplies are rescanned on
//! every transition, so devices that appear later are picked up.

use std::fs;
use std::path::PathBuf;

use powerd_core::driver::{Action, ActionError, Plugin};
use powerd_core::events::PluginEventSender;
use powerd_core::profile::Profile;
use tracing::debug;

use super::{read_sysfs, sysfs_root};

/// Name under which the action registers.
pub const ACTION_NAME: &str = "charge_throttle";

const POWER_SUPPLY_DIR: &str = "sys/class/power_supply";
const CHARGE_TYPE_NAME: &str = "charge_type";

/// The charge-throttling action.
pub struct ChargeThrottleAction {
    root: PathBuf,
}

/// Registry constructor.
#[must_use]
pub fn plugin(_events: PluginEventSender) -> Plugin {
    Plugin::Action(Box::new(ChargeThrottleAction::new(sysfs_root())))
}

impl ChargeThrottleAction {
    /// Create the action over a sysfs root.
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn set_charge_type(&self, charge_type: &str) -> Result<(), ActionError> {
        let supply_dir = self.root.join(POWER_SUPPLY_DIR);
        let Ok(entries) = fs::read_dir(&supply_dir) else {
            return Ok(());
        };

        for entry in entries.flatten() {
            let device = entry.path();

            let Ok(scope) = read_sysfs(&device.join("scope")) else {
                continue;
            };
            if scope != "Device" {
                continue;
            }
            let attr = device.join(CHARGE_TYPE_NAME);
            let Ok(current) = read_sysfs(&attr) else {
                continue;
            };
            if current == charge_type {
                continue;
            }

            debug!(
                "updating charge type for '{}' to '{charge_type}'",
                device.display()
            );
            fs::write(&attr, charge_type).map_err(|source| ActionError::Io {
                path: attr.clone(),
                source,
            })?;
            break;
        }

        Ok(())
    }
}

impl Action for ChargeThrottleAction {
    fn name(&self) -> &str {
        ACTION_NAME
    }

    fn probe(&mut self) -> bool {
        true
    }

    fn profile_activated(&mut self, profile: Profile) -> Result<(), ActionError> {
        let charge_type = if profile == Profile::PowerSaver {
            "Trickle"
        } else {
            "Fast"
        };
        self.set_charge_type(charge_type)
    }
}
