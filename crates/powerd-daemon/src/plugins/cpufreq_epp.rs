//! CPU driver over the cpufreq energy-performance preference.
//!
//! Drives `scaling_governor` and `energy_performance_preference` for
//! every cpufreq policy that exposes an EPP file. When a P-State
//! scaling driver is present but not running in active mode, the probe
//! defers rather than fails: the kernel can be switched to active mode
//! at runtime, at which point a new probe cycle will succeed.
//!
//! A partial write failure restores the previously activated profile on
//! the policies so the package of knobs never stays half-applied.

use std::fs;
use std::path::{Path, PathBuf};

use powerd_core::driver::{Driver, DriverError, DriverKind, Plugin};
use powerd_core::events::PluginEventSender;
use powerd_core::profile::{ActivationReason, ProbeResult, Profile, ProfileSet};
use tracing::{debug, warn};

use super::{read_sysfs, sysfs_root};

/// Name under which the driver registers.
pub const DRIVER_NAME: &str = "cpufreq_epp";

const CPU_DIR: &str = "sys/devices/system/cpu";
const POLICY_SUBDIR: &str = "cpufreq";
const EPP_NAME: &str = "energy_performance_preference";
const GOVERNOR_NAME: &str = "scaling_governor";
const PSTATE_DRIVERS: [&str; 2] = ["amd_pstate", "intel_pstate"];

/// The EPP cpufreq driver.
pub struct CpufreqEppDriver {
    root: PathBuf,
    policies: Vec<PathBuf>,
    activated: Option<Profile>,
}

/// Registry constructor.
#[must_use]
pub fn plugin(_events: PluginEventSender) -> Plugin {
    Plugin::Driver(Box::new(CpufreqEppDriver::new(sysfs_root())))
}

impl CpufreqEppDriver {
    /// Create the driver over a sysfs root.
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            policies: Vec::new(),
            activated: None,
        }
    }

    fn probe_policies(&mut self) -> ProbeResult {
        // A P-State driver in passive or guided mode hides the EPP
        // files; the mode can change under us, so keep the candidate.
        for pstate in PSTATE_DRIVERS {
            let status_path = self.root.join(CPU_DIR).join(pstate).join("status");
            if let Ok(status) = read_sysfs(&status_path) {
                if status != "active" {
                    debug!("{pstate} is not running in active mode");
                    return ProbeResult::Defer;
                }
            }
        }

        let policy_dir = self.root.join(CPU_DIR).join(POLICY_SUBDIR);
        let entries = match fs::read_dir(&policy_dir) {
            Ok(entries) => entries,
            Err(err) => {
                debug!("could not open '{}': {err}", policy_dir.display());
                return ProbeResult::Fail;
            },
        };

        for entry in entries.flatten() {
            let base = entry.path();
            if base.join(EPP_NAME).exists() {
                self.policies.push(base);
            }
        }
        self.policies.sort();

        if self.policies.is_empty() {
            ProbeResult::Fail
        } else {
            ProbeResult::Success
        }
    }

    fn apply_to_policies(policies: &[PathBuf], profile: Profile) -> Result<(), DriverError> {
        for base in policies {
            write_attr(&base.join(GOVERNOR_NAME), profile_to_governor(profile))?;
            write_attr(&base.join(EPP_NAME), profile_to_epp(profile))?;
        }
        Ok(())
    }
}

impl Driver for CpufreqEppDriver {
    fn name(&self) -> &str {
        DRIVER_NAME
    }

    fn kind(&self) -> DriverKind {
        DriverKind::Cpu
    }

    fn profiles(&self) -> ProfileSet {
        ProfileSet::ALL
    }

    fn probe(&mut self) -> ProbeResult {
        let result = self.probe_policies();
        debug!(
            "{} EPP policy settings",
            if result == ProbeResult::Success {
                "found"
            } else {
                "didn't find"
            }
        );
        result
    }

    fn activate(&mut self, profile: Profile, _reason: ActivationReason) -> Result<(), DriverError> {
        if let Err(err) = Self::apply_to_policies(&self.policies, profile) {
            if let Some(previous) = self.activated {
                if let Err(restore_err) = Self::apply_to_policies(&self.policies, previous) {
                    warn!("failed to restore previous profile: {restore_err}");
                }
            }
            return Err(err);
        }
        self.activated = Some(profile);
        Ok(())
    }
}

fn write_attr(path: &Path, value: &str) -> Result<(), DriverError> {
    fs::write(path, value).map_err(|source| DriverError::Io {
        path: path.to_path_buf(),
        source,
    })
}

const fn profile_to_governor(profile: Profile) -> &'static str {
    match profile {
        Profile::PowerSaver | Profile::Balanced => "powersave",
        Profile::Performance => "performance",
    }
}

// "energy_performance_available_preferences" is not consulted; these
// values are always accepted.
const fn profile_to_epp(profile: Profile) -> &'static str {
    match profile {
        Profile::PowerSaver => "power",
        Profile::Balanced => "balance_performance",
        Profile::Performance => "performance",
    }
}
