//! Built-in drivers and actions.
//!
//! The probe registry lists hardware-specific driver candidates first,
//! the generic fallback after them, and actions last. Every plugin
//! resolves sysfs paths under an overridable root so tests can point
//! the whole set at a scratch directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::orchestrator::PluginConstructor;

pub mod charge_throttle;
pub mod cpufreq_epp;
pub mod fake;
pub mod placeholder;
pub mod platform_profile;

/// Environment variable overriding the sysfs root.
pub const SYSFS_ROOT_ENV: &str = "POWERD_SYSFS_ROOT";

/// The sysfs root, `/` unless overridden.
#[must_use]
pub fn sysfs_root() -> PathBuf {
    std::env::var_os(SYSFS_ROOT_ENV).map_or_else(|| PathBuf::from("/"), PathBuf::from)
}

/// The production plugin registry, in priority order.
#[must_use]
pub fn default_registry() -> Vec<PluginConstructor> {
    vec![
        // Hardware-specific profile drivers (the fake driver probes
        // successfully only when explicitly enabled).
        Box::new(fake::plugin),
        Box::new(cpufreq_epp::plugin),
        Box::new(platform_profile::plugin),
        // Generic profile driver.
        Box::new(placeholder::plugin),
        // Actions.
        Box::new(charge_throttle::plugin),
    ]
}

/// Read a sysfs attribute, trimming the trailing newline.
pub(crate) fn read_sysfs(path: &Path) -> io::Result<String> {
    fs::read_to_string(path).map(|content| content.trim().to_string())
}
