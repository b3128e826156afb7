//! The fake driver, for development and integration testing.
//!
//! Disabled unless `POWERD_FAKE_DRIVER=1` is set. Supports every
//! profile, records activations without touching hardware, and drives
//! the plugin event channel from a small stdin console:
//!
//! - `i` toggles the performance-degraded reason
//! - `r` fires a probe request, restarting the probe cycle
//! - `p <profile>` reports an external profile change
//! - `q` quits the console

use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use powerd_core::driver::{Driver, DriverError, DriverKind, Plugin};
use powerd_core::events::{PluginEvent, PluginEventSender};
use powerd_core::profile::{ActivationReason, ProbeResult, Profile, ProfileSet};
use tracing::{debug, info, warn};

/// Name under which the driver registers.
pub const DRIVER_NAME: &str = "fake";

/// Environment variable enabling the fake driver.
pub const FAKE_DRIVER_ENV: &str = "POWERD_FAKE_DRIVER";

/// Only one console thread per process, across probe cycles.
static CONSOLE_CLAIMED: AtomicBool = AtomicBool::new(false);

/// The fake driver.
pub struct FakeDriver {
    events: PluginEventSender,
    inhibited: Arc<AtomicBool>,
    activated: Option<Profile>,
}

/// Registry constructor.
#[must_use]
pub fn plugin(events: PluginEventSender) -> Plugin {
    Plugin::Driver(Box::new(FakeDriver::new(events)))
}

impl FakeDriver {
    /// Create the driver. It stays dormant until probed.
    #[must_use]
    pub fn new(events: PluginEventSender) -> Self {
        Self {
            events,
            inhibited: Arc::new(AtomicBool::new(false)),
            activated: None,
        }
    }

    fn spawn_console(&self) {
        if CONSOLE_CLAIMED.swap(true, Ordering::SeqCst) {
            return;
        }

        let events = self.events.clone();
        let inhibited = Arc::clone(&self.inhibited);
        std::thread::spawn(move || {
            info!("fake driver console: i (toggle inhibition), r (restart drivers), p <profile>, q (quit console)");
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                match line.trim() {
                    "i" => {
                        let now = !inhibited.load(Ordering::SeqCst);
                        inhibited.store(now, Ordering::SeqCst);
                        info!("fake driver inhibition is now {now}");
                        events.send(PluginEvent::DegradedChanged {
                            driver: DRIVER_NAME.to_string(),
                        });
                    },
                    "r" => {
                        info!("fake driver requesting a probe cycle");
                        events.send(PluginEvent::ProbeRequest {
                            driver: DRIVER_NAME.to_string(),
                        });
                    },
                    "q" => break,
                    other => {
                        if let Some(name) = other.strip_prefix("p ") {
                            match name.trim().parse::<Profile>() {
                                Ok(profile) => events.send(PluginEvent::ProfileChanged {
                                    driver: DRIVER_NAME.to_string(),
                                    profile,
                                }),
                                Err(err) => warn!("fake driver console: {err}"),
                            }
                        } else {
                            info!("valid keys are: i, r, p <profile>, q");
                        }
                    },
                }
            }
        });
    }
}

impl Driver for FakeDriver {
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
        if std::env::var_os(FAKE_DRIVER_ENV).is_none() {
            return ProbeResult::Fail;
        }
        self.spawn_console();
        ProbeResult::Success
    }

    fn activate(&mut self, profile: Profile, reason: ActivationReason) -> Result<(), DriverError> {
        debug!("fake driver activating '{profile}' for reason '{reason}'");
        self.activated = Some(profile);
        Ok(())
    }

    fn performance_degraded(&self) -> Option<String> {
        if self.inhibited.load(Ordering::SeqCst) {
            Some("lap-detected".to_string())
        } else {
            None
        }
    }
}
