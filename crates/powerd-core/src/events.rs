//! Typed events emitted by plugins towards the daemon event loop.
//!
//! Plugins never call back into daemon state. They emit [`PluginEvent`]s
//! on a channel handed to their constructor; the daemon event loop
//! consumes them one at a time on its single thread, so plugin-triggered
//! transitions interleave atomically with IPC requests.

use tokio::sync::mpsc;
use tracing::debug;

use crate::profile::Profile;

/// An event a plugin reports to the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginEvent {
    /// A driver observed its profile change outside the daemon's control,
    /// e.g. a firmware hotkey toggled the platform state.
    ProfileChanged {
        /// Name of the reporting driver.
        driver: String,
        /// The profile the hardware is now on.
        profile: Profile,
    },

    /// A driver's performance-degraded reason changed.
    DegradedChanged {
        /// Name of the reporting driver.
        driver: String,
    },

    /// A deferred driver announces that a new probe cycle is worthwhile,
    /// e.g. because required kernel support appeared.
    ProbeRequest {
        /// Name of the requesting driver.
        driver: String,
    },
}

/// Cloneable handle plugins use to emit events.
#[derive(Debug, Clone)]
pub struct PluginEventSender(mpsc::UnboundedSender<PluginEvent>);

impl PluginEventSender {
    /// Emit an event. Dropped silently when the daemon loop is gone,
    /// which only happens during shutdown.
    pub fn send(&self, event: PluginEvent) {
        if self.0.send(event).is_err() {
            debug!("dropping plugin event, daemon event loop has shut down");
        }
    }
}

/// Create the plugin event channel.
#[must_use]
pub fn plugin_event_channel() -> (PluginEventSender, mpsc::UnboundedReceiver<PluginEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (PluginEventSender(tx), rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_arrive_in_order() {
        let (sender, mut rx) = plugin_event_channel();
        sender.send(PluginEvent::ProbeRequest {
            driver: "fake".to_string(),
        });
        sender.send(PluginEvent::ProfileChanged {
            driver: "fake".to_string(),
            profile: Profile::Performance,
        });

        assert_eq!(
            rx.try_recv().unwrap(),
            PluginEvent::ProbeRequest {
                driver: "fake".to_string()
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            PluginEvent::ProfileChanged {
                driver: "fake".to_string(),
                profile: Profile::Performance,
            }
        );
    }

    #[test]
    fn send_after_receiver_dropped_is_ignored() {
        let (sender, rx) = plugin_event_channel();
        drop(rx);
        sender.send(PluginEvent::DegradedChanged {
            driver: "fake".to_string(),
        });
    }
}
