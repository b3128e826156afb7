//! powerd - power profile arbitration daemon library
//!
//! powerd arbitrates which of the named power profiles (power-saver,
//! balanced, performance) is applied to the machine. It coordinates
//! pluggable hardware drivers and side-effect actions and exposes the
//! resulting state over a Unix-socket IPC surface mirrored under two
//! interface identities.
//!
//! # Modules
//!
//! - [`state`]: the daemon state value owned by the event loop
//! - [`orchestrator`]: plugin discovery, probing, and re-probe cycles
//! - [`engine`]: the profile-activation state machine with rollback
//! - [`holds`]: temporary profile overrides with liveness tracking
//! - [`notify`]: dirty-property aggregation into batched notifications
//! - [`properties`]: property composition for reads and notifications
//! - [`dispatch`]: mapping IPC requests onto state operations
//! - [`protocol`]: Unix-socket server and per-connection tasks
//! - [`plugins`]: the built-in drivers and actions
//! - [`service`]: the single-threaded daemon event loop
//!
//! # Runtime requirements
//!
//! All daemon state lives in one event-loop task; the binary runs a
//! current-thread tokio runtime. Connection tasks perform socket I/O
//! only and forward requests into the loop, so every externally visible
//! transition is handled to completion before the next one starts.

pub mod dispatch;
pub mod engine;
pub mod holds;
pub mod notify;
pub mod orchestrator;
pub mod plugins;
pub mod properties;
pub mod protocol;
pub mod service;
pub mod state;

#[cfg(test)]
pub(crate) mod testutil;

/// Daemon version reported over IPC.
#[must_use]
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
