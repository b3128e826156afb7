//! powerd-core - shared contracts for the powerd daemon
//!
//! This crate holds everything the daemon, its plugins, and IPC clients
//! agree on:
//!
//! - [`profile`]: the closed set of power profiles, supported-profile sets,
//!   activation reasons, and probe results
//! - [`driver`]: the capability contracts implemented by hardware drivers
//!   and side-effect actions
//! - [`events`]: typed events plugins emit towards the daemon event loop
//! - [`ipc`]: wire messages, framing, and error codes for the Unix-socket
//!   control surface
//! - [`store`]: the persisted daemon state record
//! - [`auth`]: peer identity and the authorization oracle

pub mod auth;
pub mod driver;
pub mod events;
pub mod ipc;
pub mod profile;
pub mod store;

pub use auth::{Authorizer, PeerIdentity};
pub use driver::{Action, Driver, DriverKind, Plugin};
pub use events::{PluginEvent, PluginEventSender};
pub use profile::{ActivationReason, ProbeResult, Profile, ProfileSet};
