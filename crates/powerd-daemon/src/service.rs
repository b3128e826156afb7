//! The daemon event loop.
//!
//! All daemon state is owned here and mutated from exactly one task.
//! IPC requests, plugin events, and connection closures arrive on a
//! single channel and are handled to completion one at a time, so every
//! external observer sees either the pre- or the post-transition state,
//! never an intermediate one. Dirty notifications are flushed once per
//! event, coalescing cascaded transitions into one signal per interface.

use std::time::Instant;

use powerd_core::auth::{Authorizer, PeerIdentity};
use powerd_core::driver::Driver;
use powerd_core::events::{PluginEvent, PluginEventSender};
use powerd_core::ipc::{ConnectionId, DaemonRequest, ServerMessage};
use powerd_core::profile::Profile;
use powerd_core::store::StateStore;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::dispatch;
use crate::engine;
use crate::holds;
use crate::notify::{Notifier, PropertyMask};
use crate::orchestrator::{Orchestrator, PluginConstructor, StartupError};
use crate::protocol::registry::ConnectionRegistry;
use crate::state::DaemonState;

/// Everything the event loop reacts to.
#[derive(Debug)]
pub enum DaemonEvent {
    /// A connection task announced itself.
    Connected {
        /// Connection identity.
        id: ConnectionId,
        /// Sender for replies and signals to this connection.
        sender: mpsc::UnboundedSender<ServerMessage>,
    },

    /// A decoded client request.
    Request {
        /// Originating connection.
        connection: ConnectionId,
        /// Peer credentials captured at accept time.
        peer: PeerIdentity,
        /// Correlation id to echo in the reply.
        message_id: u64,
        /// The request.
        request: DaemonRequest,
    },

    /// An event from a plugin.
    Plugin(PluginEvent),

    /// A connection ended; release the peer's holds.
    ConnectionClosed(ConnectionId),

    /// Terminate the loop cleanly.
    Shutdown,
}

/// The daemon: state plus the components operating on it.
pub struct Daemon {
    state: DaemonState,
    notifier: Notifier,
    connections: ConnectionRegistry,
    orchestrator: Orchestrator,
    auth: Box<dyn Authorizer>,
    started: Instant,
}

impl Daemon {
    /// Assemble a daemon around a loaded store and a plugin registry.
    #[must_use]
    pub fn new(
        store: StateStore,
        registry: Vec<PluginConstructor>,
        plugin_events: PluginEventSender,
        auth: Box<dyn Authorizer>,
    ) -> Self {
        Self {
            state: DaemonState::new(store),
            notifier: Notifier::new(),
            connections: ConnectionRegistry::new(),
            orchestrator: Orchestrator::new(registry, plugin_events),
            auth,
            started: Instant::now(),
        }
    }

    /// Run the initial probe cycle and apply the initial profile.
    ///
    /// # Errors
    ///
    /// Returns [`StartupError`] when driver coverage is insufficient;
    /// the caller exits with a non-zero status.
    pub fn start(&mut self) -> Result<(), StartupError> {
        self.orchestrator.start(&mut self.state, &mut self.notifier)?;
        self.notifier.flush(&self.state, &self.connections);
        Ok(())
    }

    /// The daemon state, for inspection in tests.
    #[must_use]
    pub const fn state(&self) -> &DaemonState {
        &self.state
    }

    /// Consume events until shutdown. Returns the process exit code.
    pub async fn run(&mut self, mut events: mpsc::UnboundedReceiver<DaemonEvent>) -> u8 {
        while let Some(event) = events.recv().await {
            match event {
                DaemonEvent::Connected { id, sender } => {
                    self.connections.register(id, sender);
                },

                DaemonEvent::Request {
                    connection,
                    peer,
                    message_id,
                    request,
                } => {
                    let response = dispatch::handle_request(
                        &mut self.state,
                        &mut self.notifier,
                        &self.connections,
                        self.auth.as_ref(),
                        connection,
                        &peer,
                        self.started.elapsed().as_secs(),
                        request,
                    );
                    self.connections.send_to(
                        connection,
                        &ServerMessage::Reply {
                            id: message_id,
                            response,
                        },
                    );
                },

                DaemonEvent::Plugin(event) => {
                    if let Err(err) = self.handle_plugin_event(event) {
                        error!("cannot restart profile drivers: {err}");
                        return 1;
                    }
                },

                DaemonEvent::ConnectionClosed(id) => {
                    self.connections.unregister(id);
                    holds::requester_disconnected(
                        &mut self.state,
                        &mut self.notifier,
                        &self.connections,
                        id,
                    );
                },

                DaemonEvent::Shutdown => {
                    info!("shutting down");
                    self.orchestrator.stop(
                        &mut self.state,
                        &mut self.notifier,
                        &self.connections,
                    );
                    self.notifier.flush(&self.state, &self.connections);
                    return 0;
                },
            }

            self.notifier.flush(&self.state, &self.connections);
        }
        0
    }

    fn handle_plugin_event(&mut self, event: PluginEvent) -> Result<(), StartupError> {
        match event {
            PluginEvent::ProfileChanged { driver, profile } => {
                engine::handle_external_profile_change(
                    &mut self.state,
                    &mut self.notifier,
                    &driver,
                    profile,
                );
            },
            PluginEvent::DegradedChanged { driver } => {
                let supports_performance = self.state.registered_drivers().any(|d| {
                    d.name() == driver && d.profiles().contains(Profile::Performance)
                });
                if supports_performance {
                    self.notifier.mark(PropertyMask::DEGRADED);
                } else {
                    warn!(
                        "ignoring degraded-reason change on non-performance driver '{driver}'"
                    );
                }
            },
            PluginEvent::ProbeRequest { driver } => {
                info!("driver '{driver}' requested a new probe cycle");
                self.orchestrator.restart(
                    &mut self.state,
                    &mut self.notifier,
                    &self.connections,
                )?;
            },
        }
        Ok(())
    }
}
