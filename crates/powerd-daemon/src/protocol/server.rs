//! Socket setup and the accept loop.
//!
//! One Unix socket carries the whole control surface. The socket file is
//! world-connectable: property reads are unauthenticated, and the two
//! mutating operations are gated by the authorization oracle using the
//! peer credentials captured here at accept time.
//!
//! - Stale socket files are removed before binding
//! - Permissions are set after binding
//! - Peer identity comes from `SO_PEERCRED`, never from the client

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use powerd_core::auth::PeerIdentity;
use powerd_core::ipc::ConnectionId;
use thiserror::Error;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::service::DaemonEvent;

pub use powerd_core::ipc::default_socket_path;

/// Socket permissions: world-connectable, writes are gated by the
/// authorization oracle instead of filesystem modes.
const SOCKET_MODE: u32 = 0o666;

/// Parent directory permissions.
const DIRECTORY_MODE: u32 = 0o755;

/// Errors binding or accepting on the control socket.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Binding the socket failed.
    #[error("failed to bind socket {path}: {source}")]
    Bind {
        /// Socket path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// Preparing the socket directory failed.
    #[error("failed to prepare socket directory {path}: {source}")]
    Directory {
        /// Directory path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// Accepting a connection failed.
    #[error("failed to accept connection: {0}")]
    Accept(#[source] io::Error),
}

/// The bound control socket.
pub struct ProtocolServer {
    listener: UnixListener,
    path: PathBuf,
}

impl ProtocolServer {
    /// Bind the control socket at `path`.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolError`] when the directory cannot be
    /// prepared or the socket cannot be bound.
    pub fn bind(path: &Path) -> Result<Self, ProtocolError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ProtocolError::Directory {
                path: parent.to_path_buf(),
                source,
            })?;
            if let Err(err) =
                fs::set_permissions(parent, fs::Permissions::from_mode(DIRECTORY_MODE))
            {
                warn!("could not set socket directory permissions: {err}");
            }
        }

        // Remove a stale socket file from a previous run.
        match fs::remove_file(path) {
            Ok(()) => debug!("removed stale socket file '{}'", path.display()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {},
            Err(err) => {
                warn!("could not remove stale socket '{}': {err}", path.display());
            },
        }

        let listener = UnixListener::bind(path).map_err(|source| ProtocolError::Bind {
            path: path.to_path_buf(),
            source,
        })?;

        // Permissions are set AFTER binding so no window exists where a
        // wider mode applies to a not-yet-ours path.
        if let Err(err) = fs::set_permissions(path, fs::Permissions::from_mode(SOCKET_MODE)) {
            warn!("could not set socket permissions: {err}");
        }

        info!("listening on '{}'", path.display());
        Ok(Self {
            listener,
            path: path.to_path_buf(),
        })
    }

    /// The bound socket path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept one connection and capture its peer credentials.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolError`] when the accept fails.
    pub async fn accept(&self) -> Result<(UnixStream, PeerIdentity), ProtocolError> {
        let (stream, _addr) = self.listener.accept().await.map_err(ProtocolError::Accept)?;
        let peer = peer_identity(&stream)?;
        Ok((stream, peer))
    }

    /// Run the accept loop forever, spawning one task per connection.
    pub async fn serve(self, events: mpsc::UnboundedSender<DaemonEvent>) {
        let mut next_id: u64 = 1;
        loop {
            match self.accept().await {
                Ok((stream, peer)) => {
                    let id = ConnectionId(next_id);
                    next_id += 1;
                    debug!("accepted {id} from uid {} pid {:?}", peer.uid, peer.pid);
                    tokio::spawn(super::connection::run_connection(
                        id,
                        stream,
                        peer,
                        events.clone(),
                    ));
                },
                Err(err) => {
                    warn!("{err}");
                },
            }
        }
    }
}

fn peer_identity(stream: &UnixStream) -> Result<PeerIdentity, ProtocolError> {
    let cred = stream.peer_cred().map_err(ProtocolError::Accept)?;
    Ok(PeerIdentity {
        uid: cred.uid(),
        gid: cred.gid(),
        pid: cred.pid(),
    })
}
