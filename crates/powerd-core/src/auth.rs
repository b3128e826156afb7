//! Peer identity and the authorization oracle.
//!
//! The daemon consults a single yes/no oracle before `ActiveProfile`
//! writes and before `HoldProfile`. The oracle is a trait so the policy
//! stays out of the core: the production implementation answers from the
//! peer's Unix credentials, tests substitute fixed answers.

use nix::unistd::Uid;

/// Unix credentials of a connected peer, captured from `SO_PEERCRED`
/// at accept time. Determined by the kernel, never by client assertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerIdentity {
    /// Effective user id of the peer process.
    pub uid: u32,
    /// Effective group id of the peer process.
    pub gid: u32,
    /// Process id of the peer, when the platform reports one.
    pub pid: Option<i32>,
}

/// The authorization oracle.
pub trait Authorizer: Send {
    /// Whether `peer` may perform `action`.
    ///
    /// Action names are [`crate::ipc::ACTION_SWITCH_PROFILE`] and
    /// [`crate::ipc::ACTION_HOLD_PROFILE`].
    fn check(&self, peer: &PeerIdentity, action: &str) -> bool;
}

/// Production oracle: root and the daemon's own user are allowed,
/// everyone else is denied.
#[derive(Debug)]
pub struct UidAuthorizer {
    daemon_uid: u32,
}

impl UidAuthorizer {
    /// Create an oracle bound to the daemon's effective uid.
    #[must_use]
    pub fn new() -> Self {
        Self {
            daemon_uid: Uid::effective().as_raw(),
        }
    }
}

impl Default for UidAuthorizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Authorizer for UidAuthorizer {
    fn check(&self, peer: &PeerIdentity, _action: &str) -> bool {
        peer.uid == 0 || peer.uid == self.daemon_uid
    }
}

/// Oracle that allows everything. Test use only.
#[derive(Debug, Default)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn check(&self, _peer: &PeerIdentity, _action: &str) -> bool {
        true
    }
}

/// Oracle that denies everything. Test use only.
#[derive(Debug, Default)]
pub struct DenyAll;

impl Authorizer for DenyAll {
    fn check(&self, _peer: &PeerIdentity, _action: &str) -> bool {
        false
    }
}
