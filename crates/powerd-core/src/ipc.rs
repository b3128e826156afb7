//! IPC wire messages and framing.
//!
//! Provides Unix socket-based communication between clients and the
//! daemon. Messages are JSON documents in length-prefixed frames: a
//! 4-byte big-endian length followed by the payload.
//!
//! The daemon object is mirrored under two interface names sharing one
//! underlying state: the primary interface and a legacy-compatible
//! alias. The alias reports the degradation reason under its historical
//! property name (`PerformanceInhibited`); everything else is identical.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::profile::Profile;

/// Maximum frame size in bytes (1 MiB).
///
/// Frames are capped to prevent memory exhaustion; the largest legitimate
/// message on this protocol is a property dump well under a kilobyte.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Get the default control socket path based on environment.
///
/// Priority:
/// 1. `XDG_RUNTIME_DIR/powerd/powerd.sock` if `XDG_RUNTIME_DIR` is set
/// 2. `/run/powerd/powerd.sock` as fallback
#[must_use]
pub fn default_socket_path() -> PathBuf {
    std::env::var_os("XDG_RUNTIME_DIR").map_or_else(
        || PathBuf::from("/run").join("powerd").join("powerd.sock"),
        |runtime_dir| PathBuf::from(runtime_dir).join("powerd").join("powerd.sock"),
    )
}

/// Authorization action name for `ActiveProfile` writes.
pub const ACTION_SWITCH_PROFILE: &str = "switch-profile";
/// Authorization action name for `HoldProfile`.
pub const ACTION_HOLD_PROFILE: &str = "hold-profile";

/// Property names shared by both interfaces.
pub const PROP_ACTIVE_PROFILE: &str = "ActiveProfile";
pub const PROP_PROFILES: &str = "Profiles";
pub const PROP_ACTIONS: &str = "Actions";
pub const PROP_ACTIVE_PROFILE_HOLDS: &str = "ActiveProfileHolds";
pub const PROP_VERSION: &str = "Version";
/// Degradation reason property on the primary interface.
pub const PROP_PERFORMANCE_DEGRADED: &str = "PerformanceDegraded";
/// Degradation reason property on the legacy interface.
pub const PROP_PERFORMANCE_INHIBITED: &str = "PerformanceInhibited";

/// One of the two interface identities the daemon object is exposed
/// under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interface {
    /// The primary interface.
    Primary,
    /// The legacy-compatible alias.
    Legacy,
}

impl Interface {
    /// Both identities, primary first.
    pub const ALL: [Self; 2] = [Self::Primary, Self::Legacy];

    /// The interface name carried on the wire.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Primary => "org.powerd.PowerProfiles",
            Self::Legacy => "org.powerd.PowerProfiles.Legacy",
        }
    }

    /// Resolve a wire interface name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|i| i.name() == name)
    }

    /// The name of the degradation-reason property on this interface.
    #[must_use]
    pub const fn degraded_property(self) -> &'static str {
        match self {
            Self::Primary => PROP_PERFORMANCE_DEGRADED,
            Self::Legacy => PROP_PERFORMANCE_INHIBITED,
        }
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Identity of a connected IPC peer, scoped to the daemon lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// IPC request from client to daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DaemonRequest {
    /// Liveness and version check.
    Ping,

    /// Read a single property.
    GetProperty {
        /// Interface name.
        interface: String,
        /// Property name.
        property: String,
    },

    /// Read every property of an interface.
    GetAllProperties {
        /// Interface name.
        interface: String,
    },

    /// Write a property. Only `ActiveProfile` is writable.
    SetProperty {
        /// Interface name.
        interface: String,
        /// Property name.
        property: String,
        /// New value.
        value: String,
    },

    /// Temporarily hold a profile, overriding the user's selection.
    HoldProfile {
        /// Interface name.
        interface: String,
        /// Requested profile; must be `performance` or `power-saver`.
        profile: String,
        /// Free-form reason.
        reason: String,
        /// Identifier of the requesting application.
        application_id: String,
    },

    /// Release a previously acquired hold.
    ReleaseProfile {
        /// Interface name.
        interface: String,
        /// Cookie returned by `HoldProfile`.
        cookie: u32,
    },
}

/// A property value on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    /// A plain string.
    String(String),
    /// A list of strings.
    StringList(Vec<String>),
    /// The `Profiles` records.
    Profiles(Vec<ProfileEntry>),
    /// The `ActiveProfileHolds` records.
    Holds(Vec<HoldEntry>),
}

/// One record of the `Profiles` property: a profile supported by at
/// least one active driver, with the names of the drivers supplying it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileEntry {
    /// The profile.
    pub profile: Profile,
    /// Name of the CPU driver supporting it, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_driver: Option<String>,
    /// Name of the platform driver supporting it, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_driver: Option<String>,
}

/// One record of the `ActiveProfileHolds` property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldEntry {
    /// Identifier of the holding application.
    pub application_id: String,
    /// The held profile.
    pub profile: Profile,
    /// Free-form reason given by the application.
    pub reason: String,
}

/// IPC response from daemon to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DaemonResponse {
    /// Reply to `Ping`.
    Pong {
        /// Daemon version.
        version: String,
        /// Daemon uptime in seconds.
        uptime_secs: u64,
    },

    /// A single property value.
    Property {
        /// The value.
        value: PropertyValue,
    },

    /// All properties of an interface.
    Properties {
        /// Property name to value.
        values: BTreeMap<String, PropertyValue>,
    },

    /// Reply to a successful `HoldProfile`.
    Hold {
        /// Cookie identifying the hold.
        cookie: u32,
    },

    /// Operation success with no payload.
    Ok,

    /// Operation error.
    Error {
        /// Error code.
        code: ErrorCode,
        /// Human-readable message.
        message: String,
    },
}

/// Signal pushed by the daemon without a preceding request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DaemonSignal {
    /// Batched property-change notification for one interface identity.
    PropertiesChanged {
        /// Interface name.
        interface: String,
        /// The properties that changed, with their new values.
        changed: BTreeMap<String, PropertyValue>,
    },

    /// A hold ended, for any reason. Sent only to the hold's requester.
    ProfileReleased {
        /// Interface the hold was taken on.
        interface: String,
        /// Cookie of the released hold.
        cookie: u32,
    },
}

/// Client-to-daemon envelope: a request with a correlation id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientMessage {
    /// Correlation id echoed back in the reply.
    pub id: u64,
    /// The request.
    pub request: DaemonRequest,
}

/// Daemon-to-client envelope: a reply or an unsolicited signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Reply to the request with the same id.
    Reply {
        /// Correlation id of the request.
        id: u64,
        /// The response.
        response: DaemonResponse,
    },
    /// Unsolicited signal.
    Signal {
        /// The signal.
        signal: DaemonSignal,
    },
}

/// Error codes for IPC responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The profile name is not one of the three known profiles, or is
    /// not valid for the operation.
    InvalidProfileName,
    /// No active driver supports the profile.
    ProfileUnavailable,
    /// The profile is selectable but a driver reports it inhibited.
    Inhibited,
    /// A driver failed to apply the profile.
    DriverActivationFailed,
    /// The authorization oracle denied the operation.
    Unauthorized,
    /// No hold with the given cookie exists.
    UnknownHoldCookie,
    /// The request names a method the daemon does not implement.
    UnknownMethod,
    /// The property does not exist on the interface.
    UnknownProperty,
    /// The property exists but cannot be written.
    PropertyReadOnly,
    /// The interface name is not exposed by the daemon.
    UnknownInterface,
    /// The request could not be handled as sent.
    InvalidRequest,
    /// An internal daemon error.
    InternalError,
}

/// IPC transport errors.
#[derive(Debug, Error)]
pub enum IpcError {
    /// Connection failed.
    #[error("failed to connect to daemon: {0}")]
    ConnectionFailed(String),

    /// The peer closed the connection.
    #[error("connection closed")]
    ConnectionClosed,

    /// A frame exceeds the maximum allowed size.
    ///
    /// Detected before allocation to prevent memory exhaustion.
    #[error("frame too large: {size} bytes exceeds maximum {max} bytes")]
    FrameTooLarge {
        /// Size from the length prefix.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Frame a message for IPC transport.
///
/// Format: 4-byte big-endian length prefix + JSON payload.
#[must_use]
#[allow(clippy::cast_possible_truncation)] // callers respect MAX_FRAME_SIZE
pub fn frame_message(message: &[u8]) -> Vec<u8> {
    let len = message.len() as u32;
    let mut framed = Vec::with_capacity(4 + message.len());
    framed.extend_from_slice(&len.to_be_bytes());
    framed.extend_from_slice(message);
    framed
}

/// Read one frame.
///
/// Returns `Ok(None)` when the peer closed the connection before a new
/// frame started.
///
/// # Errors
///
/// Returns an [`IpcError`] on oversized frames and I/O failures; a
/// connection closed mid-frame is an I/O failure, not a clean close.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>, IpcError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {},
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(IpcError::Io(err)),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(IpcError::FrameTooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

/// Write one frame.
///
/// # Errors
///
/// Returns an [`IpcError`] on oversized payloads and I/O failures.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), IpcError>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_FRAME_SIZE {
        return Err(IpcError::FrameTooLarge {
            size: payload.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    #[allow(clippy::cast_possible_truncation)] // checked against MAX_FRAME_SIZE
    let len = payload.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}
