//! Request dispatch.
//!
//! Maps decoded IPC requests onto state operations and turns their
//! errors into structured IPC error responses. Nothing here ever
//! panics or terminates the daemon; every failure is a reply.

use powerd_core::auth::{Authorizer, PeerIdentity};
use powerd_core::driver::DriverError;
use powerd_core::ipc::{
    ConnectionId, DaemonRequest, DaemonResponse, ErrorCode, Interface, ACTION_HOLD_PROFILE,
    ACTION_SWITCH_PROFILE, PROP_ACTIVE_PROFILE,
};
use powerd_core::profile::Profile;
use tracing::debug;

use crate::engine::ActivationError;
use crate::holds::{self, HoldError, SetProfileError};
use crate::notify::Notifier;
use crate::properties;
use crate::protocol::registry::ConnectionRegistry;
use crate::state::{DaemonState, Requester};

/// Handle one request to completion and produce its reply.
#[allow(clippy::too_many_arguments)] // one call site, the event loop
pub fn handle_request(
    state: &mut DaemonState,
    notifier: &mut Notifier,
    connections: &ConnectionRegistry,
    auth: &dyn Authorizer,
    connection: ConnectionId,
    peer: &PeerIdentity,
    uptime_secs: u64,
    request: DaemonRequest,
) -> DaemonResponse {
    match request {
        DaemonRequest::Ping => DaemonResponse::Pong {
            version: crate::version().to_string(),
            uptime_secs,
        },

        DaemonRequest::GetProperty {
            interface,
            property,
        } => {
            let Some(interface) = resolve_interface(&interface) else {
                return unknown_interface(&interface);
            };
            match properties::property_value(state, interface, &property) {
                Some(value) => DaemonResponse::Property { value },
                None => error(
                    ErrorCode::UnknownProperty,
                    format!("no such property: {property}"),
                ),
            }
        },

        DaemonRequest::GetAllProperties { interface } => {
            let Some(interface) = resolve_interface(&interface) else {
                return unknown_interface(&interface);
            };
            DaemonResponse::Properties {
                values: properties::all_properties(state, interface),
            }
        },

        DaemonRequest::SetProperty {
            interface,
            property,
            value,
        } => {
            let Some(interface) = resolve_interface(&interface) else {
                return unknown_interface(&interface);
            };
            if property != PROP_ACTIVE_PROFILE {
                if properties::property_value(state, interface, &property).is_some() {
                    return error(
                        ErrorCode::PropertyReadOnly,
                        format!("property is read-only: {property}"),
                    );
                }
                return error(
                    ErrorCode::UnknownProperty,
                    format!("no such property: {property}"),
                );
            }
            if !auth.check(peer, ACTION_SWITCH_PROFILE) {
                debug!("denying profile switch for uid {}", peer.uid);
                return error(ErrorCode::Unauthorized, "not authorized".to_string());
            }
            let Ok(profile) = value.parse::<Profile>() else {
                return error(
                    ErrorCode::InvalidProfileName,
                    format!("invalid profile name '{value}'"),
                );
            };
            match holds::set_active_profile(state, notifier, connections, profile) {
                Ok(()) => DaemonResponse::Ok,
                Err(err) => set_profile_error(&err),
            }
        },

        DaemonRequest::HoldProfile {
            interface,
            profile,
            reason,
            application_id,
        } => {
            let Some(interface) = resolve_interface(&interface) else {
                return unknown_interface(&interface);
            };
            if !auth.check(peer, ACTION_HOLD_PROFILE) {
                debug!("denying profile hold for uid {}", peer.uid);
                return error(ErrorCode::Unauthorized, "not authorized".to_string());
            }
            let Ok(profile) = profile.parse::<Profile>() else {
                return error(
                    ErrorCode::InvalidProfileName,
                    format!("invalid profile name '{profile}'"),
                );
            };
            let requester = Requester {
                connection,
                interface,
            };
            match holds::hold_profile(
                state,
                notifier,
                profile,
                &reason,
                &application_id,
                requester,
            ) {
                Ok(cookie) => DaemonResponse::Hold { cookie },
                Err(err) => hold_error(&err),
            }
        },

        DaemonRequest::ReleaseProfile { interface, cookie } => {
            if resolve_interface(&interface).is_none() {
                return unknown_interface(&interface);
            }
            match holds::release_hold(state, notifier, connections, cookie) {
                Ok(()) => DaemonResponse::Ok,
                Err(err) => hold_error(&err),
            }
        },
    }
}

fn resolve_interface(name: &str) -> Option<Interface> {
    Interface::from_name(name)
}

fn unknown_interface(name: &str) -> DaemonResponse {
    error(
        ErrorCode::UnknownInterface,
        format!("unknown interface {name}"),
    )
}

fn error(code: ErrorCode, message: String) -> DaemonResponse {
    DaemonResponse::Error { code, message }
}

fn hold_error(err: &HoldError) -> DaemonResponse {
    let code = match err {
        HoldError::InvalidHoldProfile => ErrorCode::InvalidProfileName,
        HoldError::Unavailable(_) => ErrorCode::ProfileUnavailable,
        HoldError::UnknownCookie(_) => ErrorCode::UnknownHoldCookie,
    };
    error(code, err.to_string())
}

fn set_profile_error(err: &SetProfileError) -> DaemonResponse {
    let code = match err {
        SetProfileError::Unavailable(_) => ErrorCode::ProfileUnavailable,
        SetProfileError::Activation(activation) => activation_code(activation),
    };
    error(code, err.to_string())
}

fn activation_code(err: &ActivationError) -> ErrorCode {
    match err.driver_error() {
        DriverError::Inhibited { .. } => ErrorCode::Inhibited,
        DriverError::Io { .. } | DriverError::Other(_) => ErrorCode::DriverActivationFailed,
    }
}
