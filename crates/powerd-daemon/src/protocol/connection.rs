//! Per-connection tasks.
//!
//! Each accepted connection splits into a reader and a writer. The
//! reader decodes framed [`ClientMessage`]s and forwards them as
//! [`DaemonEvent::Request`]s; the writer drains the outgoing channel the
//! event loop holds in the connection registry. When the reader ends,
//! for any reason, a single [`DaemonEvent::ConnectionClosed`] is
//! emitted; the event loop unregisters the connection and releases the
//! peer's holds.

use powerd_core::auth::PeerIdentity;
use powerd_core::ipc::{
    self, ClientMessage, ConnectionId, DaemonResponse, ErrorCode, ServerMessage,
};
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::service::DaemonEvent;

/// Drive one connection to completion.
pub async fn run_connection(
    id: ConnectionId,
    stream: UnixStream,
    peer: PeerIdentity,
    events: mpsc::UnboundedSender<DaemonEvent>,
) {
    let (mut reader, mut writer) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    if events
        .send(DaemonEvent::Connected {
            id,
            sender: tx.clone(),
        })
        .is_err()
    {
        // Event loop already gone; nothing to serve.
        return;
    }

    let writer_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let payload = match serde_json::to_vec(&message) {
                Ok(payload) => payload,
                Err(err) => {
                    warn!("could not serialize message for {id}: {err}");
                    continue;
                },
            };
            if let Err(err) = ipc::write_frame(&mut writer, &payload).await {
                debug!("write to {id} failed: {err}");
                break;
            }
        }
    });

    loop {
        let frame = match ipc::read_frame(&mut reader).await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                debug!("{id} closed by peer");
                break;
            },
            Err(err) => {
                debug!("read from {id} failed: {err}");
                break;
            },
        };

        let message: ClientMessage = match serde_json::from_slice(&frame) {
            Ok(message) => message,
            Err(err) => {
                // A frame that still carries a correlation id gets a
                // method error; anything else is a broken client.
                if let Some(reply) = unknown_method_reply(&frame, &err) {
                    let _ = tx.send(reply);
                    continue;
                }
                warn!("dropping {id} after undecodable frame: {err}");
                break;
            },
        };

        if events
            .send(DaemonEvent::Request {
                connection: id,
                peer,
                message_id: message.id,
                request: message.request,
            })
            .is_err()
        {
            break;
        }
    }

    drop(tx);
    let _ = events.send(DaemonEvent::ConnectionClosed(id));
    // The event loop unregisters the connection, dropping its sender;
    // the writer drains what is queued and ends.
    let _ = writer_task.await;
}

/// Build the error reply for a frame that did not decode as a known
/// request but still carries a correlation id.
fn unknown_method_reply(frame: &[u8], err: &serde_json::Error) -> Option<ServerMessage> {
    let value: serde_json::Value = serde_json::from_slice(frame).ok()?;
    let id = value.get("id")?.as_u64()?;
    let code = if value.pointer("/request/type").is_some() {
        ErrorCode::UnknownMethod
    } else {
        ErrorCode::InvalidRequest
    };
    Some(ServerMessage::Reply {
        id,
        response: DaemonResponse::Error {
            code,
            message: format!("cannot handle request: {err}"),
        },
    })
}
