//! Connection helper for talking to the daemon.

use std::path::Path;

use anyhow::{bail, Context, Result};
use powerd_core::ipc::{self, ClientMessage, DaemonRequest, DaemonResponse, ServerMessage};
use tokio::net::UnixStream;

/// One connection to the daemon control socket.
pub struct DaemonClient {
    stream: UnixStream,
    next_id: u64,
}

impl DaemonClient {
    /// Connect to the daemon at `path`.
    pub async fn connect(path: &Path) -> Result<Self> {
        let stream = UnixStream::connect(path).await.with_context(|| {
            format!(
                "failed to connect to powerd at '{}' (is the daemon running?)",
                path.display()
            )
        })?;
        Ok(Self { stream, next_id: 1 })
    }

    /// Send one request and wait for its reply, skipping any signals
    /// that arrive in between.
    pub async fn request(&mut self, request: DaemonRequest) -> Result<DaemonResponse> {
        let id = self.next_id;
        self.next_id += 1;

        let payload = serde_json::to_vec(&ClientMessage { id, request })?;
        ipc::write_frame(&mut self.stream, &payload).await?;

        loop {
            let Some(frame) = ipc::read_frame(&mut self.stream).await? else {
                bail!("connection closed by daemon");
            };
            match serde_json::from_slice::<ServerMessage>(&frame)? {
                ServerMessage::Reply {
                    id: reply_id,
                    response,
                } if reply_id == id => return Ok(response),
                ServerMessage::Reply { .. } | ServerMessage::Signal { .. } => {},
            }
        }
    }

    /// Like [`Self::request`], but treats an error response as a
    /// failure.
    pub async fn call(&mut self, request: DaemonRequest) -> Result<DaemonResponse> {
        match self.request(request).await? {
            DaemonResponse::Error { code, message } => {
                bail!("daemon refused the request ({code:?}): {message}")
            },
            response => Ok(response),
        }
    }
}
