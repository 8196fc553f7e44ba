//! Consumer side of the channel: accept producer connections and feed their
//! frames to the handler registry.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::BytesMut;
use futures::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;

use crate::error::ChannelError;
use crate::event::{self, EventKind};
use crate::registry::{Handler, SharedRegistry};

use super::{codec, ChannelConfig};

/// Pause after a failed `accept` so a persistent error (e.g. fd exhaustion)
/// does not spin the loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// A bound dispatcher endpoint with its accept loop running in the
/// background.
///
/// At most one producer connection is served at a time. A new connection
/// is held back until its first complete frame arrives; only then does it
/// displace the active one. The old connection is closed between frames and
/// its task awaited before the new one is served, so frames are never
/// processed concurrently. A connection that closes without sending a frame
/// (a probe) never disturbs the active producer.
pub struct Listener {
    local_addr: SocketAddr,
    registry: SharedRegistry,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Bind `config.host:config.port` and start accepting producers.
///
/// Only the bind is awaited; accepting and serving happen on a spawned task.
pub async fn listen(config: &ChannelConfig, registry: SharedRegistry) -> Result<Listener, ChannelError> {
    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
    let local_addr = listener.local_addr()?;
    let cancel = CancellationToken::new();

    let task = tokio::spawn(accept_loop(
        listener,
        registry.clone(),
        config.max_frame_size,
        cancel.clone(),
    ));
    tracing::info!(addr = %local_addr, "dispatcher listening");

    Ok(Listener {
        local_addr,
        registry,
        cancel,
        task,
    })
}

impl Listener {
    /// The bound address (useful when listening on port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// Register `handler` for `kind`, replacing any previous one.
    pub fn register(&self, kind: EventKind, handler: Handler) -> Option<Handler> {
        self.registry.register(kind, handler)
    }

    pub fn unregister(&self, kind: EventKind) -> Option<Handler> {
        self.registry.unregister(kind)
    }

    /// Stop accepting, close the active connection, and wait for the
    /// background task to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Err(e) = (&mut self.task).await {
            tracing::warn!(error = %e, "dispatcher task ended abnormally");
        }
        tracing::info!(addr = %self.local_addr, "dispatcher stopped");
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("local_addr", &self.local_addr)
            .field("registry", &self.registry)
            .finish()
    }
}

type Frames = FramedRead<TcpStream, LengthDelimitedCodec>;

/// Backlog of connections that delivered their first frame but are not
/// served yet.
const PROMOTION_BACKLOG: usize = 8;

/// The serve task for the connection currently being read.
struct ActiveConnection {
    peer: SocketAddr,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ActiveConnection {
    async fn close(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!(peer = %self.peer, error = %e, "connection task ended abnormally");
        }
    }
}

/// A connection whose first frame has been read but not dispatched.
struct Candidate {
    peer: SocketAddr,
    frames: Frames,
    first: BytesMut,
}

async fn accept_loop(
    listener: TcpListener,
    registry: SharedRegistry,
    max_frame_size: usize,
    cancel: CancellationToken,
) {
    let (ready_tx, mut ready_rx) = mpsc::channel::<Candidate>(PROMOTION_BACKLOG);
    let mut active: Option<ActiveConnection> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tracing::debug!(%peer, "producer connection pending first frame");
                    tokio::spawn(await_first_frame(
                        stream,
                        peer,
                        max_frame_size,
                        cancel.child_token(),
                        ready_tx.clone(),
                    ));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to accept producer connection");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
            Some(candidate) = ready_rx.recv() => {
                if let Some(previous) = active.take() {
                    if !previous.task.is_finished() {
                        tracing::info!(
                            old_peer = %previous.peer,
                            new_peer = %candidate.peer,
                            "new producer connection displaces the active one"
                        );
                    }
                    previous.close().await;
                }

                let peer = candidate.peer;
                let conn_cancel = cancel.child_token();
                let task = tokio::spawn(serve_connection(
                    candidate,
                    registry.clone(),
                    conn_cancel.clone(),
                ));
                active = Some(ActiveConnection {
                    peer,
                    cancel: conn_cancel,
                    task,
                });
            }
        }
    }

    if let Some(conn) = active {
        conn.close().await;
    }
}

/// Wait for a new connection's first frame and hand it to the accept loop.
async fn await_first_frame(
    stream: TcpStream,
    peer: SocketAddr,
    max_frame_size: usize,
    cancel: CancellationToken,
    ready: mpsc::Sender<Candidate>,
) {
    let mut frames = FramedRead::new(stream, codec(max_frame_size));
    let first = tokio::select! {
        _ = cancel.cancelled() => return,
        frame = frames.next() => frame,
    };

    match first {
        Some(Ok(first)) => {
            if ready.send(Candidate { peer, frames, first }).await.is_err() {
                tracing::debug!(%peer, "dispatcher stopped before connection was served");
            }
        }
        Some(Err(e)) => {
            tracing::warn!(%peer, error = %e, "unreadable first frame, closing connection");
        }
        None => {
            tracing::debug!(%peer, "connection closed before sending an event");
        }
    }
}

/// Read frames from one producer until it disconnects, the frame stream
/// breaks, or the connection is cancelled.
async fn serve_connection(candidate: Candidate, registry: SharedRegistry, cancel: CancellationToken) {
    let Candidate {
        peer,
        mut frames,
        first,
    } = candidate;
    tracing::info!(%peer, "producer connected");
    dispatch_frame(&registry, peer, &first);

    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!(%peer, "closing producer connection");
                break;
            }
            frame = frames.next() => frame,
        };

        match frame {
            None => {
                tracing::info!(%peer, "producer disconnected");
                break;
            }
            Some(Err(e)) => {
                tracing::warn!(%peer, error = %e, "unreadable frame, closing connection");
                break;
            }
            Some(Ok(body)) => dispatch_frame(&registry, peer, &body),
        }
    }
}

fn dispatch_frame(registry: &SharedRegistry, peer: SocketAddr, body: &[u8]) {
    match event::decode(body) {
        Ok(event) => {
            let kind = event.kind();
            let handled = registry.dispatch(&event);
            tracing::trace!(%peer, %kind, handled, len = body.len(), "dispatched event");
        }
        Err(e) => {
            tracing::warn!(%peer, len = body.len(), error = ?e, "dropping malformed frame");
        }
    }
}
