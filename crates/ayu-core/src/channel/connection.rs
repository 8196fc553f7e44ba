//! Producer side of the channel.

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::time::Duration;

use futures::SinkExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::codec::{FramedWrite, LengthDelimitedCodec};

use crate::error::ChannelError;
use crate::event::{self, Event};

use super::{codec, ChannelConfig};

/// A producer's connection to a dispatcher.
///
/// Sends are fire-and-forget: nothing is acknowledged, nothing is retried.
/// Once a send fails with [`ChannelError::ChannelClosed`] every later send
/// fails the same way.
pub struct Connection {
    peer: SocketAddr,
    max_frame_size: usize,
    frames: Option<FramedWrite<TcpStream, LengthDelimitedCodec>>,
}

impl Connection {
    /// Connect to a listener, giving up after `timeout`.
    pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self, ChannelError> {
        Self::connect_with(&ChannelConfig::new(host, port).with_connect_timeout(timeout)).await
    }

    /// Connect using the endpoint, timeout, and frame limit from `config`.
    pub async fn connect_with(config: &ChannelConfig) -> Result<Self, ChannelError> {
        let addr = config.addr();
        let stream = match tokio::time::timeout(
            config.connect_timeout,
            TcpStream::connect((config.host.as_str(), config.port)),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(ChannelError::Unreachable {
                    addr,
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                return Err(ChannelError::Unreachable {
                    addr,
                    reason: format!("timed out after {:?}", config.connect_timeout),
                });
            }
        };

        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        tracing::debug!(%peer, "connected to dispatcher");

        Ok(Self {
            peer,
            max_frame_size: config.max_frame_size,
            frames: Some(FramedWrite::new(stream, codec(config.max_frame_size))),
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_closed(&self) -> bool {
        self.frames.is_none()
    }

    /// Encode `event` and write it as one frame.
    ///
    /// Oversized events are refused with [`ChannelError::FrameTooLarge`]
    /// before anything is written, and the connection stays usable.
    pub async fn send(&mut self, event: &Event) -> Result<(), ChannelError> {
        let frames = self.frames.as_mut().ok_or(ChannelError::ChannelClosed)?;

        let body = event::encode(event)?;
        if body.len() > self.max_frame_size {
            return Err(ChannelError::FrameTooLarge {
                len: body.len(),
                max: self.max_frame_size,
            });
        }

        if peer_has_closed(frames.get_ref()) {
            self.frames = None;
            return Err(ChannelError::ChannelClosed);
        }

        let len = body.len();
        if let Err(e) = frames.send(body).await {
            self.frames = None;
            return Err(ChannelError::from_write(e));
        }
        tracing::trace!(peer = %self.peer, kind = %event.kind(), len, "sent event");
        Ok(())
    }

    /// Shut down the write half and drop the connection.
    pub async fn close(&mut self) {
        if let Some(frames) = self.frames.take() {
            let mut stream = frames.into_inner();
            if let Err(e) = stream.shutdown().await {
                tracing::debug!(peer = %self.peer, error = %e, "error while closing connection");
            }
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.peer)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// The dispatcher never writes, so a readable socket means EOF or an error.
fn peer_has_closed(stream: &TcpStream) -> bool {
    let mut probe = [0u8; 1];
    match stream.try_read(&mut probe) {
        Ok(0) => true,
        Ok(_) => false,
        Err(e) if e.kind() == ErrorKind::WouldBlock => false,
        Err(_) => true,
    }
}

/// Report whether a dispatcher is listening at `host:port`.
///
/// Opens a connection and closes it immediately. Producers call this once
/// per run and skip emitting entirely when it returns `false`.
pub async fn probe(host: &str, port: u16, timeout: Duration) -> bool {
    match Connection::connect(host, port, timeout).await {
        Ok(mut conn) => {
            conn.close().await;
            true
        }
        Err(e) => {
            tracing::debug!(host, port, error = %e, "probe found no dispatcher");
            false
        }
    }
}
