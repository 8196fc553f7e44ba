//! Fire-and-forget producer used by test-run plugins.
//!
//! A run must behave identically whether or not a dashboard is watching, so
//! nothing here ever returns an error to the caller: a missing observer
//! yields a disabled emitter, and a lost observer disables it mid-run.

use crate::channel::{ChannelConfig, Connection};
use crate::error::ChannelError;
use crate::event::Event;

#[derive(Debug)]
pub struct Emitter {
    conn: Option<Connection>,
    sent: usize,
    dropped: usize,
}

impl Emitter {
    /// Probe for an observer at the configured endpoint and keep the
    /// connection if one answers.
    pub async fn connect(config: &ChannelConfig) -> Self {
        match Connection::connect_with(config).await {
            Ok(conn) => Self {
                conn: Some(conn),
                sent: 0,
                dropped: 0,
            },
            Err(e) => {
                tracing::info!(addr = %config.addr(), error = %e, "no dashboard listening; events disabled");
                Self::disabled()
            }
        }
    }

    /// An emitter that drops everything.
    pub fn disabled() -> Self {
        Self {
            conn: None,
            sent: 0,
            dropped: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.conn.is_some()
    }

    /// Events written so far.
    pub fn sent(&self) -> usize {
        self.sent
    }

    /// Events refused or skipped, including everything after a disable.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Send `event` if an observer is connected. Returns whether it was
    /// written.
    pub async fn emit(&mut self, event: &Event) -> bool {
        let Some(conn) = self.conn.as_mut() else {
            self.dropped += 1;
            return false;
        };

        match conn.send(event).await {
            Ok(()) => {
                self.sent += 1;
                true
            }
            Err(ChannelError::ChannelClosed) => {
                tracing::info!(peer = %conn.peer_addr(), "dashboard went away; events disabled");
                self.conn = None;
                self.dropped += 1;
                false
            }
            Err(e @ (ChannelError::FrameTooLarge { .. } | ChannelError::Encode(_))) => {
                tracing::warn!(kind = %event.kind(), error = ?e, "event not sent");
                self.dropped += 1;
                false
            }
            Err(e) => {
                tracing::warn!(kind = %event.kind(), error = ?e, "send failed; events disabled");
                self.conn = None;
                self.dropped += 1;
                false
            }
        }
    }

    pub async fn close(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            conn.close().await;
        }
    }
}
