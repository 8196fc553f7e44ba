//! The consumer process's state, created once at startup: a listener whose
//! handlers feed one shared session.

use std::net::SocketAddr;

use crate::channel::{listen, ChannelConfig, Listener};
use crate::error::ChannelError;
use crate::registry::SharedRegistry;
use crate::session::SharedSession;

#[derive(Debug)]
pub struct Observer {
    session: SharedSession,
    listener: Listener,
}

impl Observer {
    /// Bind the endpoint and route every event kind into a fresh session.
    pub async fn start(config: &ChannelConfig) -> Result<Self, ChannelError> {
        let session = SharedSession::new();
        let registry = SharedRegistry::new();
        session.install_handlers(&registry);
        let listener = listen(config, registry).await?;
        Ok(Self { session, listener })
    }

    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    pub fn listener(&self) -> &Listener {
        &self.listener
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    /// Stop listening. The session stays readable through any clones.
    pub async fn shutdown(self) {
        self.listener.shutdown().await;
    }
}
