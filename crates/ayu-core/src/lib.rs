//! Core of ayu: the event model, the TCP dispatch channel between a running
//! test suite and the dashboard, and the session state the dashboard renders.

pub mod channel;
pub mod collection;
pub mod coverage;
pub mod emitter;
pub mod error;
pub mod event;
pub mod observer;
pub mod registry;
pub mod runner;
pub mod session;
pub mod tree;

pub use channel::{listen, probe, ChannelConfig, Connection, Listener};
pub use error::ChannelError;
pub use event::{decode, encode, Event, EventKind};
pub use observer::Observer;
pub use registry::{Handler, HandlerRegistry, SharedRegistry};
pub use session::{Session, SharedSession};
