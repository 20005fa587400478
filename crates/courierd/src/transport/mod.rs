//! Socket transport for the dispatch engine.
//!
//! The listener binds the configured endpoint and hands every accepted
//! stream to a [`ConnectionHandler`] on its own thread. The dispatch handler
//! speaks a length-prefixed duplex framing, binds each connection to the
//! codec named by its endpoint path, and keeps idle connections alive with
//! probes. [`Exchange`] serves single requests through the same engine.

mod connection;
mod endpoint;
mod errors;
mod exchange;
pub mod frame;
mod listener;
mod stream;

pub use self::connection::{ConnectionObserver, ConnectionOutcome, DispatchConnectionHandler};
pub use self::endpoint::EndpointTable;
pub use self::errors::{FrameError, ListenerError};
pub use self::exchange::{Exchange, NegotiationError};
pub use self::listener::{ListenerHandle, SocketListener};
pub use self::stream::{ConnectionHandler, ConnectionStream};

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
