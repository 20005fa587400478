//! Dispatch engine: routes decoded envelopes to operations.
//!
//! The engine owns the operation registry and the session store. For every
//! inbound frame it decodes the envelope, checks the protocol version and the
//! connection's session, serves control-channel listeners directly, and
//! otherwise resolves, binds and invokes the operation. Every response reuses
//! the request's correlation id.

mod binding;
mod call;
mod channel;
mod engine;
mod errors;

pub use self::call::{Call, EmitSink, Emitter};
pub use self::channel::{CollectingChannel, ReturnChannel};
pub use self::engine::Dispatcher;
pub use self::errors::{ApiError, DispatchError, MarshalableError, OperationError};

pub(crate) use self::engine::SessionGuard;

pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

#[cfg(test)]
mod tests;
