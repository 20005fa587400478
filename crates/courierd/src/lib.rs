//! Message dispatch runtime for persistent client connections.
//!
//! Clients connect over a framed duplex socket, pick a codec by endpoint
//! path and then exchange envelopes. Each envelope names an operation by its
//! `module.service.operation` message type; the [`Dispatcher`] binds the
//! payload to the operation's declared parameters, invokes the handler
//! resolved from the [`ComponentGraph`] and answers with result, stream or
//! error envelopes carrying the request's correlation id.
//!
//! Applications describe their handlers with [`ModuleDefinition`],
//! [`ServiceDefinition`] and [`OperationDefinition`], collect them in a
//! [`RuntimeBlueprint`] and hand it to [`bootstrap_with`]. The `courierd`
//! binary serves the built-in [`diagnostics`] module.

mod bootstrap;
mod components;
pub mod diagnostics;
mod dispatch;
mod health;
mod process;
mod registry;
mod session;
mod shutdown;
mod telemetry;
mod transport;

pub use bootstrap::{
    BootstrapError, ConfigLoader, RuntimeBlueprint, Server, ServerHandle, StaticConfigLoader,
    SystemConfigLoader, bootstrap_with,
};
pub use components::{ComponentError, ComponentGraph, ComponentGraphBuilder, Dependencies, Resolver};
pub use dispatch::{
    ApiError, Call, CollectingChannel, DispatchError, Dispatcher, EmitSink, Emitter,
    MarshalableError, OperationError, ReturnChannel,
};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use process::{LaunchError, run_daemon, run_daemon_with};
pub use registry::{
    InvocationKind, ModuleDefinition, OperationDefinition, OperationDescriptor, OperationRegistry,
    ParamSpec, RegistryError, ServiceDefinition, kebab_case,
};
pub use session::{ConnectionHandle, ConnectionId, SessionListener, SessionStore};
pub use shutdown::{ShutdownError, ShutdownSignal, SystemShutdownSignal};
pub use telemetry::{TelemetryError, TelemetryHandle};
pub use transport::{
    ConnectionHandler, ConnectionObserver, ConnectionOutcome, ConnectionStream,
    DispatchConnectionHandler, EndpointTable, Exchange, FrameError, ListenerError, ListenerHandle,
    NegotiationError, SocketListener, frame,
};

#[cfg(test)]
mod tests;
