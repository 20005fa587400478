//! Operation registry built once at startup.
//!
//! Handlers are described declaratively: a [`ModuleDefinition`] groups
//! [`ServiceDefinition`]s, each naming a handler component and listing its
//! [`OperationDefinition`]s. Building the [`OperationRegistry`] resolves every
//! handler from the component graph, derives message types
//! (`module.service.operation`) and validates names, parameters and result
//! types. The resulting table is never mutated.

mod definition;
mod descriptor;
mod errors;
mod naming;
mod table;

pub use self::definition::{ModuleDefinition, OperationDefinition, ServiceDefinition};
pub use self::descriptor::{InvocationKind, OperationDescriptor, ParamSpec};
pub use self::errors::RegistryError;
pub use self::naming::kebab_case;
pub use self::table::OperationRegistry;

pub(crate) use self::descriptor::ParamDecoder;
pub(crate) use self::table::RegisteredOperation;

pub(crate) const REGISTRY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::registry");
