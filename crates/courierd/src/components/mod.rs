//! Component graph that builds and memoizes handler instances.
//!
//! Each component type is registered with an explicit factory and the list of
//! dependencies that factory resolves. Dependencies are either other
//! components or capabilities: plain configuration types deserialised from a
//! [`courier_config::ConfigSource`] under a declared prefix. The builder
//! checks the dependency graph for unregistered types and cycles before any
//! component is constructed; components themselves are built lazily on first
//! request and kept for the lifetime of the graph.

mod errors;
mod graph;

pub use self::errors::ComponentError;
pub use self::graph::{ComponentGraph, ComponentGraphBuilder, Dependencies, Resolver};

pub(crate) const COMPONENTS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::components");
