use std::fmt;

use thiserror::Error;

use courier_config::ConfigSourceError;

/// Errors raised while building or resolving components.
#[derive(Debug, Error)]
pub enum ComponentError {
    /// Two factories or instances were registered for one type.
    #[error("component {component} is registered more than once")]
    Duplicate { component: &'static str },
    /// A declared dependency has neither a factory nor an instance.
    #[error("component {component} depends on {dependency}, which is not registered")]
    Unregistered {
        component: &'static str,
        dependency: &'static str,
    },
    /// Factories depend on each other in a loop.
    #[error("component dependency cycle: {path}")]
    Cycle { path: String },
    /// A type was requested that the graph knows nothing about.
    #[error("no factory or instance registered for {component}")]
    Missing { component: &'static str },
    /// A factory resolved something it did not declare.
    #[error("component {component} did not declare a dependency on {dependency}")]
    Undeclared {
        component: &'static str,
        dependency: &'static str,
    },
    /// Capability configuration could not be loaded.
    #[error("failed to configure {capability} for {component}: {source}")]
    Capability {
        component: &'static str,
        capability: &'static str,
        #[source]
        source: ConfigSourceError,
    },
    /// A factory reported a failure.
    #[error("failed to build component {component}: {message}")]
    Factory {
        component: &'static str,
        message: String,
    },
    /// A memoized instance had an unexpected concrete type.
    #[error("component {component} resolved to an unexpected type")]
    TypeMismatch { component: &'static str },
    /// Internal error (e.g., lock poisoned).
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl ComponentError {
    /// Creates a factory failure for `component`.
    pub fn failed(component: &'static str, error: impl fmt::Display) -> Self {
        Self::Factory {
            component,
            message: error.to_string(),
        }
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}
