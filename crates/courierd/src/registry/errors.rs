use thiserror::Error;

use crate::components::ComponentError;

/// Errors raised while building the operation registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Two operations resolved to the same message type.
    #[error("message type '{message_type}' is registered more than once")]
    DuplicateMessageType { message_type: String },
    /// A parameter was declared with an empty name.
    #[error("parameter {position} of '{message_type}' has no name")]
    MissingParameterName {
        message_type: String,
        position: usize,
    },
    /// A parameter name appears twice on one operation.
    #[error("parameter '{name}' is declared twice on '{message_type}'")]
    DuplicateParameter { message_type: String, name: String },
    /// A result message type override could not be resolved.
    #[error("result type '{result_type}' of '{message_type}' cannot be resolved: {reason}")]
    UnresolvableResultType {
        message_type: String,
        result_type: String,
        reason: &'static str,
    },
    /// A module, service or operation name is not a usable segment.
    #[error("invalid {kind} name '{name}'")]
    InvalidName { kind: &'static str, name: String },
    /// The handler instance for a service could not be built.
    #[error("failed to build handler for service '{service}': {source}")]
    Component {
        service: String,
        #[source]
        source: ComponentError,
    },
}

impl RegistryError {
    pub(crate) fn invalid_name(kind: &'static str, name: impl Into<String>) -> Self {
        Self::InvalidName {
            kind,
            name: name.into(),
        }
    }
}
