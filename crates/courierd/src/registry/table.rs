use std::collections::HashMap;
use std::collections::hash_map::Entry;

use tracing::debug;

use crate::components::ComponentGraph;
use crate::dispatch::ApiError;

use super::definition::{Invoker, ModuleDefinition};
use super::descriptor::OperationDescriptor;
use super::errors::RegistryError;
use super::REGISTRY_TARGET;

pub(crate) struct RegisteredOperation<S> {
    pub(crate) descriptor: OperationDescriptor,
    pub(crate) invoke: Invoker<S>,
}

pub(crate) struct RegistryBuilder<S> {
    operations: HashMap<String, RegisteredOperation<S>>,
}

impl<S> RegistryBuilder<S> {
    pub(crate) fn insert(
        &mut self,
        descriptor: OperationDescriptor,
        invoke: Invoker<S>,
    ) -> Result<(), RegistryError> {
        match self.operations.entry(descriptor.message_type.clone()) {
            Entry::Occupied(entry) => Err(RegistryError::DuplicateMessageType {
                message_type: entry.key().clone(),
            }),
            Entry::Vacant(entry) => {
                debug!(
                    target: REGISTRY_TARGET,
                    message_type = descriptor.message_type(),
                    kind = %descriptor.kind(),
                    params = descriptor.params().len(),
                    "registered operation"
                );
                entry.insert(RegisteredOperation { descriptor, invoke });
                Ok(())
            }
        }
    }
}

/// Immutable table from message type to operation.
pub struct OperationRegistry<S> {
    operations: HashMap<String, RegisteredOperation<S>>,
}

impl<S: 'static> OperationRegistry<S> {
    /// Registers every operation of every module, resolving each service's
    /// handler from `graph`.
    ///
    /// # Errors
    ///
    /// Fails on the first invalid name, duplicate message type, unnamed or
    /// repeated parameter, unresolvable result type, or handler that cannot
    /// be built.
    pub fn build(
        modules: impl IntoIterator<Item = ModuleDefinition<S>>,
        graph: &ComponentGraph,
    ) -> Result<Self, RegistryError> {
        let mut builder = RegistryBuilder {
            operations: HashMap::new(),
        };
        for module in modules {
            module.register(graph, &mut builder)?;
        }
        Ok(Self {
            operations: builder.operations,
        })
    }
}

impl<S> OperationRegistry<S> {
    /// Looks up the descriptor for a message type.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::UnknownMessageType`] for unregistered types.
    pub fn get_operation(&self, message_type: &str) -> Result<&OperationDescriptor, ApiError> {
        self.lookup(message_type)
            .map(|operation| &operation.descriptor)
    }

    pub(crate) fn lookup(&self, message_type: &str) -> Result<&RegisteredOperation<S>, ApiError> {
        self.operations
            .get(message_type)
            .ok_or_else(|| ApiError::unknown_message_type(message_type))
    }

    /// All descriptors, sorted by message type.
    #[must_use]
    pub fn operations(&self) -> Vec<&OperationDescriptor> {
        let mut descriptors: Vec<_> = self
            .operations
            .values()
            .map(|operation| &operation.descriptor)
            .collect();
        descriptors.sort_by(|left, right| left.message_type().cmp(right.message_type()));
        descriptors
    }

    /// Number of registered operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}
