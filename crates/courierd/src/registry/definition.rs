use std::any::{Any, TypeId, type_name};
use std::sync::Arc;

use anyhow::Context as _;
use serde::Serialize;
use serde::de::DeserializeOwned;

use courier_wire::document::{Document, to_document};

use crate::components::ComponentGraph;
use crate::dispatch::{Call, EmitSink, Emitter, OperationError};

use super::descriptor::{InvocationKind, OperationDescriptor, ParamSpec};
use super::errors::RegistryError;
use super::naming::{is_dotted_name, is_valid_segment, kebab_case, short_type_name};
use super::table::RegistryBuilder;

type HandlerFn<H, S> = Arc<
    dyn Fn(&H, &mut Call<'_, S>, &mut dyn EmitSink) -> Result<Option<Document>, OperationError>
        + Send
        + Sync,
>;

/// Type-erased operation bound to its handler instance.
pub(crate) type Invoker<S> = Arc<
    dyn Fn(&mut Call<'_, S>, &mut dyn EmitSink) -> Result<Option<Document>, OperationError>
        + Send
        + Sync,
>;

fn erase<H, S, F>(handler: F) -> HandlerFn<H, S>
where
    F: Fn(&H, &mut Call<'_, S>, &mut dyn EmitSink) -> Result<Option<Document>, OperationError>
        + Send
        + Sync
        + 'static,
{
    Arc::new(handler)
}

fn bind_target<H, S>(target: Arc<H>, handler: HandlerFn<H, S>) -> Invoker<S>
where
    H: Send + Sync + 'static,
    S: 'static,
{
    Arc::new(move |call: &mut Call<'_, S>, sink: &mut dyn EmitSink| {
        handler(&target, call, sink)
    })
}

/// One operation of a service: its handler, parameters and naming.
pub struct OperationDefinition<H, S> {
    method: String,
    name: Option<String>,
    result_type: Option<String>,
    params: Vec<ParamSpec>,
    kind: InvocationKind,
    value_type: String,
    handler: HandlerFn<H, S>,
}

impl<H: 'static, S: 'static> OperationDefinition<H, S> {
    /// A unary operation answered with exactly one result envelope.
    ///
    /// Returning `()` sends the result envelope without a payload.
    pub fn unary<R, F>(method: impl Into<String>, handler: F) -> Self
    where
        R: Serialize + 'static,
        F: Fn(&H, &mut Call<'_, S>) -> Result<R, OperationError> + Send + Sync + 'static,
    {
        let void = TypeId::of::<R>() == TypeId::of::<()>();
        let handler = erase::<H, S, _>(move |target, call, _sink| {
            let value = handler(target, call)?;
            if void {
                return Ok(None);
            }
            let document = to_document(&value).context("failed to serialise operation result")?;
            Ok(Some(document))
        });
        Self::with_handler(method, InvocationKind::Unary, type_name::<R>(), handler)
    }

    /// A streaming operation that emits items of type `T` while it runs.
    ///
    /// Returning normally ends the stream; nothing else is sent.
    pub fn streaming<T, F>(method: impl Into<String>, handler: F) -> Self
    where
        T: Serialize + 'static,
        F: Fn(&H, &mut Call<'_, S>, &mut Emitter<'_, T>) -> Result<(), OperationError>
            + Send
            + Sync
            + 'static,
    {
        let handler = erase::<H, S, _>(move |target, call, sink| {
            let mut emitter = Emitter::new(sink, call.descriptor().namespace());
            handler(target, call, &mut emitter)?;
            Ok(None)
        });
        Self::with_handler(method, InvocationKind::Streaming, type_name::<T>(), handler)
    }

    fn with_handler(
        method: impl Into<String>,
        kind: InvocationKind,
        value_type: &str,
        handler: HandlerFn<H, S>,
    ) -> Self {
        Self {
            method: method.into(),
            name: None,
            result_type: None,
            params: Vec::new(),
            kind,
            value_type: short_type_name(value_type),
            handler,
        }
    }

    /// Declares a required parameter read from the payload key `name`.
    #[must_use]
    pub fn param<T>(mut self, name: impl Into<String>) -> Self
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.params.push(ParamSpec::typed::<T>(name.into(), false));
        self
    }

    /// Declares a parameter that may be absent or null.
    #[must_use]
    pub fn optional<T>(mut self, name: impl Into<String>) -> Self
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.params.push(ParamSpec::typed::<T>(name.into(), true));
        self
    }

    /// Declares a required raw byte parameter, bound as `Vec<u8>`.
    #[must_use]
    pub fn bytes(mut self, name: impl Into<String>) -> Self {
        self.params.push(ParamSpec::bytes(name.into(), false));
        self
    }

    /// Declares an optional raw byte parameter, bound as `Vec<u8>`.
    #[must_use]
    pub fn optional_bytes(mut self, name: impl Into<String>) -> Self {
        self.params.push(ParamSpec::bytes(name.into(), true));
        self
    }

    /// Overrides the operation name derived from the method name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Overrides the result message type of a unary operation. A leading
    /// `.` makes it relative to `module.service`.
    #[must_use]
    pub fn result_type(mut self, message_type: impl Into<String>) -> Self {
        self.result_type = Some(message_type.into());
        self
    }

    fn describe(
        self,
        module: &str,
        service: &str,
    ) -> Result<(OperationDescriptor, HandlerFn<H, S>), RegistryError> {
        let operation = self.name.unwrap_or_else(|| kebab_case(&self.method));
        if !is_valid_segment(&operation) {
            return Err(RegistryError::invalid_name("operation", operation));
        }
        let namespace = format!("{module}.{service}");
        let message_type = format!("{namespace}.{operation}");

        for (position, param) in self.params.iter().enumerate() {
            if param.name().trim().is_empty() {
                return Err(RegistryError::MissingParameterName {
                    message_type,
                    position,
                });
            }
            if self.params[..position]
                .iter()
                .any(|earlier| earlier.name() == param.name())
            {
                return Err(RegistryError::DuplicateParameter {
                    message_type,
                    name: param.name().to_owned(),
                });
            }
        }

        let result_message_type = match self.kind {
            InvocationKind::Unary => Some(resolve_result_type(
                &namespace,
                &message_type,
                self.result_type.as_deref(),
            )?),
            InvocationKind::Streaming => {
                if let Some(result_type) = self.result_type {
                    return Err(RegistryError::UnresolvableResultType {
                        message_type,
                        result_type,
                        reason: "streaming operations name each emitted envelope",
                    });
                }
                None
            }
        };

        let descriptor = OperationDescriptor {
            module: module.to_owned(),
            service: service.to_owned(),
            operation,
            message_type,
            namespace,
            params: self.params,
            kind: self.kind,
            value_type: self.value_type,
            result_message_type,
        };
        Ok((descriptor, self.handler))
    }
}

fn resolve_result_type(
    namespace: &str,
    message_type: &str,
    declared: Option<&str>,
) -> Result<String, RegistryError> {
    let Some(declared) = declared else {
        return Ok(format!("{message_type}-result"));
    };
    let resolved = match declared.strip_prefix('.') {
        Some(local) => format!("{namespace}.{local}"),
        None => declared.to_owned(),
    };
    if is_dotted_name(&resolved) {
        Ok(resolved)
    } else {
        Err(RegistryError::UnresolvableResultType {
            message_type: message_type.to_owned(),
            result_type: declared.to_owned(),
            reason: "expected a dotted message type or a name starting with '.'",
        })
    }
}

/// A named group of operations served by one handler type `H`.
///
/// The handler instance is resolved from the component graph when the
/// registry is built.
pub struct ServiceDefinition<H, S> {
    name: String,
    operations: Vec<OperationDefinition<H, S>>,
}

impl<H, S> ServiceDefinition<H, S> {
    /// Starts an empty service.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            operations: Vec::new(),
        }
    }

    /// Adds an operation.
    #[must_use]
    pub fn operation(mut self, operation: OperationDefinition<H, S>) -> Self {
        self.operations.push(operation);
        self
    }
}

pub(crate) trait ServiceBlueprint<S> {
    fn register(
        self: Box<Self>,
        module: &str,
        graph: &ComponentGraph,
        registry: &mut RegistryBuilder<S>,
    ) -> Result<(), RegistryError>;
}

impl<H, S> ServiceBlueprint<S> for ServiceDefinition<H, S>
where
    H: Any + Send + Sync,
    S: 'static,
{
    fn register(
        self: Box<Self>,
        module: &str,
        graph: &ComponentGraph,
        registry: &mut RegistryBuilder<S>,
    ) -> Result<(), RegistryError> {
        let Self { name, operations } = *self;
        if !is_valid_segment(&name) {
            return Err(RegistryError::invalid_name("service", name));
        }
        let target = graph
            .get::<H>()
            .map_err(|source| RegistryError::Component {
                service: format!("{module}.{name}"),
                source,
            })?;
        for operation in operations {
            let (descriptor, handler) = operation.describe(module, &name)?;
            registry.insert(descriptor, bind_target(Arc::clone(&target), handler))?;
        }
        Ok(())
    }
}

/// A named module grouping services for one session type `S`.
pub struct ModuleDefinition<S> {
    name: String,
    services: Vec<Box<dyn ServiceBlueprint<S>>>,
}

impl<S: 'static> ModuleDefinition<S> {
    /// Starts an empty module.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            services: Vec::new(),
        }
    }

    /// Adds a service whose handler is the component `H`.
    #[must_use]
    pub fn service<H>(mut self, service: ServiceDefinition<H, S>) -> Self
    where
        H: Any + Send + Sync,
    {
        self.services.push(Box::new(service));
        self
    }

    /// Module name, the first message type segment.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn register(
        self,
        graph: &ComponentGraph,
        registry: &mut RegistryBuilder<S>,
    ) -> Result<(), RegistryError> {
        if !is_valid_segment(&self.name) {
            return Err(RegistryError::invalid_name("module", self.name));
        }
        for service in self.services {
            service.register(&self.name, graph, registry)?;
        }
        Ok(())
    }
}
