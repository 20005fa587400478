use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use tracing::debug;

use courier_config::ConfigSource;

use super::{COMPONENTS_TARGET, ComponentError};

type Instance = Arc<dyn Any + Send + Sync>;
type Factory = Box<dyn Fn(&mut Resolver<'_>) -> Result<Instance, ComponentError> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum DependencyKind {
    Component,
    Capability { prefix: String },
}

#[derive(Debug, Clone)]
struct Dependency {
    type_id: TypeId,
    type_name: &'static str,
    kind: DependencyKind,
}

/// Dependencies a factory is allowed to resolve.
#[derive(Debug, Clone, Default)]
pub struct Dependencies {
    entries: Vec<Dependency>,
}

impl Dependencies {
    /// No dependencies.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a dependency on another component.
    #[must_use]
    pub fn component<T: Any + Send + Sync>(mut self) -> Self {
        self.entries.push(Dependency {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            kind: DependencyKind::Component,
        });
        self
    }

    /// Declares a capability loaded from the configuration source under
    /// `prefix`. An empty prefix reads unscoped keys.
    #[must_use]
    pub fn capability<C>(mut self, prefix: impl Into<String>) -> Self
    where
        C: DeserializeOwned + Send + Sync + 'static,
    {
        self.entries.push(Dependency {
            type_id: TypeId::of::<C>(),
            type_name: type_name::<C>(),
            kind: DependencyKind::Capability {
                prefix: prefix.into(),
            },
        });
        self
    }

    fn find(&self, type_id: TypeId) -> Option<&Dependency> {
        self.entries.iter().find(|entry| entry.type_id == type_id)
    }

    fn components(&self) -> impl Iterator<Item = &Dependency> {
        self.entries
            .iter()
            .filter(|entry| entry.kind == DependencyKind::Component)
    }
}

struct Registration {
    type_name: &'static str,
    dependencies: Dependencies,
    factory: Factory,
}

/// Collects factories, instances and capabilities for a [`ComponentGraph`].
pub struct ComponentGraphBuilder {
    source: Arc<dyn ConfigSource>,
    registrations: HashMap<TypeId, Registration>,
    instances: HashMap<TypeId, (&'static str, Instance)>,
    capabilities: HashMap<TypeId, Instance>,
    duplicates: Vec<&'static str>,
}

impl ComponentGraphBuilder {
    /// Starts a graph whose capabilities are read from `source`.
    #[must_use]
    pub fn new(source: Arc<dyn ConfigSource>) -> Self {
        Self {
            source,
            registrations: HashMap::new(),
            instances: HashMap::new(),
            capabilities: HashMap::new(),
            duplicates: Vec::new(),
        }
    }

    /// Registers an already-built singleton.
    #[must_use]
    pub fn instance<T: Any + Send + Sync>(mut self, value: T) -> Self {
        let id = TypeId::of::<T>();
        if self.is_known(id) {
            self.duplicates.push(type_name::<T>());
        }
        self.instances
            .insert(id, (type_name::<T>(), Arc::new(value) as Instance));
        self
    }

    /// Registers a fixed capability value, used instead of the configuration
    /// source wherever the capability is declared.
    #[must_use]
    pub fn capability_instance<C>(mut self, value: C) -> Self
    where
        C: DeserializeOwned + Send + Sync + 'static,
    {
        self.capabilities
            .insert(TypeId::of::<C>(), Arc::new(value) as Instance);
        self
    }

    /// Registers a factory for `T`.
    ///
    /// The factory may only resolve what `dependencies` declares.
    #[must_use]
    pub fn component<T, F>(mut self, dependencies: Dependencies, factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&mut Resolver<'_>) -> Result<T, ComponentError> + Send + Sync + 'static,
    {
        let id = TypeId::of::<T>();
        if self.is_known(id) {
            self.duplicates.push(type_name::<T>());
        }
        let factory: Factory = Box::new(move |resolver: &mut Resolver<'_>| {
            factory(resolver).map(|value| Arc::new(value) as Instance)
        });
        self.registrations.insert(
            id,
            Registration {
                type_name: type_name::<T>(),
                dependencies,
                factory,
            },
        );
        self
    }

    fn is_known(&self, id: TypeId) -> bool {
        self.registrations.contains_key(&id) || self.instances.contains_key(&id)
    }

    /// Validates the dependency graph and returns the lazily-built graph.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::Duplicate`], [`ComponentError::Unregistered`]
    /// or [`ComponentError::Cycle`] when the registrations are inconsistent.
    pub fn build(self) -> Result<ComponentGraph, ComponentError> {
        if let Some(component) = self.duplicates.first() {
            return Err(ComponentError::Duplicate { component });
        }

        for registration in self.registrations.values() {
            for dependency in registration.dependencies.components() {
                if !self.registrations.contains_key(&dependency.type_id)
                    && !self.instances.contains_key(&dependency.type_id)
                {
                    return Err(ComponentError::Unregistered {
                        component: registration.type_name,
                        dependency: dependency.type_name,
                    });
                }
            }
        }

        let order = topological_order(&self.registrations)?;
        let instances = self
            .instances
            .into_iter()
            .map(|(id, (_, instance))| (id, instance))
            .collect();

        Ok(ComponentGraph {
            source: self.source,
            registrations: self.registrations,
            capabilities: self.capabilities,
            order,
            instances: Mutex::new(instances),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

fn topological_order(
    registrations: &HashMap<TypeId, Registration>,
) -> Result<Vec<TypeId>, ComponentError> {
    let mut roots: Vec<(&'static str, TypeId)> = registrations
        .iter()
        .map(|(id, registration)| (registration.type_name, *id))
        .collect();
    roots.sort_by_key(|(name, _)| *name);

    let mut marks = HashMap::new();
    let mut order = Vec::with_capacity(registrations.len());
    let mut stack = Vec::new();
    for (_, id) in roots {
        visit(id, registrations, &mut marks, &mut stack, &mut order)?;
    }
    Ok(order)
}

fn visit(
    id: TypeId,
    registrations: &HashMap<TypeId, Registration>,
    marks: &mut HashMap<TypeId, Mark>,
    stack: &mut Vec<&'static str>,
    order: &mut Vec<TypeId>,
) -> Result<(), ComponentError> {
    // Instances have no factory and therefore no outgoing edges.
    let Some(registration) = registrations.get(&id) else {
        return Ok(());
    };
    match marks.get(&id) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::Visiting) => {
            let start = stack
                .iter()
                .position(|name| *name == registration.type_name)
                .unwrap_or(0);
            let path = stack
                .iter()
                .skip(start)
                .copied()
                .chain(std::iter::once(registration.type_name))
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(ComponentError::Cycle { path });
        }
        None => {}
    }

    marks.insert(id, Mark::Visiting);
    stack.push(registration.type_name);
    for dependency in registration.dependencies.components() {
        visit(dependency.type_id, registrations, marks, stack, order)?;
    }
    stack.pop();
    marks.insert(id, Mark::Done);
    order.push(id);
    Ok(())
}

/// Lazily-built, memoized component singletons.
pub struct ComponentGraph {
    source: Arc<dyn ConfigSource>,
    registrations: HashMap<TypeId, Registration>,
    capabilities: HashMap<TypeId, Instance>,
    order: Vec<TypeId>,
    instances: Mutex<HashMap<TypeId, Instance>>,
}

impl ComponentGraph {
    /// Returns the singleton for `T`, building it and its dependencies on
    /// first use.
    ///
    /// Building happens under one graph-wide lock, so concurrent first use
    /// from several connections yields the same instance.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::Missing`] for unknown types and propagates
    /// factory and capability failures.
    pub fn get<T: Any + Send + Sync>(&self) -> Result<Arc<T>, ComponentError> {
        let mut instances = self
            .instances
            .lock()
            .map_err(|_| ComponentError::internal("component graph lock poisoned"))?;
        let instance = self.resolve(TypeId::of::<T>(), type_name::<T>(), &mut instances)?;
        downcast(instance)
    }

    /// Builds every registered component in dependency order.
    ///
    /// # Errors
    ///
    /// Propagates the first factory or capability failure.
    pub fn warm_up(&self) -> Result<(), ComponentError> {
        let mut instances = self
            .instances
            .lock()
            .map_err(|_| ComponentError::internal("component graph lock poisoned"))?;
        for id in &self.order {
            let name = self
                .registrations
                .get(id)
                .map_or("<unknown>", |registration| registration.type_name);
            self.resolve(*id, name, &mut instances)?;
        }
        Ok(())
    }

    /// Returns `true` when `T` can be resolved.
    #[must_use]
    pub fn contains<T: Any>(&self) -> bool {
        let id = TypeId::of::<T>();
        self.registrations.contains_key(&id)
            || self
                .instances
                .lock()
                .is_ok_and(|instances| instances.contains_key(&id))
    }

    fn resolve(
        &self,
        id: TypeId,
        name: &'static str,
        instances: &mut HashMap<TypeId, Instance>,
    ) -> Result<Instance, ComponentError> {
        if let Some(existing) = instances.get(&id) {
            return Ok(Arc::clone(existing));
        }
        let registration = self
            .registrations
            .get(&id)
            .ok_or(ComponentError::Missing { component: name })?;

        debug!(
            target: COMPONENTS_TARGET,
            component = registration.type_name,
            "building component"
        );
        let instance = {
            let mut resolver = Resolver {
                graph: self,
                registration,
                instances: &mut *instances,
            };
            (registration.factory)(&mut resolver)?
        };
        instances.insert(id, Arc::clone(&instance));
        Ok(instance)
    }
}

fn downcast<T: Any + Send + Sync>(instance: Instance) -> Result<Arc<T>, ComponentError> {
    instance
        .downcast::<T>()
        .map_err(|_| ComponentError::TypeMismatch {
            component: type_name::<T>(),
        })
}

/// Access to declared dependencies from inside a factory.
pub struct Resolver<'g> {
    graph: &'g ComponentGraph,
    registration: &'g Registration,
    instances: &'g mut HashMap<TypeId, Instance>,
}

impl Resolver<'_> {
    /// Type name of the component being built.
    #[must_use]
    pub fn component_name(&self) -> &'static str {
        self.registration.type_name
    }

    /// Resolves a declared component dependency.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::Undeclared`] when `T` was not declared and
    /// propagates failures from building `T`.
    pub fn component<T: Any + Send + Sync>(&mut self) -> Result<Arc<T>, ComponentError> {
        let id = TypeId::of::<T>();
        match self.registration.dependencies.find(id) {
            Some(dependency) if dependency.kind == DependencyKind::Component => {}
            _ => {
                return Err(ComponentError::Undeclared {
                    component: self.registration.type_name,
                    dependency: type_name::<T>(),
                });
            }
        }
        let instance = self
            .graph
            .resolve(id, type_name::<T>(), &mut *self.instances)?;
        downcast(instance)
    }

    /// Loads a declared capability.
    ///
    /// An explicitly registered capability value wins; otherwise the value is
    /// read from the configuration source under the declared prefix. Loaded
    /// capabilities are not memoized.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::Undeclared`] when `C` was not declared and
    /// [`ComponentError::Capability`] when the configuration is invalid.
    pub fn capability<C>(&self) -> Result<Arc<C>, ComponentError>
    where
        C: DeserializeOwned + Send + Sync + 'static,
    {
        let id = TypeId::of::<C>();
        let prefix = match self.registration.dependencies.find(id) {
            Some(Dependency {
                kind: DependencyKind::Capability { prefix },
                ..
            }) => prefix,
            _ => {
                return Err(ComponentError::Undeclared {
                    component: self.registration.type_name,
                    dependency: type_name::<C>(),
                });
            }
        };

        if let Some(explicit) = self.graph.capabilities.get(&id) {
            return downcast(Arc::clone(explicit));
        }

        debug!(
            target: COMPONENTS_TARGET,
            component = self.registration.type_name,
            capability = type_name::<C>(),
            prefix = prefix.as_str(),
            "loading capability configuration"
        );
        self.graph
            .source
            .load(prefix)
            .and_then(|table| table.deserialize::<C>())
            .map(Arc::new)
            .map_err(|source| ComponentError::Capability {
                component: self.registration.type_name,
                capability: type_name::<C>(),
                source,
            })
    }
}
