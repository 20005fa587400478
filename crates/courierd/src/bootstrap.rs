//! Runtime bootstrap orchestration.

use std::net::SocketAddr;
use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use serde::de::DeserializeOwned;
use thiserror::Error;

use courier_config::{Config, ConfigSource, EnvConfigSource, SocketPreparationError};
use courier_wire::CodecSet;

use crate::components::{ComponentError, ComponentGraph, ComponentGraphBuilder};
use crate::dispatch::Dispatcher;
use crate::health::HealthReporter;
use crate::registry::{ModuleDefinition, OperationRegistry, RegistryError};
use crate::session::{ConnectionHandle, SessionListener};
use crate::telemetry::{self, TelemetryError, TelemetryHandle};
use crate::transport::{
    ConnectionObserver, ConnectionOutcome, DispatchConnectionHandler, EndpointTable, Exchange,
    ListenerError, ListenerHandle, SocketListener,
};

/// Environment prefix for capability configuration.
const CAPABILITY_PREFIX: &str = "COURIER";

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the runtime configuration.
    ///
    /// # Errors
    ///
    /// Returns the loader's error when configuration is invalid.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Loader that hands out a fixed configuration.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps `config`.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap or when starting to serve.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        #[source]
        source: TelemetryError,
    },
    /// Socket preparation failed.
    #[error("failed to prepare listen socket: {source}")]
    Socket {
        #[source]
        source: SocketPreparationError,
    },
    /// The component graph is inconsistent.
    #[error("invalid component graph: {source}")]
    Components {
        #[source]
        source: ComponentError,
    },
    /// An operation could not be registered.
    #[error("failed to build operation registry: {source}")]
    Registry {
        #[source]
        source: RegistryError,
    },
    /// The listener could not be started.
    #[error("failed to start listener: {source}")]
    Listener {
        #[source]
        source: ListenerError,
    },
}

type SessionFactory<S> = Box<dyn Fn(&ConnectionHandle) -> S + Send + Sync>;
type ComponentRegistration = Box<dyn FnOnce(ComponentGraphBuilder) -> ComponentGraphBuilder>;
type DispatcherSetup<S> = Box<dyn FnOnce(&mut Dispatcher<S>)>;

/// Everything an application contributes to the runtime: handler modules,
/// their components, the session factory and optional listeners.
pub struct RuntimeBlueprint<S> {
    modules: Vec<ModuleDefinition<S>>,
    components: Vec<ComponentRegistration>,
    config_source: Option<Arc<dyn ConfigSource>>,
    session_factory: SessionFactory<S>,
    setup: Vec<DispatcherSetup<S>>,
    codecs: CodecSet,
}

impl<S: Send + Sync + 'static> RuntimeBlueprint<S> {
    /// Starts a blueprint whose sessions are built by `session_factory`.
    pub fn new<F>(session_factory: F) -> Self
    where
        F: Fn(&ConnectionHandle) -> S + Send + Sync + 'static,
    {
        Self {
            modules: Vec::new(),
            components: Vec::new(),
            config_source: None,
            session_factory: Box::new(session_factory),
            setup: Vec::new(),
            codecs: CodecSet::standard(),
        }
    }

    /// Adds a handler module.
    #[must_use]
    pub fn module(mut self, module: ModuleDefinition<S>) -> Self {
        self.modules.push(module);
        self
    }

    /// Registers components on the graph builder.
    #[must_use]
    pub fn components<F>(mut self, register: F) -> Self
    where
        F: FnOnce(ComponentGraphBuilder) -> ComponentGraphBuilder + 'static,
    {
        self.components.push(Box::new(register));
        self
    }

    /// Replaces the capability configuration source. Defaults to
    /// `COURIER_<PREFIX>_<KEY>` environment variables.
    #[must_use]
    pub fn config_source(mut self, source: Arc<dyn ConfigSource>) -> Self {
        self.config_source = Some(source);
        self
    }

    /// Adds a session lifecycle observer.
    #[must_use]
    pub fn session_listener(mut self, listener: Arc<dyn SessionListener<S>>) -> Self {
        self.setup
            .push(Box::new(move |dispatcher| dispatcher.add_session_listener(listener)));
        self
    }

    /// Adds a control-channel listener; see
    /// [`Dispatcher::put_message_listener`].
    #[must_use]
    pub fn message_listener<T, F>(mut self, message_type: impl Into<String>, listener: F) -> Self
    where
        T: DeserializeOwned + 'static,
        F: Fn(&ConnectionHandle, &S, T) + Send + Sync + 'static,
    {
        let message_type = message_type.into();
        self.setup.push(Box::new(move |dispatcher| {
            dispatcher.put_message_listener::<T, F>(message_type, listener);
        }));
        self
    }

    /// Replaces the offered codecs. Defaults to JSON then CBOR.
    #[must_use]
    pub fn codecs(mut self, codecs: CodecSet) -> Self {
        self.codecs = codecs;
        self
    }
}

/// A bootstrapped runtime, ready to serve.
pub struct Server<S> {
    config: Config,
    dispatcher: Arc<Dispatcher<S>>,
    graph: Arc<ComponentGraph>,
    codecs: CodecSet,
    telemetry: TelemetryHandle,
    reporter: Arc<dyn HealthReporter>,
    observer: Option<ConnectionObserver>,
}

impl<S: Send + Sync + 'static> Server<S> {
    /// Accessor for the resolved configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The shared dispatch engine.
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<Dispatcher<S>> {
        &self.dispatcher
    }

    /// The component graph handlers were resolved from.
    #[must_use]
    pub fn graph(&self) -> &Arc<ComponentGraph> {
        &self.graph
    }

    /// Accessor for the telemetry handle.
    #[must_use]
    pub fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// Reports every served connection to `observer` together with a handle
    /// on its eventual close status.
    #[must_use]
    pub fn with_connection_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(&ConnectionHandle, ConnectionOutcome) + Send + Sync + 'static,
    {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// Single-request entry point sharing this server's dispatcher.
    #[must_use]
    pub fn exchange(&self) -> Exchange<S> {
        Exchange::new(Arc::clone(&self.dispatcher), self.codecs.clone())
    }

    /// Binds the configured socket and starts accepting connections.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::Listener`] when the socket cannot be bound.
    pub fn serve(&self) -> Result<ServerHandle, BootstrapError> {
        let endpoint = self.config.listen_socket();
        let listener =
            SocketListener::bind(endpoint).map_err(|source| BootstrapError::Listener { source })?;
        let local_addr = listener.local_addr();
        let handler = DispatchConnectionHandler::new(
            Arc::clone(&self.dispatcher),
            EndpointTable::new(self.config.base_path(), &self.codecs),
            self.config.keep_alive(),
        )
        .with_observer(self.observer.clone());
        let listener = listener
            .start(Arc::new(handler))
            .map_err(|source| BootstrapError::Listener { source })?;
        self.reporter.listener_started(endpoint, local_addr);
        Ok(ServerHandle {
            listener,
            local_addr,
        })
    }
}

/// Running listener of a [`Server`].
#[derive(Debug)]
pub struct ServerHandle {
    listener: ListenerHandle,
    local_addr: Option<SocketAddr>,
}

impl ServerHandle {
    /// Bound TCP address; `None` for unix sockets.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Stops accepting connections.
    pub fn shutdown(&self) {
        self.listener.shutdown();
    }

    /// Waits for the accept loop to finish.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::ThreadPanic`] if the loop panicked.
    pub fn join(self) -> Result<(), ListenerError> {
        self.listener.join()
    }
}

/// Bootstraps the runtime using the supplied collaborators.
///
/// Loads configuration, initialises telemetry, prepares the socket
/// directory, builds the component graph and operation registry, and wires
/// the dispatcher. Nothing is bound until [`Server::serve`].
///
/// # Errors
///
/// Returns the first [`BootstrapError`]; the reporter is told about it.
pub fn bootstrap_with<S: Send + Sync + 'static>(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    blueprint: RuntimeBlueprint<S>,
) -> Result<Server<S>, BootstrapError> {
    reporter.bootstrap_starting();
    let fail = |error: BootstrapError| {
        reporter.bootstrap_failed(&error);
        error
    };

    let config = loader
        .load()
        .map_err(|source| fail(BootstrapError::Configuration { source }))?;
    let telemetry = telemetry::initialise(&config)
        .map_err(|source| fail(BootstrapError::Telemetry { source }))?;
    config
        .listen_socket()
        .prepare_filesystem()
        .map_err(|source| fail(BootstrapError::Socket { source }))?;

    let RuntimeBlueprint {
        modules,
        components,
        config_source,
        session_factory,
        setup,
        codecs,
    } = blueprint;
    let source = config_source
        .unwrap_or_else(|| Arc::new(EnvConfigSource::new(CAPABILITY_PREFIX)) as Arc<dyn ConfigSource>);
    let graph = components
        .into_iter()
        .fold(ComponentGraphBuilder::new(source), |builder, register| {
            register(builder)
        })
        .build()
        .map_err(|source| fail(BootstrapError::Components { source }))?;
    let registry = OperationRegistry::build(modules, &graph)
        .map_err(|source| fail(BootstrapError::Registry { source }))?;
    reporter.registry_loaded(registry.len());

    let mut dispatcher =
        Dispatcher::new(registry, session_factory).with_release_version(config.release_version());
    for configure in setup {
        configure(&mut dispatcher);
    }

    reporter.bootstrap_succeeded(&config);
    Ok(Server {
        config,
        dispatcher: Arc::new(dispatcher),
        graph: Arc::new(graph),
        codecs,
        telemetry,
        reporter,
        observer: None,
    })
}
