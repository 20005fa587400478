//! Structured health reporting for runtime lifecycle events.

use std::net::SocketAddr;
use std::sync::Arc;

use courier_config::{Config, SocketEndpoint};

use crate::bootstrap::BootstrapError;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer for lifecycle events, surfaced to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked once the operation registry is built.
    fn registry_loaded(&self, operations: usize);

    /// Invoked when the listener starts accepting connections.
    fn listener_started(&self, endpoint: &SocketEndpoint, local_addr: Option<SocketAddr>);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn registry_loaded(&self, operations: usize) {
        (**self).registry_loaded(operations);
    }

    fn listener_started(&self, endpoint: &SocketEndpoint, local_addr: Option<SocketAddr>) {
        (**self).listener_started(endpoint, local_addr);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting runtime bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            socket = %config.listen_socket(),
            base_path = config.base_path(),
            keep_alive_secs = config.keep_alive().as_secs(),
            release_version = %config.release_version(),
            log_filter = config.log_filter(),
            log_format = ?config.log_format(),
            "runtime bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "runtime bootstrap failed"
        );
    }

    fn registry_loaded(&self, operations: usize) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "registry_loaded",
            operations,
            "operation registry built"
        );
    }

    fn listener_started(&self, endpoint: &SocketEndpoint, local_addr: Option<SocketAddr>) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "listener_started",
            endpoint = %endpoint,
            local_addr = ?local_addr,
            "listener accepting connections"
        );
    }
}
