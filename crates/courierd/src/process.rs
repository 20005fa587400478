//! Runs the daemon until a shutdown signal arrives.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::bootstrap::{
    BootstrapError, ConfigLoader, RuntimeBlueprint, SystemConfigLoader, bootstrap_with,
};
use crate::diagnostics;
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::shutdown::{ShutdownError, ShutdownSignal, SystemShutdownSignal};
use crate::transport::ListenerError;

const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");

/// Errors that end the daemon process.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Bootstrap or listener start-up failed.
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
    /// Waiting for the shutdown signal failed.
    #[error(transparent)]
    Shutdown(#[from] ShutdownError),
    /// The accept loop did not stop cleanly.
    #[error("listener did not stop cleanly: {0}")]
    Listener(#[from] ListenerError),
}

/// Runs the built-in diagnostics daemon with production collaborators.
///
/// # Errors
///
/// Returns a [`LaunchError`] when bootstrap, signal handling or listener
/// shutdown fails.
pub fn run_daemon() -> Result<(), LaunchError> {
    run_daemon_with(
        &SystemConfigLoader,
        Arc::new(StructuredHealthReporter::new()),
        &SystemShutdownSignal,
        diagnostics::blueprint(),
    )
}

/// Runs `blueprint` with injected collaborators.
///
/// # Errors
///
/// Returns a [`LaunchError`] when bootstrap, signal handling or listener
/// shutdown fails.
pub fn run_daemon_with<S: Send + Sync + 'static>(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    shutdown: &dyn ShutdownSignal,
    blueprint: RuntimeBlueprint<S>,
) -> Result<(), LaunchError> {
    let server = bootstrap_with(loader, reporter, blueprint)?;
    let handle = server.serve()?;
    shutdown.wait()?;
    handle.shutdown();
    handle.join()?;
    info!(
        target: PROCESS_TARGET,
        "shutdown sequence completed"
    );
    Ok(())
}
