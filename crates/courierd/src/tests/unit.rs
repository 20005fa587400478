//! Bootstrap and process lifecycle tests.

use std::sync::Arc;

use courier_config::{Config, SocketEndpoint};

use crate::bootstrap::{BootstrapError, StaticConfigLoader, bootstrap_with};
use crate::components::{ComponentError, Dependencies};
use crate::diagnostics::{self, DaemonSession};
use crate::process::run_daemon_with;
use crate::registry::RegistryError;
use crate::shutdown::{ShutdownError, ShutdownSignal};
use crate::transport::ListenerError;

use super::support::{
    FailingConfigLoader, HealthEvent, RecordingHealthReporter, TestConfigLoader,
};

struct ImmediateShutdown;

impl ShutdownSignal for ImmediateShutdown {
    fn wait(&self) -> Result<(), ShutdownError> {
        Ok(())
    }
}

struct Unregistered;

#[test]
fn bootstrap_reports_each_stage() {
    let reporter = Arc::new(RecordingHealthReporter::default());
    let server = bootstrap_with(
        &TestConfigLoader::tcp(),
        Arc::clone(&reporter) as _,
        diagnostics::blueprint(),
    )
    .expect("bootstrap should succeed");

    assert_eq!(
        reporter.events(),
        [
            HealthEvent::BootstrapStarting,
            HealthEvent::RegistryLoaded(3),
            HealthEvent::BootstrapSucceeded,
        ]
    );
    assert_eq!(server.dispatcher().registry().len(), 3);
    assert!(server.graph().contains::<diagnostics::DiagnosticsService>());
}

#[test]
fn configuration_failures_are_reported() {
    let reporter = Arc::new(RecordingHealthReporter::default());
    let error = bootstrap_with(
        &FailingConfigLoader,
        Arc::clone(&reporter) as _,
        diagnostics::blueprint(),
    )
    .err()
    .expect("bootstrap should fail");

    assert!(matches!(error, BootstrapError::Configuration { .. }));
    let events = reporter.events();
    assert_eq!(events.first(), Some(&HealthEvent::BootstrapStarting));
    assert!(matches!(
        events.last(),
        Some(HealthEvent::BootstrapFailed(message)) if message.contains("configuration")
    ));
}

#[test]
fn duplicate_modules_fail_registry_construction() {
    let reporter = Arc::new(RecordingHealthReporter::default());
    let blueprint = diagnostics::blueprint().module(diagnostics::module());
    let error = bootstrap_with(&TestConfigLoader::tcp(), Arc::clone(&reporter) as _, blueprint)
        .err()
        .expect("duplicate operations");

    assert!(matches!(
        error,
        BootstrapError::Registry {
            source: RegistryError::DuplicateMessageType { .. }
        }
    ));
    assert!(!reporter.events().contains(&HealthEvent::BootstrapSucceeded));
}

#[test]
fn unregistered_dependencies_fail_graph_construction() {
    let blueprint = diagnostics::blueprint().components(|builder| {
        builder.component::<String, _>(Dependencies::new().component::<Unregistered>(), |_| {
            Ok(String::new())
        })
    });
    let error = bootstrap_with(
        &TestConfigLoader::tcp(),
        Arc::new(RecordingHealthReporter::default()),
        blueprint,
    )
    .err()
    .expect("unregistered dependency");

    assert!(matches!(
        error,
        BootstrapError::Components {
            source: ComponentError::Unregistered { .. }
        }
    ));
}

#[cfg(unix)]
#[test]
fn socket_directories_that_cannot_be_created_fail_bootstrap() {
    use std::fs;

    use tempfile::TempDir;

    let dir = TempDir::new().expect("temporary directory");
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, b"not a directory").expect("write blocker file");
    let socket = blocker.join("courierd.sock");
    let config = Config {
        listen_socket: SocketEndpoint::unix(socket.to_str().expect("utf-8 path")),
        ..Config::default()
    };

    let error = bootstrap_with(
        &StaticConfigLoader::new(config),
        Arc::new(RecordingHealthReporter::default()),
        diagnostics::blueprint(),
    )
    .err()
    .expect("socket preparation fails");

    assert!(matches!(error, BootstrapError::Socket { .. }));
}

#[cfg(unix)]
#[test]
fn live_unix_sockets_are_not_taken_over() {
    let loader = TestConfigLoader::unix();
    let first = bootstrap_with(
        &loader,
        Arc::new(RecordingHealthReporter::default()),
        diagnostics::blueprint(),
    )
    .expect("first bootstrap");
    let running = first.serve().expect("first serve");

    let second = bootstrap_with(
        &loader,
        Arc::new(RecordingHealthReporter::default()),
        diagnostics::blueprint(),
    )
    .expect("second bootstrap");
    let error = second.serve().err().expect("socket in use");

    assert!(matches!(
        error,
        BootstrapError::Listener {
            source: ListenerError::UnixInUse { .. }
        }
    ));
    running.shutdown();
    running.join().expect("listener joins");
}

#[cfg(unix)]
#[test]
fn daemon_runs_until_shutdown_is_signalled() {
    let loader = TestConfigLoader::unix();
    let reporter = Arc::new(RecordingHealthReporter::default());
    run_daemon_with::<DaemonSession>(
        &loader,
        Arc::clone(&reporter) as _,
        &ImmediateShutdown,
        diagnostics::blueprint(),
    )
    .expect("daemon should run");

    let events = reporter.events();
    assert!(events.contains(&HealthEvent::BootstrapSucceeded));
    assert!(
        events
            .iter()
            .any(|event| matches!(event, HealthEvent::ListenerStarted(_)))
    );
    assert!(!std::path::Path::new(&loader.socket_path()).exists());
}
