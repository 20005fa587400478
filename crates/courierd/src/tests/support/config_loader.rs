//! Test configuration loaders for scenarios covering success and failure paths.

use std::ffi::OsString;
use std::sync::{Arc, Mutex};

use ortho_config::{OrthoConfig, OrthoError};
use tempfile::TempDir;

use courier_config::{Config, LogFormat, SocketEndpoint};

use crate::bootstrap::ConfigLoader;

/// Loader for a loopback TCP port or a Unix socket under a temporary
/// directory.
pub struct TestConfigLoader {
    socket_dir: Arc<Mutex<TempDir>>,
    unix: bool,
    keep_alive_secs: u64,
}

impl TestConfigLoader {
    /// Listens on an ephemeral loopback port.
    #[must_use]
    pub fn tcp() -> Self {
        Self::with_transport(false)
    }

    /// Listens on `courierd.sock` inside a fresh temporary directory.
    #[must_use]
    pub fn unix() -> Self {
        Self::with_transport(true)
    }

    fn with_transport(unix: bool) -> Self {
        let dir = TempDir::new().expect("failed to create temporary directory for socket");
        Self {
            socket_dir: Arc::new(Mutex::new(dir)),
            unix,
            keep_alive_secs: 30,
        }
    }

    /// Overrides the keep-alive interval.
    #[must_use]
    pub fn keep_alive_secs(mut self, secs: u64) -> Self {
        self.keep_alive_secs = secs;
        self
    }

    /// Path of the Unix socket, whether or not it is in use.
    pub fn socket_path(&self) -> String {
        let dir = self
            .socket_dir
            .lock()
            .expect("temporary directory mutex poisoned");
        let path = dir.path().join("courierd.sock");
        path.to_str()
            .expect("temporary socket path was not valid UTF-8")
            .to_owned()
    }
}

impl ConfigLoader for TestConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let listen_socket = if self.unix {
            SocketEndpoint::unix(self.socket_path())
        } else {
            SocketEndpoint::tcp("127.0.0.1", 0)
        };
        Ok(Config {
            listen_socket,
            log_filter: "courierd=debug".to_owned(),
            log_format: LogFormat::Compact,
            keep_alive_secs: self.keep_alive_secs,
            ..Config::default()
        })
    }
}

/// Loader that intentionally fails by passing invalid CLI arguments.
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let args = vec![
            OsString::from("courierd"),
            OsString::from("--listen-socket"),
            OsString::from("invalid://socket"),
        ];
        Config::load_from_iter(args)
    }
}
