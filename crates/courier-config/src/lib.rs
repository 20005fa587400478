//! Shared configuration for the courier runtime.
//!
//! [`Config`] is layered by `ortho_config`: defaults, then a TOML file, then
//! `COURIER_*` environment variables, then command-line flags. Handler
//! capability settings are not part of [`Config`]; they are read on demand
//! through a [`ConfigSource`], scoped by a per-capability prefix.

mod defaults;
mod logging;
mod socket;
mod source;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

use courier_wire::Version;

pub use defaults::{
    DEFAULT_BASE_PATH, DEFAULT_KEEP_ALIVE_SECS, DEFAULT_LOG_FILTER, DEFAULT_TCP_PORT,
    default_base_path, default_keep_alive_secs, default_log_filter, default_log_filter_string,
    default_log_format, default_release_version, default_socket_endpoint,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use socket::{SocketEndpoint, SocketParseError, SocketPreparationError};
pub use source::{ConfigSource, ConfigSourceError, ConfigTable, EnvConfigSource, MapConfigSource};

/// Runtime configuration for `courierd`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "COURIER")]
pub struct Config {
    /// Socket the daemon listens on.
    #[serde(default = "default_socket_endpoint")]
    pub listen_socket: SocketEndpoint,
    /// Path prefix for duplex endpoints; each codec is served at
    /// `<base_path>/<codec>`.
    #[serde(default = "default_base_path")]
    pub base_path: String,
    /// Tracing filter expression.
    #[serde(default = "default_log_filter_string")]
    pub log_filter: String,
    /// Log output format.
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
    /// Seconds without outbound traffic before a liveness probe is sent.
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    /// Release version stamped on every response.
    #[serde(default = "default_release_version")]
    pub release_version: Version,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_socket: default_socket_endpoint(),
            base_path: default_base_path(),
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            keep_alive_secs: DEFAULT_KEEP_ALIVE_SECS,
            release_version: default_release_version(),
        }
    }
}

impl Config {
    /// Socket the daemon listens on.
    #[must_use]
    pub fn listen_socket(&self) -> &SocketEndpoint {
        &self.listen_socket
    }

    /// Endpoint path prefix with any trailing `/` removed.
    #[must_use]
    pub fn base_path(&self) -> &str {
        self.base_path.trim_end_matches('/')
    }

    /// Tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Keep-alive interval.
    #[must_use]
    pub fn keep_alive(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.keep_alive_secs.max(1))
    }

    /// Release version stamped on responses.
    #[must_use]
    pub fn release_version(&self) -> Version {
        self.release_version
    }

    /// Directory holding the Unix socket, when one is configured.
    #[must_use]
    pub fn socket_directory(&self) -> Option<Utf8PathBuf> {
        self.listen_socket
            .unix_path()
            .and_then(|path| path.parent())
            .map(|parent| parent.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.base_path(), "/api");
        assert_eq!(config.log_filter(), "info");
        assert_eq!(config.log_format(), LogFormat::Json);
        assert_eq!(config.keep_alive(), std::time::Duration::from_secs(30));
    }

    #[test]
    fn base_path_ignores_trailing_slash() {
        let config = Config {
            base_path: "/gateway/".to_owned(),
            ..Config::default()
        };
        assert_eq!(config.base_path(), "/gateway");
    }

    #[test]
    fn tcp_sockets_have_no_directory() {
        let config = Config {
            listen_socket: SocketEndpoint::tcp("127.0.0.1", 9000),
            ..Config::default()
        };
        assert!(config.socket_directory().is_none());
    }
}
