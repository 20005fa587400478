use camino::Utf8PathBuf;

#[cfg(unix)]
use libc::geteuid;

#[cfg(unix)]
use dirs::runtime_dir;

use courier_wire::Version;

use crate::logging::LogFormat;
use crate::socket::SocketEndpoint;

/// TCP port used when Unix domain sockets are not available.
pub const DEFAULT_TCP_PORT: u16 = 9838;

/// Default log filter expression.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default path prefix for duplex endpoints.
pub const DEFAULT_BASE_PATH: &str = "/api";

/// Default keep-alive interval in seconds.
pub const DEFAULT_KEEP_ALIVE_SECS: u64 = 30;

/// Default log filter expression.
#[must_use]
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value for serde defaults.
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format.
#[must_use]
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Owned base path for serde defaults.
#[must_use]
pub fn default_base_path() -> String {
    DEFAULT_BASE_PATH.to_owned()
}

/// Keep-alive interval for serde defaults.
#[must_use]
pub fn default_keep_alive_secs() -> u64 {
    DEFAULT_KEEP_ALIVE_SECS
}

/// The package version of this build.
#[must_use]
pub fn default_release_version() -> Version {
    env!("CARGO_PKG_VERSION").parse().unwrap_or_default()
}

/// Computes the default listening socket.
#[must_use]
pub fn default_socket_endpoint() -> SocketEndpoint {
    default_socket_endpoint_inner()
}

#[cfg(unix)]
fn default_socket_endpoint_inner() -> SocketEndpoint {
    let mut base = runtime_dir()
        .and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
        .unwrap_or_else(|| {
            let mut fallback = Utf8PathBuf::from_path_buf(std::env::temp_dir())
                .unwrap_or_else(|_| Utf8PathBuf::from("/tmp"));
            fallback.push(format!("courier-uid-{}", unsafe { geteuid() }));
            fallback
        });
    base.push("courier");
    SocketEndpoint::unix(base.join("courierd.sock"))
}

#[cfg(not(unix))]
fn default_socket_endpoint_inner() -> SocketEndpoint {
    SocketEndpoint::tcp("127.0.0.1", DEFAULT_TCP_PORT)
}
