//! Layered configuration loading through command-line flags and files.

use std::ffi::OsString;
use std::fs;

use rstest::{fixture, rstest};
use tempfile::TempDir;

use courier_config::{Config, LogFormat, SocketEndpoint};
use courier_wire::Version;
use ortho_config::OrthoConfig;

#[fixture]
fn config_dir() -> TempDir {
    TempDir::new().expect("temporary directory")
}

fn args(extra: &[&str]) -> Vec<OsString> {
    std::iter::once("courierd")
        .chain(extra.iter().copied())
        .map(OsString::from)
        .collect()
}

#[rstest]
fn cli_flags_override_defaults() {
    let config = Config::load_from_iter(args(&[
        "--listen-socket",
        "tcp://127.0.0.1:9000",
        "--log-filter",
        "debug",
        "--log-format",
        "compact",
        "--keep-alive-secs",
        "5",
    ]))
    .expect("configuration should load");

    assert_eq!(config.listen_socket(), &SocketEndpoint::tcp("127.0.0.1", 9000));
    assert_eq!(config.log_filter(), "debug");
    assert_eq!(config.log_format(), LogFormat::Compact);
    assert_eq!(config.keep_alive_secs, 5);
}

#[rstest]
fn release_version_parses_from_flag() {
    let config = Config::load_from_iter(args(&["--release-version", "4.2.0"]))
        .expect("configuration should load");
    assert_eq!(config.release_version(), Version::new(4, 2, 0));
}

#[rstest]
fn invalid_socket_fails_fast() {
    let result = Config::load_from_iter(args(&["--listen-socket", "invalid://socket"]));
    assert!(result.is_err(), "unsupported schemes must be rejected");
}

#[rstest]
fn file_values_are_read_from_config_path(config_dir: TempDir) {
    let path = config_dir.path().join("courier.toml");
    fs::write(
        &path,
        "listen_socket = \"tcp://127.0.0.1:7100\"\nbase_path = \"/gateway\"\n",
    )
    .expect("write configuration");

    let path = path.to_str().expect("utf8 path");
    let config = Config::load_from_iter(args(&["--config-path", path]))
        .expect("configuration should load");

    assert_eq!(config.listen_socket(), &SocketEndpoint::tcp("127.0.0.1", 7100));
    assert_eq!(config.base_path(), "/gateway");
}
