//! Test harness utilities shared by the runtime suites.

mod client;
mod config_loader;
mod reporter;
mod server;

pub use client::TestClient;
pub use config_loader::{FailingConfigLoader, TestConfigLoader};
pub use reporter::{HealthEvent, RecordingHealthReporter};
pub use server::{RecordingSessionListener, TestServer};
