//! Built-in `core.diagnostics` module served by the `courierd` binary.
//!
//! | message type                | kind      | parameters                  |
//! |-----------------------------|-----------|-----------------------------|
//! | `core.diagnostics.ping`     | unary     | none                        |
//! | `core.diagnostics.echo`     | unary     | `value`                     |
//! | `core.diagnostics.count-to` | streaming | `limit`, optional `label`   |
//!
//! `count-to` emits one `core.diagnostics.count` envelope per step.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use courier_wire::Document;

use crate::bootstrap::RuntimeBlueprint;
use crate::components::{ComponentGraphBuilder, Dependencies};
use crate::dispatch::{Call, Emitter, MarshalableError, OperationError};
use crate::registry::{ModuleDefinition, OperationDefinition, ServiceDefinition};
use crate::session::ConnectionHandle;

/// Session data kept for each diagnostics connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonSession {
    peer: String,
    connected_at: Instant,
}

impl DaemonSession {
    /// Session for a freshly accepted connection.
    #[must_use]
    pub fn new(connection: &ConnectionHandle) -> Self {
        Self {
            peer: connection.peer().to_owned(),
            connected_at: Instant::now(),
        }
    }

    /// Peer the session belongs to.
    #[must_use]
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Time since the connection was accepted.
    #[must_use]
    pub fn connected_for(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn default_max_count() -> u32 {
    1000
}

/// Capability configuration under the `diagnostics` prefix, e.g.
/// `COURIER_DIAGNOSTICS_MAX_COUNT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct DiagnosticsLimits {
    #[serde(default = "default_max_count")]
    pub max_count: u32,
}

impl Default for DiagnosticsLimits {
    fn default() -> Self {
        Self {
            max_count: default_max_count(),
        }
    }
}

/// Answer to `core.diagnostics.ping`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pong {
    pub uptime_millis: u64,
    pub session_millis: u64,
    pub connection: String,
    pub peer: String,
}

/// Item emitted by `core.diagnostics.count-to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountItem {
    pub index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Raised when `count-to` asks for more items than the configured limit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("requested {requested} items but at most {max} are allowed")]
pub struct LimitExceeded {
    pub requested: u32,
    pub max: u32,
}

impl MarshalableError for LimitExceeded {
    fn protocol_message_type(&self) -> &str {
        "core.diagnostics.limit-exceeded"
    }

    fn details(&self) -> Vec<(String, Document)> {
        vec![
            ("requested".to_owned(), Document::Integer(self.requested.into())),
            ("max".to_owned(), Document::Integer(self.max.into())),
        ]
    }
}

/// Handler behind the diagnostics operations.
#[derive(Debug)]
pub struct DiagnosticsService {
    started: Instant,
    limits: Arc<DiagnosticsLimits>,
}

impl DiagnosticsService {
    /// Builds the service with the given limits.
    #[must_use]
    pub fn new(limits: Arc<DiagnosticsLimits>) -> Self {
        Self {
            started: Instant::now(),
            limits,
        }
    }

    fn ping(&self, call: &mut Call<'_, DaemonSession>) -> Result<Pong, OperationError> {
        Ok(Pong {
            uptime_millis: millis(self.started.elapsed()),
            session_millis: millis(call.session().connected_for()),
            connection: call.connection().id().to_string(),
            peer: call.session().peer().to_owned(),
        })
    }

    fn echo(call: &mut Call<'_, DaemonSession>) -> Result<Document, OperationError> {
        call.arg::<Document>("value")
    }

    fn count_to(
        &self,
        call: &mut Call<'_, DaemonSession>,
        emitter: &mut Emitter<'_, CountItem>,
    ) -> Result<(), OperationError> {
        let limit = call.arg::<u32>("limit")?;
        let label = call.optional_arg::<String>("label")?;
        if limit > self.limits.max_count {
            return Err(LimitExceeded {
                requested: limit,
                max: self.limits.max_count,
            }
            .into());
        }
        for index in 1..=limit {
            emitter.emit(
                ".count",
                &CountItem {
                    index,
                    label: label.clone(),
                },
            )?;
        }
        Ok(())
    }
}

/// The `core` module with its `diagnostics` service.
#[must_use]
pub fn module() -> ModuleDefinition<DaemonSession> {
    let service = ServiceDefinition::<DiagnosticsService, DaemonSession>::new("diagnostics")
        .operation(OperationDefinition::unary("ping", DiagnosticsService::ping))
        .operation(
            OperationDefinition::unary("echo", |_: &DiagnosticsService, call| {
                DiagnosticsService::echo(call)
            })
            .param::<Document>("value"),
        )
        .operation(
            OperationDefinition::streaming("countTo", DiagnosticsService::count_to)
                .param::<u32>("limit")
                .optional::<String>("label"),
        );
    ModuleDefinition::new("core").service(service)
}

/// Registers [`DiagnosticsService`] and its capability.
#[must_use]
pub fn register_components(builder: ComponentGraphBuilder) -> ComponentGraphBuilder {
    builder.component::<DiagnosticsService, _>(
        Dependencies::new().capability::<DiagnosticsLimits>("diagnostics"),
        |resolver| Ok(DiagnosticsService::new(resolver.capability()?)),
    )
}

/// Runtime blueprint serving only the diagnostics module.
#[must_use]
pub fn blueprint() -> RuntimeBlueprint<DaemonSession> {
    RuntimeBlueprint::new(DaemonSession::new)
        .components(register_components)
        .module(module())
}
