//! Error types for the socket transport.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use courier_wire::CloseStatus;

/// Errors surfaced while binding or running the socket listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to resolve TCP address {host}:{port}: {source}")]
    Resolve {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },
    #[error("no TCP addresses resolved for {host}:{port}")]
    ResolveEmpty { host: String, port: u16 },
    #[error("failed to bind TCP listener at {addr}: {source}")]
    BindTcp {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("failed to configure listener: {source}")]
    Configure {
        #[source]
        source: io::Error,
    },
    #[error("failed to spawn listener thread: {source}")]
    Spawn {
        #[source]
        source: io::Error,
    },
    #[cfg(not(unix))]
    #[error("unix sockets are unsupported for endpoint {endpoint}")]
    UnsupportedUnix { endpoint: String },
    #[cfg(unix)]
    #[error("failed to bind unix listener at {path}: {source}")]
    BindUnix {
        path: String,
        #[source]
        source: io::Error,
    },
    #[cfg(unix)]
    #[error("unix socket {path} is already served by another process")]
    UnixInUse { path: String },
    #[cfg(unix)]
    #[error("{path} exists and is not a unix socket")]
    UnixNotSocket { path: String },
    #[cfg(unix)]
    #[error("failed to inspect unix socket {path}: {source}")]
    UnixMetadata {
        path: String,
        #[source]
        source: io::Error,
    },
    #[cfg(unix)]
    #[error("failed to probe existing unix socket {path}: {source}")]
    UnixConnect {
        path: String,
        #[source]
        source: io::Error,
    },
    #[cfg(unix)]
    #[error("failed to remove stale unix socket {path}: {source}")]
    UnixCleanup {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("listener thread panicked")]
    ThreadPanic,
}

/// Errors raised while reading a transport frame.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The underlying stream failed or closed mid-frame.
    #[error("transport read failed: {0}")]
    Io(#[from] io::Error),
    /// The declared frame length exceeds the limit.
    #[error("frame of {size} bytes exceeds the {max} byte limit")]
    TooLarge { size: usize, max: usize },
    /// The opcode byte is not a known frame type.
    #[error("unknown frame opcode {0:#04x}")]
    UnknownOpcode(u8),
    /// A text frame did not hold UTF-8.
    #[error("text frame is not valid UTF-8")]
    InvalidText,
    /// A close frame body was truncated.
    #[error("close frame must carry a two byte status")]
    InvalidClose,
}

impl FrameError {
    /// Close status sent to the peer for this error.
    #[must_use]
    pub fn close_status(&self) -> CloseStatus {
        match self {
            Self::Io(_) => CloseStatus::ABNORMAL,
            Self::TooLarge { .. } => CloseStatus::TOO_LARGE,
            Self::UnknownOpcode(_) | Self::InvalidClose => CloseStatus::PROTOCOL_ERROR,
            Self::InvalidText => CloseStatus::BAD_PAYLOAD,
        }
    }
}
