use std::fmt;

/// Status code carried by a connection close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CloseStatus(u16);

impl CloseStatus {
    /// Orderly shutdown.
    pub const NORMAL: Self = Self(1000);
    /// The server is going away.
    pub const GOING_AWAY: Self = Self(1001);
    /// The peer violated the framing or envelope protocol.
    pub const PROTOCOL_ERROR: Self = Self(1002);
    /// A frame's framing kind did not match the bound codec.
    pub const BAD_DATA: Self = Self(1003);
    /// The peer closed without sending a status.
    pub const NO_STATUS: Self = Self(1005);
    /// The connection dropped without a close frame.
    pub const ABNORMAL: Self = Self(1006);
    /// A frame could not be decoded into an envelope.
    pub const BAD_PAYLOAD: Self = Self(1007);
    /// A message arrived for a connection without a session.
    pub const POLICY_VIOLATION: Self = Self(1008);
    /// A frame exceeded the maximum size.
    pub const TOO_LARGE: Self = Self(1009);
    /// The server hit an unexpected condition.
    pub const INTERNAL_ERROR: Self = Self(1011);
    /// No endpoint matched the requested path.
    pub const NOT_FOUND: Self = Self(4404);

    /// Builds a status from a raw code.
    #[must_use]
    pub const fn from_code(code: u16) -> Self {
        Self(code)
    }

    /// Raw numeric code.
    #[must_use]
    pub const fn code(self) -> u16 {
        self.0
    }
}

impl fmt::Display for CloseStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}
