use std::fmt;

/// Opaque caller-chosen token echoed on every response to a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct CorrelationId(Vec<u8>);

impl CorrelationId {
    /// Wraps raw correlation bytes.
    #[must_use]
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Raw correlation bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consumes the id, returning its bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for CorrelationId {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for CorrelationId {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

/// Renders the id as lowercase hex for log fields.
impl fmt::Display for CorrelationId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(formatter, "{byte:02x}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_as_hex() {
        let id = CorrelationId::new(vec![0x00, 0xab, 0x10]);
        assert_eq!(id.to_string(), "00ab10");
    }
}
