//! Three-part protocol and release versions.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Protocol version spoken by this runtime.
pub const PROTOCOL_VERSION: Version = Version::new(1, 0, 0);

/// A `major.minor.revision` version triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Version {
    major: u32,
    minor: u32,
    revision: u32,
}

impl Version {
    /// Builds a version from its components.
    #[must_use]
    pub const fn new(major: u32, minor: u32, revision: u32) -> Self {
        Self {
            major,
            minor,
            revision,
        }
    }

    /// Major component.
    #[must_use]
    pub const fn major(&self) -> u32 {
        self.major
    }

    /// Minor component.
    #[must_use]
    pub const fn minor(&self) -> u32 {
        self.minor
    }

    /// Revision component.
    #[must_use]
    pub const fn revision(&self) -> u32 {
        self.revision
    }

    /// Returns `true` when both versions share a major component.
    #[must_use]
    pub const fn is_compatible_with(&self, other: &Self) -> bool {
        self.major == other.major
    }
}

impl fmt::Display for Version {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}.{}.{}", self.major, self.minor, self.revision)
    }
}

/// Errors raised while parsing a [`Version`] from text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionParseError {
    /// The text did not contain exactly three dot-separated parts.
    #[error("version '{0}' must have the form major.minor.revision")]
    Shape(String),
    /// One of the parts was not a non-negative integer.
    #[error("version component '{component}' in '{input}' is not a number")]
    Component { input: String, component: String },
}

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = input.trim().split('.').collect();
        let [major, minor, revision] = parts.as_slice() else {
            return Err(VersionParseError::Shape(input.to_owned()));
        };
        let parse = |component: &str| {
            component
                .parse::<u32>()
                .map_err(|_| VersionParseError::Component {
                    input: input.to_owned(),
                    component: component.to_owned(),
                })
        };
        Ok(Self::new(parse(major)?, parse(minor)?, parse(revision)?))
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_str(VersionVisitor)
    }
}

struct VersionVisitor;

impl Visitor<'_> for VersionVisitor {
    type Value = Version;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a major.minor.revision version string")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Version, E> {
        value.parse().map_err(E::custom)
    }
}
