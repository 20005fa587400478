//! Prefix-scoped configuration for handler capabilities.
//!
//! A capability is a plain `Deserialize` type, such as a connection pool
//! setting or a rate limit, that a handler needs at construction time. The
//! component graph asks a [`ConfigSource`] for the table under the
//! capability's declared prefix and deserialises it.

use std::collections::BTreeMap;
use std::env;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors raised while reading capability configuration.
#[derive(Debug, Error)]
pub enum ConfigSourceError {
    /// The table did not match the requested type.
    #[error("configuration under '{prefix}' is invalid: {source}")]
    Invalid {
        prefix: String,
        #[source]
        source: serde_json::Error,
    },
    /// The backing store could not be read.
    #[error("failed to read configuration under '{prefix}': {message}")]
    Unavailable { prefix: String, message: String },
}

/// Flat key/value table for one prefix.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigTable {
    prefix: String,
    values: Map<String, Value>,
}

impl ConfigTable {
    /// Builds a table for `prefix`.
    #[must_use]
    pub fn new(prefix: impl Into<String>, values: Map<String, Value>) -> Self {
        Self {
            prefix: prefix.into(),
            values,
        }
    }

    /// Prefix the table was loaded for.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Looks up a raw value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Returns `true` when no keys were found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Deserialises the table into a typed capability.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigSourceError::Invalid`] when the keys do not match `T`.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, ConfigSourceError> {
        serde_json::from_value(Value::Object(self.values.clone())).map_err(|source| {
            ConfigSourceError::Invalid {
                prefix: self.prefix.clone(),
                source,
            }
        })
    }
}

/// Yields capability configuration by prefix.
pub trait ConfigSource: Send + Sync {
    /// Loads every key under `prefix`; an empty prefix means unscoped keys.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigSourceError::Unavailable`] when the backing store fails.
    fn load(&self, prefix: &str) -> Result<ConfigTable, ConfigSourceError>;
}

/// Reads `<APP>_<PREFIX>_<KEY>` environment variables.
///
/// Keys are lower-cased. Values are read as booleans, integers or floats when
/// they parse as such and as text otherwise.
#[derive(Debug, Clone)]
pub struct EnvConfigSource {
    app_prefix: String,
    vars: Option<BTreeMap<String, String>>,
}

impl EnvConfigSource {
    /// Source over the live process environment.
    #[must_use]
    pub fn new(app_prefix: impl Into<String>) -> Self {
        Self {
            app_prefix: app_prefix.into(),
            vars: None,
        }
    }

    /// Source over a fixed snapshot of variables.
    #[must_use]
    pub fn with_vars<I, K, V>(app_prefix: impl Into<String>, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            app_prefix: app_prefix.into(),
            vars: Some(
                vars.into_iter()
                    .map(|(key, value)| (key.into(), value.into()))
                    .collect(),
            ),
        }
    }

    fn scope(&self, prefix: &str) -> String {
        let mut scope = self.app_prefix.to_ascii_uppercase();
        if !prefix.is_empty() {
            scope.push('_');
            scope.push_str(&prefix.to_ascii_uppercase().replace(['.', '-'], "_"));
        }
        scope.push('_');
        scope
    }

    fn collect(&self, scope: &str, values: &mut Map<String, Value>, key: &str, raw: &str) {
        if let Some(name) = key.strip_prefix(scope).filter(|name| !name.is_empty()) {
            values.insert(name.to_ascii_lowercase(), parse_scalar(raw));
        }
    }
}

impl ConfigSource for EnvConfigSource {
    fn load(&self, prefix: &str) -> Result<ConfigTable, ConfigSourceError> {
        let scope = self.scope(prefix);
        let mut values = Map::new();
        match &self.vars {
            Some(vars) => {
                for (key, raw) in vars {
                    self.collect(&scope, &mut values, key, raw);
                }
            }
            None => {
                for (key, raw) in env::vars() {
                    self.collect(&scope, &mut values, &key, &raw);
                }
            }
        }
        Ok(ConfigTable::new(prefix, values))
    }
}

fn parse_scalar(raw: &str) -> Value {
    let trimmed = raw.trim();
    if let Ok(flag) = trimmed.parse::<bool>() {
        return Value::Bool(flag);
    }
    if let Ok(integer) = trimmed.parse::<i64>() {
        return Value::from(integer);
    }
    if let Some(number) = trimmed
        .parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
    {
        return Value::Number(number);
    }
    Value::String(raw.to_owned())
}

/// In-memory source keyed by prefix.
#[derive(Debug, Clone, Default)]
pub struct MapConfigSource {
    tables: BTreeMap<String, Map<String, Value>>,
}

impl MapConfigSource {
    /// Empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table for `prefix`; `values` must be a JSON object.
    #[must_use]
    pub fn with_table(mut self, prefix: impl Into<String>, values: Value) -> Self {
        let values = match values {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        self.tables.insert(prefix.into(), values);
        self
    }
}

impl ConfigSource for MapConfigSource {
    fn load(&self, prefix: &str) -> Result<ConfigTable, ConfigSourceError> {
        let values = self.tables.get(prefix).cloned().unwrap_or_default();
        Ok(ConfigTable::new(prefix, values))
    }
}
