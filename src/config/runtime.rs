//! Runtime configuration access keyed by `(section, key)`.
//!
//! All daemon components read and mutate configuration through
//! [`ConfigRuntime`]. Reads fall back to schema defaults; writes validate
//! against the schema and bump a monotonic generation counter so other
//! components can detect changes without subscribing to anything.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use thiserror::Error;

use super::schema::{ConfigSchema, SchemaError, ValueType};

/// Errors from configuration reads and writes.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration key not found: {section}.{key}")]
    KeyNotFound { section: String, key: String },

    #[error("value for {section}.{key} is not a valid {expected}")]
    ParseError {
        section: String,
        key: String,
        expected: &'static str,
    },

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

fn path(section: &str, key: &str) -> String {
    format!("{}.{}", section, key)
}

/// Immutable view of the whole configuration tree at one generation.
#[derive(Clone)]
pub struct ConfigSnapshot {
    values: Arc<HashMap<String, String>>,
    generation: u64,
}

impl ConfigSnapshot {
    /// Raw value lookup, no default fallback.
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.values.get(&path(section, key)).map(String::as_str)
    }

    /// Generation at which this snapshot was taken.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// All stored `section.key` entries.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Thread-safe configuration runtime.
///
/// Single-writer/many-reader: reads take the shared lock briefly and never
/// block each other; writes take the exclusive lock for the insertion only.
pub struct ConfigRuntime {
    values: RwLock<HashMap<String, String>>,
    schema: ConfigSchema,
    generation: AtomicU64,
}

impl ConfigRuntime {
    /// Create a runtime over an initial value tree.
    pub fn new(values: HashMap<String, String>) -> Self {
        Self {
            values: RwLock::new(values),
            schema: ConfigSchema::new(),
            generation: AtomicU64::new(0),
        }
    }

    /// Empty runtime: every read resolves to its schema default.
    pub fn with_defaults() -> Self {
        Self::new(HashMap::new())
    }

    /// Current generation. Incremented by every successful set.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// The schema this runtime validates against.
    pub fn schema(&self) -> &ConfigSchema {
        &self.schema
    }

    /// Take an immutable snapshot of the tree.
    pub fn snapshot(&self) -> ConfigSnapshot {
        let values = self.values.read();
        ConfigSnapshot {
            values: Arc::new(values.clone()),
            generation: self.generation(),
        }
    }

    fn raw_get(&self, section: &str, key: &str) -> ConfigResult<String> {
        if let Some(value) = self.values.read().get(&path(section, key)) {
            return Ok(value.clone());
        }
        self.schema
            .default_value(section, key)
            .map(str::to_string)
            .ok_or_else(|| ConfigError::KeyNotFound {
                section: section.to_string(),
                key: key.to_string(),
            })
    }

    fn raw_set(&self, section: &str, key: &str, value: String) -> ConfigResult<()> {
        self.schema.validate(section, key, &value)?;
        self.values.write().insert(path(section, key), value);
        self.generation.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Get a string value.
    pub fn get_str(&self, section: &str, key: &str) -> ConfigResult<String> {
        self.raw_get(section, key)
    }

    /// Set a string value.
    pub fn set_str(&self, section: &str, key: &str, value: &str) -> ConfigResult<()> {
        self.check_type(section, key, ValueType::String)?;
        self.raw_set(section, key, value.to_string())
    }

    /// Get an integer value.
    pub fn get_int(&self, section: &str, key: &str) -> ConfigResult<i64> {
        self.raw_get(section, key)?
            .parse()
            .map_err(|_| ConfigError::ParseError {
                section: section.to_string(),
                key: key.to_string(),
                expected: "integer",
            })
    }

    /// Set an integer value.
    pub fn set_int(&self, section: &str, key: &str, value: i64) -> ConfigResult<()> {
        self.check_type(section, key, ValueType::Int)?;
        self.raw_set(section, key, value.to_string())
    }

    /// Get a boolean value.
    pub fn get_bool(&self, section: &str, key: &str) -> ConfigResult<bool> {
        self.raw_get(section, key)?
            .parse()
            .map_err(|_| ConfigError::ParseError {
                section: section.to_string(),
                key: key.to_string(),
                expected: "boolean",
            })
    }

    /// Set a boolean value.
    pub fn set_bool(&self, section: &str, key: &str, value: bool) -> ConfigResult<()> {
        self.check_type(section, key, ValueType::Bool)?;
        self.raw_set(section, key, value.to_string())
    }

    /// Get a float value.
    pub fn get_float(&self, section: &str, key: &str) -> ConfigResult<f64> {
        self.raw_get(section, key)?
            .parse()
            .map_err(|_| ConfigError::ParseError {
                section: section.to_string(),
                key: key.to_string(),
                expected: "float",
            })
    }

    /// Set a float value.
    pub fn set_float(&self, section: &str, key: &str, value: f64) -> ConfigResult<()> {
        self.check_type(section, key, ValueType::Float)?;
        self.raw_set(section, key, value.to_string())
    }

    /// Remove a stored value, reverting reads to the schema default.
    pub fn unset(&self, section: &str, key: &str) {
        if self.values.write().remove(&path(section, key)).is_some() {
            self.generation.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Reset a whole section to schema defaults.
    pub fn reset_section(&self, section: &str) {
        let prefix = format!("{}.", section);
        let mut values = self.values.write();
        let before = values.len();
        values.retain(|k, _| !k.starts_with(&prefix));
        if values.len() != before {
            self.generation.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Replace the entire tree (used by RestoreSystem).
    pub fn replace_all(&self, values: HashMap<String, String>) {
        *self.values.write() = values;
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    fn check_type(&self, section: &str, key: &str, expected: ValueType) -> ConfigResult<()> {
        if let Some(param) = self.schema.get(section, key)
            && param.value_type != expected
        {
            return Err(ConfigError::ParseError {
                section: section.to_string(),
                key: key.to_string(),
                expected: match param.value_type {
                    ValueType::Int => "integer",
                    ValueType::String => "string",
                    ValueType::Bool => "boolean",
                    ValueType::Float => "float",
                },
            });
        }
        Ok(())
    }
}

impl Default for ConfigRuntime {
    fn default() -> Self {
        Self::with_defaults()
    }
}
