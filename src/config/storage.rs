//! TOML persistence for the configuration tree.
//!
//! Loads `[section] key = value` tables into the flat `section.key` map the
//! runtime uses and writes them back with native TOML types where the schema
//! declares one. Saves replace the file atomically (write temp + rename) so
//! a crash mid-save never corrupts the config.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::schema::{ConfigSchema, ValueType};

/// Errors from loading or saving the configuration file.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("invalid configuration structure: {0}")]
    InvalidStructure(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Configuration file handler.
pub struct ConfigStorage {
    path: PathBuf,
    schema: ConfigSchema,
}

impl ConfigStorage {
    /// Create a storage handler for the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            schema: ConfigSchema::new(),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the file into a flat value map.
    pub fn load(&self) -> StorageResult<HashMap<String, String>> {
        let text = fs::read_to_string(&self.path)?;
        parse_toml(&text)
    }

    /// Load the file, or return an empty tree when it does not exist.
    pub fn load_or_default(&self) -> StorageResult<HashMap<String, String>> {
        match self.load() {
            Ok(values) => Ok(values),
            Err(StorageError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                Ok(HashMap::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Save a flat value map, atomically replacing the file.
    pub fn save(&self, values: &HashMap<String, String>) -> StorageResult<()> {
        let text = self.render(values);

        let tmp = self.path.with_extension("toml.tmp");
        fs::write(&tmp, text.as_bytes())?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn render(&self, values: &HashMap<String, String>) -> String {
        let mut root = toml::Table::new();

        let mut keys: Vec<&String> = values.keys().collect();
        keys.sort();

        for full_key in keys {
            let Some((section, key)) = full_key.split_once('.') else {
                continue;
            };
            let value = &values[full_key];

            let table = root
                .entry(section.to_string())
                .or_insert_with(|| toml::Value::Table(toml::Table::new()));
            if let toml::Value::Table(table) = table {
                table.insert(key.to_string(), self.typed_value(section, key, value));
            }
        }

        toml::to_string_pretty(&root).unwrap_or_default()
    }

    /// Render a stored string with the schema-declared TOML type.
    fn typed_value(&self, section: &str, key: &str, value: &str) -> toml::Value {
        let value_type = self
            .schema
            .get(section, key)
            .map(|p| p.value_type)
            .unwrap_or(ValueType::String);

        match value_type {
            ValueType::Int => value
                .parse::<i64>()
                .map(toml::Value::Integer)
                .unwrap_or_else(|_| toml::Value::String(value.to_string())),
            ValueType::Float => value
                .parse::<f64>()
                .map(toml::Value::Float)
                .unwrap_or_else(|_| toml::Value::String(value.to_string())),
            ValueType::Bool => value
                .parse::<bool>()
                .map(toml::Value::Boolean)
                .unwrap_or_else(|_| toml::Value::String(value.to_string())),
            ValueType::String => toml::Value::String(value.to_string()),
        }
    }
}

/// Render a flat value map as TOML text with schema-typed values.
///
/// Used by `ConfigStorage::save` and by GetSystemBackup, which ships the
/// rendered tree as the backup payload.
pub fn render_toml(values: &HashMap<String, String>) -> String {
    ConfigStorage {
        path: PathBuf::new(),
        schema: ConfigSchema::new(),
    }
    .render(values)
}

/// Parse TOML text into the flat `section.key` map.
pub fn parse_toml(text: &str) -> StorageResult<HashMap<String, String>> {
    let root: toml::Table = text.parse()?;
    let mut values = HashMap::new();

    for (section, entry) in &root {
        let toml::Value::Table(table) = entry else {
            return Err(StorageError::InvalidStructure(format!(
                "top-level entry '{}' is not a table",
                section
            )));
        };
        for (key, value) in table {
            let rendered = match value {
                toml::Value::String(s) => s.clone(),
                toml::Value::Integer(i) => i.to_string(),
                toml::Value::Float(f) => f.to_string(),
                toml::Value::Boolean(b) => b.to_string(),
                other => other.to_string(),
            };
            values.insert(format!("{}.{}", section, key), rendered);
        }
    }

    Ok(values)
}
