//! Configuration facade: schema, runtime access, TOML storage, and the
//! debounced persistence service.

mod persistence;
mod runtime;
mod schema;
mod storage;

pub use persistence::{DEFAULT_SAVE_DELAY, PersistenceHandle, PersistenceService};
pub use runtime::{ConfigError, ConfigResult, ConfigRuntime, ConfigSnapshot};
pub use schema::{ConfigSchema, Parameter, SchemaError, ValueType};
pub use storage::{ConfigStorage, StorageError, StorageResult, parse_toml, render_toml};
