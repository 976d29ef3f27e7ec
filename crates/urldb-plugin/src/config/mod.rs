//! Plugin configuration: schema, validation and storage.

pub mod schema;
pub mod store;
pub mod validator;

pub use schema::{ConfigFieldDescriptor, ConfigSchema, ConfigValue, FieldType, PluginConfig};
pub use store::ConfigStore;
