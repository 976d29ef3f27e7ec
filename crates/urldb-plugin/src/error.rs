//! Typed errors raised by the plugin runtime.
//!
//! Load-time and registration-time errors surface synchronously to the
//! caller. Handler errors are recovered by the dispatcher and only logged.
//! Everything converts into [`AppError`] so the HTTP layer can map it.

use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use urldb_core::error::{AppError, ErrorKind};

use crate::registry::PluginState;

/// A plugin unit could not be parsed or compiled.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Neither `@name` nor a usable source location was found.
    #[error("plugin source '{location}' declares no @name")]
    MissingName {
        /// Source location of the unit.
        location: String,
    },

    /// `@name` is not a slug.
    #[error("plugin name '{name}' is invalid: only letters, digits, '-' and '_' are allowed")]
    InvalidName {
        /// The rejected name.
        name: String,
    },

    /// `@version` is present but not `x.y` or `x.y.z`.
    #[error("plugin '{plugin}': invalid version '{version}'")]
    InvalidVersion {
        /// Plugin name.
        plugin: String,
        /// The rejected version string.
        version: String,
    },

    /// An `@field` line could not be parsed.
    #[error("plugin '{plugin}': malformed @field on line {line}: {reason}")]
    MalformedField {
        /// Plugin name.
        plugin: String,
        /// 1-based line number in the source text.
        line: usize,
        /// What was wrong.
        reason: String,
    },

    /// Two `@field` lines share a key.
    #[error("plugin '{plugin}': config field '{key}' is declared twice")]
    DuplicateField {
        /// Plugin name.
        plugin: String,
        /// The repeated key.
        key: String,
    },

    /// An `@config` block was opened but never closed.
    #[error("plugin '{plugin}': @config block is not closed")]
    UnterminatedConfig {
        /// Plugin name.
        plugin: String,
    },

    /// A plugin with the same name is already in the catalogue.
    #[error("plugin '{plugin}' is already loaded from '{existing}'")]
    DuplicatePlugin {
        /// Plugin name.
        plugin: String,
        /// Location of the unit that won.
        existing: String,
    },

    /// A reloaded unit declares a different plugin name.
    #[error("plugin '{plugin}': reloaded unit declares plugin '{found}'")]
    NameMismatch {
        /// Plugin being reloaded.
        plugin: String,
        /// Name found in the new unit.
        found: String,
    },

    /// A `router_add` call was rejected while compiling.
    #[error("plugin '{plugin}': invalid route {method} {path}: {reason}")]
    InvalidRoute {
        /// Plugin name.
        plugin: String,
        /// HTTP method as declared.
        method: String,
        /// Path pattern as declared.
        path: String,
        /// What was wrong.
        reason: String,
    },

    /// A `cron_add` call carried an unparseable schedule.
    #[error(transparent)]
    Schedule(#[from] ScheduleParseError),

    /// `setup` returned an error or panicked.
    #[error("plugin '{plugin}': setup failed: {reason}")]
    Setup {
        /// Plugin name.
        plugin: String,
        /// Error or panic message.
        reason: String,
    },

    /// The unit's source text could not be read.
    #[error("failed to read plugin source '{location}': {source}")]
    Io {
        /// Source location.
        location: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A shared library could not be opened or lacks the entry symbol.
    #[error("failed to load plugin library '{location}': {reason}")]
    Library {
        /// Library path.
        location: String,
        /// Loader message.
        reason: String,
    },
}

impl LoadError {
    /// Returns the plugin this error is attributed to, when known.
    pub fn plugin(&self) -> Option<&str> {
        match self {
            Self::InvalidVersion { plugin, .. }
            | Self::MalformedField { plugin, .. }
            | Self::DuplicateField { plugin, .. }
            | Self::UnterminatedConfig { plugin }
            | Self::DuplicatePlugin { plugin, .. }
            | Self::NameMismatch { plugin, .. }
            | Self::InvalidRoute { plugin, .. }
            | Self::Setup { plugin, .. } => Some(plugin),
            Self::InvalidName { name } => Some(name),
            Self::Schedule(err) => Some(&err.plugin),
            Self::MissingName { .. } | Self::Io { .. } | Self::Library { .. } => None,
        }
    }
}

/// Two enabled plugins claimed overlapping `(method, path)` routes.
#[derive(Debug, Clone, Error)]
#[error(
    "route {method} {path} requested by plugin '{plugin}' conflicts with {method} {existing_path} owned by plugin '{existing_plugin}'"
)]
pub struct DuplicateRouteError {
    /// HTTP method.
    pub method: String,
    /// Requested path pattern.
    pub path: String,
    /// Plugin that asked for the route.
    pub plugin: String,
    /// Pattern already in the table.
    pub existing_path: String,
    /// Plugin owning the existing pattern.
    pub existing_plugin: String,
}

/// One rejected config field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Field key.
    pub key: String,
    /// Why it was rejected.
    pub message: String,
}

impl FieldError {
    /// Creates a field error.
    pub fn new(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// A config submission violated the plugin's schema.
#[derive(Debug, Clone, Error)]
#[error("invalid config for plugin '{plugin}': {}", summarize(.errors))]
pub struct ValidationError {
    /// Plugin name.
    pub plugin: String,
    /// Every rejected field, in schema order.
    pub errors: Vec<FieldError>,
}

fn summarize(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.key, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// A cron expression failed to parse at registration.
#[derive(Debug, Clone, Error)]
#[error("plugin '{plugin}': cron job '{job}' has invalid schedule '{schedule}': {reason}")]
pub struct ScheduleParseError {
    /// Plugin name.
    pub plugin: String,
    /// Job name.
    pub job: String,
    /// The rejected expression.
    pub schedule: String,
    /// Parser message.
    pub reason: String,
}

/// Error returned by plugin code: hook, route, cron and migration handlers
/// and `PluginScript::setup`.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct HandlerError {
    /// Human-readable message.
    pub message: String,
}

impl HandlerError {
    /// Creates a handler error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<AppError> for HandlerError {
    fn from(err: AppError) -> Self {
        Self::new(err.to_string())
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(format!("JSON error: {err}"))
    }
}

impl From<std::io::Error> for HandlerError {
    fn from(err: std::io::Error) -> Self {
        Self::new(format!("I/O error: {err}"))
    }
}

impl From<LoadError> for HandlerError {
    fn from(err: LoadError) -> Self {
        Self::new(err.to_string())
    }
}

impl From<ScheduleParseError> for HandlerError {
    fn from(err: ScheduleParseError) -> Self {
        Self::new(err.to_string())
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Direction a migration ran in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationDirection {
    /// `up`.
    Up,
    /// `down`.
    Down,
}

impl std::fmt::Display for MigrationDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Up => write!(f, "up"),
            Self::Down => write!(f, "down"),
        }
    }
}

/// A migration step failed; earlier steps stay applied.
#[derive(Debug, Clone, Error)]
#[error("plugin '{plugin}': migration {migration_id} ({direction}) failed: {reason}")]
pub struct MigrationError {
    /// Plugin name.
    pub plugin: String,
    /// Failing migration.
    pub migration_id: u32,
    /// `up` or `down`.
    pub direction: MigrationDirection,
    /// Handler message.
    pub reason: String,
}

/// Umbrella error for lifecycle and management operations.
#[derive(Debug, Error)]
pub enum PluginError {
    /// No plugin with that name is loaded.
    #[error("plugin '{0}' not found")]
    NotFound(String),

    /// The plugin is not in a state that allows the action.
    #[error("plugin '{plugin}' cannot {action} while {state}")]
    InvalidState {
        /// Plugin name.
        plugin: String,
        /// Current state.
        state: PluginState,
        /// Rejected action.
        action: &'static str,
    },

    /// The plugin has no cron job with that name.
    #[error("plugin '{plugin}' has no cron job '{job}'")]
    JobNotFound {
        /// Plugin name.
        plugin: String,
        /// Requested job.
        job: String,
    },

    /// Declared dependencies are not installed or not enabled.
    #[error("plugin '{plugin}' needs {} enabled", .missing.join(", "))]
    UnmetDependencies {
        /// Plugin name.
        plugin: String,
        /// Dependencies that are missing or not enabled.
        missing: Vec<String>,
    },

    /// Enabled plugins still depend on this one.
    #[error("plugin '{plugin}' cannot {action} while {} depend on it", .dependents.join(", "))]
    RequiredBy {
        /// Plugin name.
        plugin: String,
        /// Enabled dependents.
        dependents: Vec<String>,
        /// Rejected action.
        action: &'static str,
    },

    /// The plugin is part of a dependency cycle.
    #[error("circular plugin dependency: {}", .cycle.join(" -> "))]
    DependencyCycle {
        /// Closed path, first and last element equal.
        cycle: Vec<String>,
    },

    /// Loading or compiling failed.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Route registration conflicted.
    #[error(transparent)]
    DuplicateRoute(#[from] DuplicateRouteError),

    /// Config submission was rejected.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A cron schedule was rejected.
    #[error(transparent)]
    Schedule(#[from] ScheduleParseError),

    /// A migration failed.
    #[error(transparent)]
    Migration(#[from] MigrationError),

    /// Persistence or another host error.
    #[error(transparent)]
    Host(#[from] AppError),
}

impl PluginError {
    /// Shorthand for [`PluginError::InvalidState`].
    pub fn invalid_state(plugin: &str, state: PluginState, action: &'static str) -> Self {
        Self::InvalidState {
            plugin: plugin.to_string(),
            state,
            action,
        }
    }
}

impl From<PluginError> for AppError {
    fn from(err: PluginError) -> Self {
        let message = err.to_string();
        match err {
            PluginError::NotFound(plugin) => {
                AppError::not_found(message).with_details(json!({ "plugin": plugin }))
            }
            PluginError::JobNotFound { plugin, job } => {
                AppError::not_found(message).with_details(json!({ "plugin": plugin, "job": job }))
            }
            PluginError::InvalidState {
                plugin,
                state,
                action,
            } => AppError::conflict(message).with_details(json!({
                "plugin": plugin,
                "state": state,
                "action": action,
            })),
            PluginError::UnmetDependencies { plugin, missing } => AppError::conflict(message)
                .with_details(json!({ "plugin": plugin, "missing": missing })),
            PluginError::RequiredBy {
                plugin,
                dependents,
                action,
            } => AppError::conflict(message).with_details(json!({
                "plugin": plugin,
                "dependents": dependents,
                "action": action,
            })),
            PluginError::DependencyCycle { cycle } => {
                AppError::validation(message).with_details(json!({ "cycle": cycle }))
            }
            PluginError::Load(load) => {
                let details = json!({ "plugin": load.plugin() });
                AppError::new(ErrorKind::Validation, message).with_details(details)
            }
            PluginError::DuplicateRoute(dup) => AppError::conflict(message).with_details(json!({
                "plugin": dup.plugin,
                "method": dup.method,
                "path": dup.path,
                "conflicting_plugin": dup.existing_plugin,
                "conflicting_path": dup.existing_path,
            })),
            PluginError::Validation(invalid) => {
                AppError::validation(message).with_details(json!({
                    "plugin": invalid.plugin,
                    "fields": invalid.errors,
                }))
            }
            PluginError::Schedule(bad) => AppError::validation(message).with_details(json!({
                "plugin": bad.plugin,
                "job": bad.job,
                "schedule": bad.schedule,
            })),
            PluginError::Migration(failed) => AppError::plugin(message).with_details(json!({
                "plugin": failed.plugin,
                "migration_id": failed.migration_id,
                "direction": failed.direction,
            })),
            PluginError::Host(app) => app,
        }
    }
}

/// Result alias for runtime management operations.
pub type PluginResult<T> = Result<T, PluginError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_lists_every_field() {
        let err = ValidationError {
            plugin: "seo".into(),
            errors: vec![
                FieldError::new("api_key", "required field is missing"),
                FieldError::new("limit", "expected a number"),
            ],
        };
        assert_eq!(
            err.to_string(),
            "invalid config for plugin 'seo': api_key: required field is missing; limit: expected a number"
        );

        let app: AppError = PluginError::from(err).into();
        assert_eq!(app.kind, ErrorKind::Validation);
        let details = app.details.unwrap_or_default();
        assert_eq!(details["plugin"], "seo");
        assert_eq!(details["fields"][1]["key"], "limit");
    }

    #[test]
    fn test_duplicate_route_maps_to_conflict() {
        let err = DuplicateRouteError {
            method: "GET".into(),
            path: "/api/x/:id".into(),
            plugin: "b".into(),
            existing_path: "/api/x/:key".into(),
            existing_plugin: "a".into(),
        };
        let app: AppError = PluginError::from(err).into();
        assert_eq!(app.kind, ErrorKind::Conflict);
        assert!(app.message.contains("plugin 'a'"));
    }

    #[test]
    fn test_dependency_errors_name_the_plugins() {
        let err = PluginError::RequiredBy {
            plugin: "url_category".into(),
            dependents: vec!["seo".into(), "sitemap".into()],
            action: "disable",
        };
        assert_eq!(
            err.to_string(),
            "plugin 'url_category' cannot disable while seo, sitemap depend on it"
        );
        let app: AppError = err.into();
        assert_eq!(app.kind, ErrorKind::Conflict);

        let cycle = PluginError::DependencyCycle {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(cycle.to_string(), "circular plugin dependency: a -> b -> a");
    }

    #[test]
    fn test_invalid_state_names_the_action() {
        let err = PluginError::invalid_state("seo", PluginState::Enabled, "uninstall");
        assert_eq!(err.to_string(), "plugin 'seo' cannot uninstall while enabled");
    }
}
