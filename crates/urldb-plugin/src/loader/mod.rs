//! Script loading: parse a unit's header, then compile its body by running
//! `setup` against fresh, plugin-scoped bindings.

pub mod catalogue;
pub mod dynamic;
pub mod metadata;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::api::bindings::{Declarations, PluginBindings};
use crate::api::context::{HostServices, PluginContext};
use crate::error::{HandlerError, LoadError};
use crate::hooks::dispatcher::panic_message;

pub use catalogue::{CatalogueEntry, ScriptCatalogue};
pub use dynamic::{DynamicLoader, PluginExport};
pub use metadata::{MetadataParser, PluginMetadata, ScheduledTaskInfo};

/// The compiled body of a plugin, written against the SDK.
///
/// `setup` runs once per compile. It declares hooks, routes, cron jobs
/// and migrations on `bindings`; it must not block.
pub trait PluginScript: Send + Sync {
    /// Declares everything the plugin provides.
    fn setup(&self, bindings: &mut PluginBindings) -> Result<(), HandlerError>;
}

/// One plugin unit: header text plus compiled body.
#[derive(Clone)]
pub struct PluginSource {
    /// Where the unit came from, e.g. `builtin/url_category.rs`.
    pub location: String,
    /// Text carrying the doc-comment header.
    pub text: Arc<str>,
    /// The body.
    pub script: Arc<dyn PluginScript>,
}

impl std::fmt::Debug for PluginSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginSource")
            .field("location", &self.location)
            .finish()
    }
}

impl PluginSource {
    /// Creates a unit.
    pub fn new(
        location: impl Into<String>,
        text: impl Into<Arc<str>>,
        script: impl PluginScript + 'static,
    ) -> Self {
        Self {
            location: location.into(),
            text: text.into(),
            script: Arc::new(script),
        }
    }

    /// Creates a unit whose header lives in a file next to the body.
    pub async fn from_file(
        path: impl AsRef<std::path::Path>,
        script: Arc<dyn PluginScript>,
    ) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let location = path.display().to_string();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| LoadError::Io {
                location: location.clone(),
                source,
            })?;
        Ok(Self {
            location,
            text: text.into(),
            script,
        })
    }
}

/// A loaded unit: metadata plus the declarations `setup` made.
#[derive(Debug)]
pub struct CompiledPlugin {
    /// Parsed header.
    pub metadata: PluginMetadata,
    /// Recorded hooks, routes, jobs and migrations.
    pub declarations: Declarations,
    /// Context bound to this plugin.
    pub context: PluginContext,
    /// Source location.
    pub location: String,
}

/// Parses and compiles plugin units.
#[derive(Debug, Clone)]
pub struct ScriptLoader {
    parser: MetadataParser,
    host: Arc<HostServices>,
}

impl ScriptLoader {
    /// Creates a loader whose plugins share `host`.
    pub fn new(host: Arc<HostServices>) -> Self {
        Self {
            parser: MetadataParser::new(),
            host,
        }
    }

    /// Parses only the header of `source`.
    pub fn parse(&self, source: &PluginSource) -> Result<PluginMetadata, LoadError> {
        self.parser.parse(&source.location, &source.text)
    }

    /// Parses the header and runs `setup` once.
    ///
    /// A panic in `setup` becomes [`LoadError::Setup`]. When `setup` fails
    /// after a binding call was rejected, the rejected call is reported.
    pub fn compile(&self, source: &PluginSource) -> Result<CompiledPlugin, LoadError> {
        let metadata = self.parse(source)?;
        let context = PluginContext::new(&metadata.name, self.host.clone());
        let mut bindings = PluginBindings::new(context.clone());

        let script = source.script.clone();
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| script.setup(&mut bindings)));

        let reason = match result {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err.message),
            Err(payload) => Some(panic_message(payload.as_ref())),
        };

        if let Some(reason) = reason {
            warn!(plugin = %metadata.name, error = %reason, "Plugin setup failed");
            bindings.finish()?;
            return Err(LoadError::Setup {
                plugin: metadata.name,
                reason,
            });
        }

        let declarations = bindings.finish()?;
        debug!(
            plugin = %metadata.name,
            hooks = declarations.hooks.len(),
            routes = declarations.routes.len(),
            cron_jobs = declarations.cron_jobs.len(),
            migrations = declarations.migrations.len(),
            "Plugin compiled"
        );

        Ok(CompiledPlugin {
            metadata,
            declarations,
            context,
            location: source.location.clone(),
        })
    }
}
