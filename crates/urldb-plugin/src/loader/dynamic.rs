//! Dynamic plugin loader using `libloading` (feature-gated).
//!
//! A plugin library exports `urldb_plugin_create`, usually through
//! [`export_plugin!`](crate::export_plugin), returning a boxed
//! [`PluginExport`].

use std::sync::Arc;

use super::PluginScript;

/// Symbol every plugin library must export.
pub const CREATE_SYMBOL: &[u8] = b"urldb_plugin_create";

/// What a plugin library hands to the host.
pub struct PluginExport {
    /// Doc-comment header text.
    pub header: String,
    /// The compiled body.
    pub script: Arc<dyn PluginScript>,
}

impl PluginExport {
    /// Creates an export.
    pub fn new(header: impl Into<String>, script: impl PluginScript + 'static) -> Self {
        Self {
            header: header.into(),
            script: Arc::new(script),
        }
    }
}

/// Signature of the exported constructor.
pub type CreatePluginFn = unsafe extern "C" fn() -> *mut PluginExport;

#[cfg(feature = "dynamic")]
mod imp {
    use std::path::Path;

    use tracing::{info, warn};

    use super::{CREATE_SYMBOL, CreatePluginFn};
    use crate::error::LoadError;
    use crate::loader::PluginSource;

    /// Loads plugin units from shared libraries (.so / .dll / .dylib).
    pub struct DynamicLoader {
        // Must outlive every script created from them.
        libraries: Vec<libloading::Library>,
    }

    impl DynamicLoader {
        /// Creates a loader.
        pub fn new() -> Self {
            Self {
                libraries: Vec::new(),
            }
        }

        /// Loads one library.
        ///
        /// # Safety
        /// Runs arbitrary code from the library. Only load trusted plugins
        /// built against the same version of this crate.
        pub unsafe fn load_from_path(&mut self, path: &Path) -> Result<PluginSource, LoadError> {
            let location = path.display().to_string();
            let library_error = |reason: String| LoadError::Library {
                location: location.clone(),
                reason,
            };

            let lib = unsafe { libloading::Library::new(path) }
                .map_err(|e| library_error(e.to_string()))?;

            let export = {
                let create: libloading::Symbol<CreatePluginFn> = unsafe { lib.get(CREATE_SYMBOL) }
                    .map_err(|e| library_error(format!("missing 'urldb_plugin_create': {e}")))?;
                let raw = unsafe { create() };
                if raw.is_null() {
                    return Err(library_error("constructor returned null".to_string()));
                }
                unsafe { Box::from_raw(raw) }
            };

            info!(path = %location, "Dynamic plugin library loaded");
            self.libraries.push(lib);

            Ok(PluginSource {
                location,
                text: export.header.into(),
                script: export.script,
            })
        }

        /// Loads every library in `dir`. A missing directory yields nothing.
        ///
        /// # Safety
        /// See [`DynamicLoader::load_from_path`].
        pub unsafe fn discover(&mut self, dir: &Path) -> Vec<Result<PluginSource, LoadError>> {
            let entries = match std::fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Plugin directory not readable");
                    return Vec::new();
                }
            };

            let mut paths: Vec<_> = entries
                .filter_map(Result::ok)
                .map(|entry| entry.path())
                .filter(|path| {
                    path.extension()
                        .is_some_and(|ext| ext == std::env::consts::DLL_EXTENSION)
                })
                .collect();
            paths.sort();

            paths
                .iter()
                .map(|path| unsafe { self.load_from_path(path) })
                .collect()
        }
    }

    impl Default for DynamicLoader {
        fn default() -> Self {
            Self::new()
        }
    }

    impl std::fmt::Debug for DynamicLoader {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("DynamicLoader")
                .field("loaded_count", &self.libraries.len())
                .finish()
        }
    }
}

/// Stub loader when the `dynamic` feature is not enabled.
#[cfg(not(feature = "dynamic"))]
mod imp {
    use std::path::Path;

    use tracing::debug;

    use crate::error::LoadError;
    use crate::loader::PluginSource;

    /// Stub dynamic loader; discovers nothing.
    #[derive(Debug, Default)]
    pub struct DynamicLoader;

    impl DynamicLoader {
        /// Creates a stub loader.
        pub fn new() -> Self {
            Self
        }

        /// Always empty without the `dynamic` feature.
        ///
        /// # Safety
        /// Nothing is loaded; the signature matches the real loader.
        pub unsafe fn discover(&mut self, dir: &Path) -> Vec<Result<PluginSource, LoadError>> {
            debug!(dir = %dir.display(), "Dynamic plugin loading is not compiled in");
            Vec::new()
        }
    }
}

pub use imp::DynamicLoader;
