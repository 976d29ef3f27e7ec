//! Market catalogue: units that can be installed by name.

use std::collections::BTreeMap;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::info;

use super::metadata::MetadataParser;
use super::PluginSource;
use crate::error::LoadError;

/// Summary of an installable unit.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogueEntry {
    /// Plugin name.
    pub name: String,
    /// Display name.
    pub display_name: String,
    /// Version.
    pub version: String,
    /// Description.
    pub description: String,
    /// Author.
    pub author: String,
    /// Category.
    pub category: String,
    /// Source location.
    pub location: String,
}

/// Installable units keyed by plugin name.
#[derive(Debug, Default)]
pub struct ScriptCatalogue {
    units: RwLock<BTreeMap<String, (CatalogueEntry, PluginSource)>>,
}

impl ScriptCatalogue {
    /// Creates an empty catalogue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a unit. Returns its plugin name.
    pub async fn add(&self, source: PluginSource) -> Result<String, LoadError> {
        let meta = MetadataParser::new().parse(&source.location, &source.text)?;
        let entry = CatalogueEntry {
            name: meta.name.clone(),
            display_name: meta.display_name,
            version: meta.version,
            description: meta.description,
            author: meta.author,
            category: meta.category,
            location: source.location.clone(),
        };
        info!(plugin = %meta.name, version = %entry.version, "Catalogue unit added");
        self.units
            .write()
            .await
            .insert(meta.name.clone(), (entry, source));
        Ok(meta.name)
    }

    /// Returns the unit for `name`.
    pub async fn get(&self, name: &str) -> Option<PluginSource> {
        self.units.read().await.get(name).map(|(_, s)| s.clone())
    }

    /// Lists every unit, ordered by name.
    pub async fn list(&self) -> Vec<CatalogueEntry> {
        self.units
            .read()
            .await
            .values()
            .map(|(entry, _)| entry.clone())
            .collect()
    }

    /// Number of units.
    pub async fn len(&self) -> usize {
        self.units.read().await.len()
    }

    /// Whether the catalogue is empty.
    pub async fn is_empty(&self) -> bool {
        self.units.read().await.is_empty()
    }
}
