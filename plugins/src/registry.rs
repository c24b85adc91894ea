use std::collections::BTreeMap;
use std::sync::Arc;

use regex::{Regex, RegexSet};
use rekon_common::config::ScanModule;
use tracing::warn;

use crate::catalog::{CatalogError, PluginCatalog};
use crate::command::CommandPlugin;
use crate::plugin::{Category, Plugin, PluginMeta};

/// A plugin plus its compiled service matcher.
pub struct RegisteredPlugin {
    plugin: Arc<dyn Plugin>,
    service_matcher: Option<RegexSet>,
}

impl RegisteredPlugin {
    fn new(plugin: Arc<dyn Plugin>) -> Self {
        let meta = plugin.describe();

        // Broken expressions are dropped so one typo doesn't disable the plugin.
        let valid: Vec<&str> = meta
            .service_matches
            .iter()
            .filter(|pattern| match Regex::new(pattern) {
                Ok(_) => true,
                Err(e) => {
                    warn!("Ignoring service match '{pattern}' of {}: {e}", meta.name);
                    false
                }
            })
            .map(String::as_str)
            .collect();

        let service_matcher = if valid.is_empty() {
            None
        } else {
            RegexSet::new(valid).ok()
        };

        Self {
            plugin,
            service_matcher,
        }
    }

    pub fn meta(&self) -> &PluginMeta {
        self.plugin.describe()
    }

    pub fn plugin(&self) -> &Arc<dyn Plugin> {
        &self.plugin
    }

    /// Plugins without service matches never match by name.
    pub fn matches_service(&self, service: &str) -> bool {
        self.service_matcher
            .as_ref()
            .is_some_and(|set| set.is_match(service))
    }
}

impl std::fmt::Debug for RegisteredPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredPlugin")
            .field("name", &self.meta().name)
            .field("categories", &self.meta().categories)
            .finish()
    }
}

/// Every plugin known to a run, keyed and ordered by name.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    plugins: BTreeMap<String, Arc<RegisteredPlugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_catalog(catalog: PluginCatalog) -> Result<Self, CatalogError> {
        let mut registry = Self::new();
        for def in catalog.plugins {
            registry.register(Arc::new(CommandPlugin::from_def(def)))?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, plugin: Arc<dyn Plugin>) -> Result<(), CatalogError> {
        let name = plugin.describe().name.clone();
        if self.plugins.contains_key(&name) {
            return Err(CatalogError::DuplicatePlugin(name));
        }
        self.plugins
            .insert(name, Arc::new(RegisteredPlugin::new(plugin)));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<RegisteredPlugin>> {
        self.plugins.values()
    }

    pub fn for_module(&self, module: ScanModule) -> impl Iterator<Item = &Arc<RegisteredPlugin>> {
        self.iter().filter(move |p| p.meta().supports(module))
    }

    pub fn with_category(
        &self,
        module: ScanModule,
        category: Category,
    ) -> Vec<Arc<RegisteredPlugin>> {
        self.for_module(module)
            .filter(|p| p.meta().has_category(category))
            .cloned()
            .collect()
    }

    /// Plugins whose name contains `filter`, restricted to `categories`.
    pub fn matching_name(
        &self,
        module: ScanModule,
        filter: &str,
        categories: &[Category],
    ) -> Vec<Arc<RegisteredPlugin>> {
        self.for_module(module)
            .filter(|p| p.meta().name.contains(filter))
            .filter(|p| categories.iter().any(|c| p.meta().has_category(*c)))
            .cloned()
            .collect()
    }

    /// Scans-phase plugins interested in `service`.
    ///
    /// `tls` additionally selects every plugin flagged as TLS-specific.
    pub fn service_candidates(
        &self,
        module: ScanModule,
        service: &str,
        tls: bool,
    ) -> Vec<Arc<RegisteredPlugin>> {
        self.for_module(module)
            .filter(|p| p.meta().has_category(Category::Scans))
            .filter(|p| p.matches_service(service) || (tls && p.meta().tls))
            .cloned()
            .collect()
    }
}
