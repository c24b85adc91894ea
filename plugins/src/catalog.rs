//! # Catalogs
//!
//! Plugins and patterns are data. Built-in copies are compiled into the
//! binary; a catalog directory given at startup replaces both.

use std::path::{Path, PathBuf};

use rekon_common::config::{Profile, ScanModule};
use serde::Deserialize;
use thiserror::Error;

use crate::patterns::PatternCatalog;
use crate::plugin::{Category, PluginMeta};
use crate::registry::PluginRegistry;

pub const PLUGINS_FILE: &str = "plugins.toml";
pub const PATTERNS_FILE: &str = "patterns.toml";

const BUILTIN_PLUGINS: &str = include_str!("../catalog/plugins.toml");
const BUILTIN_PATTERNS: &str = include_str!("../catalog/patterns.toml");

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid catalog {name}: {source}")]
    Parse {
        name: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("plugin '{0}' is declared more than once")]
    DuplicatePlugin(String),
    #[error("no {module} plugin matches '{filter}'")]
    UnknownPlugin { module: ScanModule, filter: String },
}

/// One `[[plugin]]` entry of `plugins.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginDef {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub categories: Vec<Category>,
    pub modules: Vec<ScanModule>,
    #[serde(default)]
    pub profiles: Vec<Profile>,
    #[serde(default)]
    pub service_matches: Vec<String>,
    #[serde(default)]
    pub run_once: bool,
    #[serde(default)]
    pub tls: bool,
    #[serde(default)]
    pub recon_extra: bool,
    /// Shell command template, see [`crate::command::render`].
    pub command: String,
}

impl PluginDef {
    pub fn meta(&self) -> PluginMeta {
        PluginMeta {
            name: self.name.clone(),
            description: self.description.clone(),
            categories: self.categories.clone(),
            modules: self.modules.clone(),
            profiles: self.profiles.clone(),
            service_matches: self.service_matches.clone(),
            run_once: self.run_once,
            tls: self.tls,
            recon_extra: self.recon_extra,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PluginCatalog {
    #[serde(default, rename = "plugin")]
    pub plugins: Vec<PluginDef>,
}

impl PluginCatalog {
    pub fn parse(name: &str, text: &str) -> Result<Self, CatalogError> {
        toml::from_str(text).map_err(|source| CatalogError::Parse {
            name: name.to_string(),
            source,
        })
    }

    pub fn builtin() -> Result<Self, CatalogError> {
        Self::parse("built-in plugins", BUILTIN_PLUGINS)
    }
}

/// Both catalogs of one run.
#[derive(Debug)]
pub struct Catalogs {
    pub plugins: PluginRegistry,
    pub patterns: PatternCatalog,
}

/// Loads the catalogs from `dir`, or the built-in ones when `dir` is `None`.
///
/// A directory missing either file is an error; there is no mixing of
/// built-in and on-disk catalogs.
pub fn load(dir: Option<&Path>) -> Result<Catalogs, CatalogError> {
    let (plugins, patterns) = match dir {
        Some(dir) => {
            let plugins_path = dir.join(PLUGINS_FILE);
            let patterns_path = dir.join(PATTERNS_FILE);
            (
                PluginCatalog::parse(
                    &plugins_path.display().to_string(),
                    &read(&plugins_path)?,
                )?,
                PatternCatalog::parse(
                    &patterns_path.display().to_string(),
                    &read(&patterns_path)?,
                )?,
            )
        }
        None => (
            PluginCatalog::builtin()?,
            PatternCatalog::parse("built-in patterns", BUILTIN_PATTERNS)?,
        ),
    };

    Ok(Catalogs {
        plugins: PluginRegistry::from_catalog(plugins)?,
        patterns,
    })
}

fn read(path: &Path) -> Result<String, CatalogError> {
    std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
        path: path.to_path_buf(),
        source,
    })
}
