//! # Pattern Catalog
//!
//! Maps `(phase, plugin)` to an ordered list of regexes. Lookups that miss
//! fall back to the catalog-wide `global` set.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use regex::Regex;
use serde::Deserialize;
use tracing::warn;

use crate::catalog::CatalogError;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatternDef {
    pub pattern: String,
    /// Human template such as `cve: {match}`.
    pub description: String,
}

impl PatternDef {
    /// The part of the description before the first `:`.
    pub fn label(&self) -> &str {
        self.description
            .split(':')
            .next()
            .unwrap_or_default()
            .trim()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PatternFile {
    #[serde(default)]
    global: Vec<PatternDef>,
    #[serde(default)]
    phases: BTreeMap<String, BTreeMap<String, Vec<PatternDef>>>,
}

#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub label: String,
    pub regex: Regex,
}

impl CompiledPattern {
    pub fn has_group(&self, name: &str) -> bool {
        self.regex.capture_names().flatten().any(|n| n == name)
    }
}

/// Ordered, compiled patterns for one plugin.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<CompiledPattern>,
}

impl PatternSet {
    /// Compiles `defs` in order. Expressions that fail to compile are skipped.
    pub fn compile(defs: &[PatternDef]) -> Self {
        let patterns = defs
            .iter()
            .filter_map(|def| match Regex::new(&def.pattern) {
                Ok(regex) => Some(CompiledPattern {
                    label: def.label().to_string(),
                    regex,
                }),
                Err(e) => {
                    warn!("Skipping pattern '{}': {e}", def.pattern);
                    None
                }
            })
            .collect();

        Self { patterns }
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &CompiledPattern)> {
        self.patterns.iter().enumerate()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct PatternCatalog {
    sets: HashMap<(String, String), Arc<PatternSet>>,
    global: Arc<PatternSet>,
}

impl PatternCatalog {
    pub fn parse(name: &str, text: &str) -> Result<Self, CatalogError> {
        let file: PatternFile = toml::from_str(text).map_err(|source| CatalogError::Parse {
            name: name.to_string(),
            source,
        })?;

        let sets = file
            .phases
            .into_iter()
            .flat_map(|(phase, plugins)| {
                plugins.into_iter().map(move |(plugin, defs)| {
                    ((phase.clone(), plugin), Arc::new(PatternSet::compile(&defs)))
                })
            })
            .collect();

        Ok(Self {
            sets,
            global: Arc::new(PatternSet::compile(&file.global)),
        })
    }

    /// Patterns for `plugin` in `phase`.
    ///
    /// Falls back to the same plugin under any other phase, then to the
    /// global set.
    pub fn pattern_set(&self, phase: &str, plugin: &str) -> Arc<PatternSet> {
        if let Some(set) = self.sets.get(&(phase.to_string(), plugin.to_string())) {
            return Arc::clone(set);
        }

        self.sets
            .iter()
            .find(|((_, name), _)| name == plugin)
            .map(|(_, set)| Arc::clone(set))
            .unwrap_or_else(|| Arc::clone(&self.global))
    }
}
