//! Plugin contract, plugin registry and the pattern catalog.
//!
//! Everything here is data-driven: the built-in catalogs under `catalog/`
//! describe which external tools exist, when they apply and which lines of
//! their output are worth keeping.

pub mod catalog;
pub mod command;
pub mod patterns;
pub mod plugin;
pub mod registry;

pub use catalog::{CatalogError, Catalogs};
pub use patterns::{PatternCatalog, PatternSet};
pub use plugin::{Category, Invocation, Plugin, PluginMeta, ServiceContext};
pub use registry::{PluginRegistry, RegisteredPlugin};
