//! # Plugin Contract
//!
//! A plugin is a fixed capability: it describes itself once with a
//! [`PluginMeta`] and, given an [`Invocation`], produces the shell command
//! to run. Pattern sets are looked up by tag in the pattern catalog; the
//! scheduler never inspects a plugin beyond this trait.

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use rekon_common::config::{Profile, ScanModule};
use rekon_common::finding::Protocol;
use rekon_common::tag::Tag;
use serde::{Deserialize, Serialize};

/// Capability labels. The first category of a plugin is the phase of its tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Enumerates names of a domain (osint seed).
    Discover,
    /// Looks up names for an address (osint seed).
    Revlookup,
    /// Finds open ports (netscan seed).
    Portscan,
    /// Enumerates one discovered service.
    Scans,
    /// Runs against one discovered subdomain.
    Subdomain,
    /// Runs against one discovered address.
    Ipnet,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Discover => "discover",
            Category::Revlookup => "revlookup",
            Category::Portscan => "portscan",
            Category::Scans => "scans",
            Category::Subdomain => "subdomain",
            Category::Ipnet => "ipnet",
        }
    }

    /// Whether results of this phase carry discovered names.
    pub fn is_discovery(&self) -> bool {
        matches!(self, Category::Discover | Category::Revlookup)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginMeta {
    pub name: String,
    pub description: String,
    pub categories: Vec<Category>,
    pub modules: Vec<ScanModule>,
    /// Port scan profiles this plugin seeds. Empty for everything but port scanners.
    pub profiles: Vec<Profile>,
    /// Regexes OR'd together against the service name.
    pub service_matches: Vec<String>,
    /// At most one dispatch per target, whatever the context.
    pub run_once: bool,
    /// Also runs on every TLS-wrapped service.
    pub tls: bool,
    /// Joins the osint seed set when only recon was requested.
    pub recon_extra: bool,
}

impl PluginMeta {
    /// The phase label used as the first tag label.
    pub fn phase(&self) -> Category {
        self.categories.first().copied().unwrap_or(Category::Scans)
    }

    pub fn has_category(&self, category: Category) -> bool {
        self.categories.contains(&category)
    }

    pub fn supports(&self, module: ScanModule) -> bool {
        self.modules.contains(&module)
    }

    pub fn in_profile(&self, profile: Profile) -> bool {
        self.profiles.contains(&profile)
    }
}

/// The service a scans-phase invocation is aimed at.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceContext {
    pub protocol: Protocol,
    pub port: u16,
    /// Service name after TLS unwrapping, e.g. `https` for `ssl/http`.
    pub service: String,
}

impl fmt::Display for ServiceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.protocol, self.port, self.service)
    }
}

/// Everything a plugin may use to build one command.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub target: String,
    /// The target's base directory. Results go below `scans/`.
    pub output_dir: PathBuf,
    pub tag: Tag,
    pub module: ScanModule,
    pub service: Option<ServiceContext>,
}

#[async_trait]
pub trait Plugin: Send + Sync {
    fn describe(&self) -> &PluginMeta;

    /// Builds the shell command for one invocation.
    ///
    /// Implementations may prepare files below the output directory first.
    async fn command(&self, invocation: &Invocation) -> anyhow::Result<String>;
}

impl fmt::Debug for dyn Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("name", &self.describe().name)
            .finish()
    }
}
