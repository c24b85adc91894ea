//! Explicit run and target contexts.
//!
//! A [`RunContext`] is built once per run and shared by every target. A
//! [`TargetContext`] is built per target and owns everything that must not
//! leak between scan trees: the audit log, the scan slots, the output layout.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use rekon_common::config::{Config, ScanModule};
use rekon_common::network::target::Target;
use rekon_plugins::{Catalogs, PatternCatalog, PluginRegistry};

use crate::audit::AuditLog;
use crate::governor::Governor;
use crate::resolver::{Resolver, SystemResolver};
use crate::runner::{ProcessRunner, ProcessTracker};
use crate::shutdown::Shutdown;

#[derive(Clone)]
pub struct RunContext {
    pub module: ScanModule,
    pub config: Arc<Config>,
    pub plugins: Arc<PluginRegistry>,
    pub patterns: Arc<PatternCatalog>,
    pub resolver: Arc<dyn Resolver>,
    pub tracker: Arc<ProcessTracker>,
    pub shutdown: Shutdown,
}

impl RunContext {
    pub fn new(module: ScanModule, config: Config, catalogs: Catalogs) -> Self {
        Self {
            module,
            config: Arc::new(config),
            plugins: Arc::new(catalogs.plugins),
            patterns: Arc::new(catalogs.patterns),
            resolver: Arc::new(SystemResolver),
            tracker: Arc::new(ProcessTracker::new()),
            shutdown: Shutdown::new(),
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = resolver;
        self
    }
}

/// Directories of one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetLayout {
    pub base: PathBuf,
    pub scans: PathBuf,
    pub logs: PathBuf,
}

impl TargetLayout {
    /// Osint domains are grouped under their base domain.
    pub fn new(output_dir: &Path, module: ScanModule, target: &Target) -> Self {
        let name = match (module, target.base_domain()) {
            (ScanModule::Osint, Some(base)) => base,
            _ => target.to_string(),
        };

        let base = output_dir.join(name);
        Self {
            scans: base.join("scans"),
            logs: base.join("logs"),
            base,
        }
    }

    pub fn module_dirs(&self, module: ScanModule) -> Vec<PathBuf> {
        let subdirs: &[&str] = match module {
            ScanModule::Netscan => &["xml", "gnmap"],
            ScanModule::Osint => &["recon", "info", "tech"],
        };
        subdirs.iter().map(|dir| self.scans.join(dir)).collect()
    }

    pub fn create(&self, module: ScanModule, only_scans_dir: bool) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.scans)?;
        std::fs::create_dir_all(&self.logs)?;

        if !only_scans_dir {
            for dir in self.module_dirs(module) {
                std::fs::create_dir_all(dir)?;
            }
        }
        Ok(())
    }
}

pub struct TargetContext {
    pub run: RunContext,
    pub target: Target,
    pub layout: TargetLayout,
    pub audit: Arc<AuditLog>,
    pub runner: ProcessRunner,
    /// Scope for discovered names. `None` for IP targets.
    pub base_domain: Option<String>,
}

impl TargetContext {
    pub fn prepare(run: &RunContext, target: Target) -> anyhow::Result<Self> {
        let config = &run.config;
        let layout = TargetLayout::new(&config.output_dir, run.module, &target);
        layout
            .create(run.module, config.only_scans_dir)
            .with_context(|| format!("failed to create {}", layout.base.display()))?;

        let audit = Arc::new(
            AuditLog::open(&layout.logs)
                .with_context(|| format!("failed to open logs in {}", layout.logs.display()))?,
        );
        let governor = Governor::new(config.concurrent_scans)?;
        let runner = ProcessRunner::new(
            governor,
            Arc::clone(&run.tracker),
            Arc::clone(&audit),
            run.shutdown.clone(),
            config.grace_period,
        );

        Ok(Self {
            run: run.clone(),
            base_domain: target.base_domain(),
            target,
            layout,
            audit,
            runner,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn osint_domains_share_the_base_domain_directory() {
        let out = Path::new("/tmp/out");
        let target = Target::Domain("www.example.com".into());

        let osint = TargetLayout::new(out, ScanModule::Osint, &target);
        assert_eq!(osint.base, out.join("example.com"));

        let netscan = TargetLayout::new(out, ScanModule::Netscan, &target);
        assert_eq!(netscan.base, out.join("www.example.com"));
        assert_eq!(netscan.logs, out.join("www.example.com/logs"));
    }

    #[test]
    fn creates_module_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        let target = Target::Ip("10.0.0.5".parse().unwrap());

        let layout = TargetLayout::new(dir.path(), ScanModule::Netscan, &target);
        layout.create(ScanModule::Netscan, false).unwrap();
        assert!(layout.scans.join("xml").is_dir());
        assert!(layout.scans.join("gnmap").is_dir());

        let ip = Target::Ip("10.0.0.6".parse().unwrap());
        let bare = TargetLayout::new(dir.path(), ScanModule::Osint, &ip);
        bare.create(ScanModule::Osint, true).unwrap();
        assert!(bare.logs.is_dir());
        assert!(!bare.scans.join("recon").exists());
    }
}
