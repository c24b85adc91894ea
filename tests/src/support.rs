use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rekon_common::config::{Config, ScanModule};
use rekon_common::network::target::Target;
use rekon_core::resolver::Resolver;
use rekon_core::{RunContext, ScanSummary, Scheduler, TargetContext};
use rekon_plugins::catalog::PluginCatalog;
use rekon_plugins::{Catalogs, PatternCatalog, PluginRegistry};
use tempfile::TempDir;

/// A run context over inline catalogs, writing below a temporary directory.
pub struct Harness {
    dir: TempDir,
    pub run: RunContext,
}

impl Harness {
    pub fn new(module: ScanModule, plugins: &str, patterns: &str) -> Self {
        Self::with_config(module, plugins, patterns, Config::default())
    }

    pub fn with_config(module: ScanModule, plugins: &str, patterns: &str, config: Config) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let catalogs = Catalogs {
            plugins: PluginRegistry::from_catalog(
                PluginCatalog::parse("test plugins", plugins).expect("invalid plugin catalog"),
            )
            .expect("invalid plugin registry"),
            patterns: PatternCatalog::parse("test patterns", patterns)
                .expect("invalid pattern catalog"),
        };
        let config = Config {
            output_dir: dir.path().to_path_buf(),
            grace_period: Duration::from_secs(1),
            ..config
        };

        Self {
            run: RunContext::new(module, config, catalogs),
            dir,
        }
    }

    pub fn with_resolver(mut self, resolver: impl Resolver + 'static) -> Self {
        self.run = self.run.with_resolver(Arc::new(resolver));
        self
    }

    pub fn context(&self, target: &str) -> Arc<TargetContext> {
        let target: Target = target
            .parse::<rekon_common::network::target::TargetSpec>()
            .expect("invalid target")
            .expand()
            .remove(0);
        Arc::new(TargetContext::prepare(&self.run, target).expect("failed to prepare target"))
    }

    pub async fn scan(&self, target: &str) -> ScanSummary {
        Scheduler::new(self.context(target))
            .run()
            .await
            .expect("seeding failed")
    }

    pub fn logs(&self, target_dir: &str) -> PathBuf {
        self.dir.path().join(target_dir).join("logs")
    }

    /// Lines of one audit log, empty if it was never written.
    pub fn log_lines(&self, target_dir: &str, file: &str) -> Vec<String> {
        std::fs::read_to_string(self.logs(target_dir).join(file))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Commands logged for `plugin`, in order.
    pub fn commands_of(&self, target_dir: &str, plugin: &str) -> Vec<String> {
        let needle = format!(":{plugin}:");
        self.log_lines(target_dir, rekon_core::audit::COMMANDS_LOG)
            .into_iter()
            .filter(|line| line.contains(&needle))
            .collect()
    }
}
