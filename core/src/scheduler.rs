//! # Dynamic Task Scheduler
//!
//! Owns the fan-out loop of one target:
//!
//! 1. **Seeded**: one task per seed plugin (port scanners for `netscan`,
//!    discover/revlookup plugins for `osint`).
//! 2. **Running**: wait for whichever task finishes first, diff its findings
//!    against [`ScanState`] and enqueue follow-up tasks for everything new.
//! 3. **Drained**: the pending set is empty after a completion round.
//!
//! Failed, cancelled and panicking tasks are logged and counted; they never
//! end the loop. Once shutdown is triggered no follow-up is enqueued, queued
//! tasks give up their slot wait and running ones are terminated by their
//! runner.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use rekon_common::config::ScanModule;
use rekon_common::finding::{Finding, ServiceTriple};
use rekon_common::network::target::Target;
use rekon_common::success;
use rekon_common::tag::Tag;
use rekon_common::utils::timing::format_elapsed;
use rekon_plugins::{CatalogError, Category, RegisteredPlugin, ServiceContext};
use tokio::task::{JoinError, JoinSet};
use tokio::time::timeout;
use tracing::{debug, error, warn};

use crate::context::TargetContext;
use crate::service;
use crate::shutdown::ShutdownListener;
use crate::state::{DiscoveryKind, ScanState};
use crate::task::{Task, TaskReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    Seeded,
    Running,
    Drained,
}

impl fmt::Display for SchedulerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SchedulerPhase::Seeded => "seeded",
            SchedulerPhase::Running => "running",
            SchedulerPhase::Drained => "drained",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub seeded: usize,
    /// Tasks whose command ran to the end, whatever its exit code.
    pub completed: usize,
    pub followups: usize,
    /// Non-zero exits, command build errors and panics.
    pub failed: usize,
    pub cancelled: usize,
}

/// What is left of a target once its loop has exited.
#[derive(Debug, Clone)]
pub struct ScanSummary {
    pub target: String,
    pub phase: SchedulerPhase,
    pub stats: SchedulerStats,
    pub services: Vec<ServiceTriple>,
    pub names: BTreeMap<IpAddr, BTreeSet<String>>,
    pub cancelled: bool,
}

pub struct Scheduler {
    ctx: Arc<TargetContext>,
    state: ScanState,
    pending: JoinSet<TaskReport>,
    phase: SchedulerPhase,
    stats: SchedulerStats,
    shutdown: ShutdownListener,
    cancelled: bool,
}

impl Scheduler {
    pub fn new(ctx: Arc<TargetContext>) -> Self {
        let shutdown = ctx.run.shutdown.listener();
        Self {
            ctx,
            state: ScanState::new(),
            pending: JoinSet::new(),
            phase: SchedulerPhase::Seeded,
            stats: SchedulerStats::default(),
            shutdown,
            cancelled: false,
        }
    }

    pub fn phase(&self) -> SchedulerPhase {
        self.phase
    }

    pub fn state(&self) -> &ScanState {
        &self.state
    }

    /// Runs the loop until every task, seeds and follow-ups alike, is done.
    ///
    /// Fails only when the seed set cannot be built.
    pub async fn run(mut self) -> Result<ScanSummary, CatalogError> {
        for task in self.seed_tasks()? {
            self.spawn(task);
            self.stats.seeded += 1;
        }
        debug!("{}: seeded {} tasks", self.ctx.target, self.stats.seeded);
        self.phase = SchedulerPhase::Running;

        while !self.pending.is_empty() {
            let joined = tokio::select! {
                biased;
                _ = self.shutdown.triggered(), if !self.cancelled => {
                    self.cancel().await;
                    continue;
                }
                joined = self.pending.join_next() => joined,
            };

            let Some(joined) = joined else {
                break;
            };
            self.complete(joined);

            // Siblings that finished in the same round.
            while let Some(joined) = self.pending.try_join_next() {
                self.complete(joined);
            }
        }

        self.phase = SchedulerPhase::Drained;
        Ok(self.summary())
    }

    /// The initial task set.
    pub fn seed_tasks(&self) -> Result<Vec<Task>, CatalogError> {
        let run = &self.ctx.run;
        let config = &run.config;
        let module = run.module;
        let target = self.ctx.target.to_string();

        let categories: &[Category] = match (module, &self.ctx.target) {
            (ScanModule::Netscan, _) => &[Category::Portscan],
            (ScanModule::Osint, Target::Domain(_)) => &[Category::Discover],
            (ScanModule::Osint, Target::Ip(_)) => &[Category::Revlookup],
        };

        let mut plugins = match &config.plugin_filter {
            Some(filter) => run.plugins.matching_name(module, filter, categories),
            None => categories
                .iter()
                .flat_map(|category| run.plugins.with_category(module, *category))
                .filter(|p| module != ScanModule::Netscan || p.meta().in_profile(config.profile))
                .collect(),
        };

        if module == ScanModule::Osint && config.only_recon && self.ctx.target.is_domain() {
            let filter = config.plugin_filter.as_deref().unwrap_or_default();
            plugins.extend(
                run.plugins
                    .for_module(module)
                    .filter(|p| p.meta().recon_extra && p.meta().name.contains(filter))
                    .cloned(),
            );
        }

        if plugins.is_empty()
            && let Some(filter) = &config.plugin_filter
        {
            return Err(CatalogError::UnknownPlugin {
                module,
                filter: filter.clone(),
            });
        }

        let mut seen = BTreeSet::new();
        let tasks = plugins
            .iter()
            .filter(|p| seen.insert(p.meta().name.clone()))
            .filter_map(|p| {
                let tag = Tag::new(p.meta().phase().as_str(), &p.meta().name).with(&target);
                self.dispatch(p, &target, &target, tag, None)
            })
            .collect();

        Ok(tasks)
    }

    fn spawn(&mut self, task: Task) {
        let ctx = Arc::clone(&self.ctx);
        self.pending.spawn(task.execute(ctx));
    }

    /// Builds a task if the run-once policy of `plugin` still allows it.
    fn dispatch(
        &self,
        plugin: &Arc<RegisteredPlugin>,
        target: &str,
        context: &str,
        tag: Tag,
        service: Option<ServiceContext>,
    ) -> Option<Task> {
        let meta = plugin.meta();
        if !self.state.run_once().allow_dispatch(meta, target, context) {
            debug!("Skipping {} for {context}: already dispatched", meta.name);
            return None;
        }

        Some(Task {
            tag,
            target: target.to_string(),
            patterns: self
                .ctx
                .run
                .patterns
                .pattern_set(meta.phase().as_str(), &meta.name),
            plugin: Arc::clone(plugin),
            service,
        })
    }

    fn complete(&mut self, joined: Result<TaskReport, JoinError>) {
        let report = match joined {
            Ok(report) => report,
            Err(e) if e.is_cancelled() => {
                self.stats.cancelled += 1;
                return;
            }
            Err(e) => {
                self.stats.failed += 1;
                error!("A task for {} crashed: {e}", self.ctx.target);
                return;
            }
        };

        match &report.result {
            Ok(_) => {}
            Err(e) if e.is_cancelled() => {
                self.stats.cancelled += 1;
                return;
            }
            Err(e) => {
                self.stats.failed += 1;
                error!("{}: {e}", report.tag);
                self.ctx.audit.error(&report.tag, e);
                return;
            }
        }

        self.stats.completed += 1;
        debug!("{} finished in {}", report.tag, format_elapsed(report.duration()));
        if let Some(code) = report.exit_code().filter(|code| *code != 0) {
            self.stats.failed += 1;
            warn!("{} exited with code {code}", report.tag);
            return;
        }

        if self.cancelled || self.shutdown.is_triggered() {
            return;
        }

        let followups = match report.phase {
            Category::Portscan => self.service_followups(&report),
            phase if phase.is_discovery() => self.discovery_followups(&report),
            _ => Vec::new(),
        };

        for task in followups {
            debug!("{} -> {}", report.tag, task.tag);
            self.spawn(task);
            self.stats.followups += 1;
        }
    }

    fn service_followups(&mut self, report: &TaskReport) -> Vec<Task> {
        let plugins = Arc::clone(&self.ctx.run.plugins);
        let module = self.ctx.run.module;
        let target = report.target.clone();
        let mut tasks = Vec::new();

        for finding in report.findings() {
            let Finding::PortService(record) = finding else {
                continue;
            };

            let triple = record.triple();
            if !self.state.record_service(triple.clone()) {
                continue;
            }

            match record.extra() {
                Some(extra) => success!("{target}: discovered {triple} ({extra})"),
                None => success!("{target}: discovered {triple}"),
            }
            self.ctx.audit.info(&report.tag, format!("discovered {triple}"));

            if self.ctx.run.config.only_recon {
                continue;
            }

            let view = service::classify(&record.service, record.port);
            let context = ServiceContext {
                protocol: record.protocol,
                port: record.port,
                service: view.name.clone(),
            };
            let label = context.to_string();

            for plugin in plugins.service_candidates(module, &view.name, view.tls) {
                let tag = Tag::new(plugin.meta().phase().as_str(), &plugin.meta().name)
                    .with(&label)
                    .with(&target);
                if let Some(task) =
                    self.dispatch(&plugin, &target, &label, tag, Some(context.clone()))
                {
                    tasks.push(task);
                }
            }
        }

        tasks
    }

    fn discovery_followups(&mut self, report: &TaskReport) -> Vec<Task> {
        let plugins = Arc::clone(&self.ctx.run.plugins);
        let module = self.ctx.run.module;
        let queried = self.ctx.target.to_string();
        let mut tasks = Vec::new();

        for finding in report.findings() {
            let Finding::DomainToIp { domain, ip } = finding else {
                continue;
            };

            let Some(kind) = self.state.record_name(*ip, domain, &queried) else {
                continue;
            };
            success!("{queried}: {domain} => {ip} [{}]", kind.as_str());
            self.ctx
                .audit
                .info(&report.tag, format!("{} {domain} => {ip}", kind.as_str()));

            if self.ctx.run.config.only_recon {
                continue;
            }

            let mut branch = |category: Category, value: &str| {
                for plugin in plugins.with_category(module, category) {
                    let tag = Tag::new(category.as_str(), &plugin.meta().name).with(value);
                    if let Some(task) = self.dispatch(&plugin, value, value, tag, None) {
                        tasks.push(task);
                    }
                }
            };

            if kind.scans_ip() {
                branch(Category::Ipnet, &ip.to_string());
            }
            branch(Category::Subdomain, domain);

            if kind == DiscoveryKind::SubdomainRecon {
                debug!("{domain} shares {ip} with a known name");
            }
        }

        tasks
    }

    /// Stops fan-out, wakes queued tasks and waits for running ones to be
    /// terminated by their runners. Anything still alive after the grace
    /// period is aborted.
    async fn cancel(&mut self) {
        self.cancelled = true;
        self.ctx.runner.governor().close();
        warn!(
            "{}: shutting down, {} task(s) pending",
            self.ctx.target,
            self.pending.len()
        );

        let deadline = self.ctx.run.config.grace_period + Duration::from_secs(1);
        let drained = timeout(deadline, async {
            while let Some(joined) = self.pending.join_next().await {
                self.complete(joined);
            }
        })
        .await;

        if drained.is_err() {
            warn!("{}: aborting tasks that outlived the grace period", self.ctx.target);
            self.pending.shutdown().await;
        }
    }

    fn summary(&self) -> ScanSummary {
        let mut services: Vec<ServiceTriple> = self.state.services().iter().cloned().collect();
        services.sort();

        ScanSummary {
            target: self.ctx.target.to_string(),
            phase: self.phase,
            stats: self.stats,
            services,
            names: self
                .state
                .ip_to_names()
                .iter()
                .map(|(ip, names)| (*ip, names.clone()))
                .collect(),
            cancelled: self.cancelled,
        }
    }
}
