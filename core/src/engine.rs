//! Multi-target driver.
//!
//! Targets are spread over a `rayon` pool sized by `concurrent_targets`.
//! Every worker builds its own single-threaded `tokio` runtime and runs one
//! target's [`Scheduler`] to completion on it, so scan trees never share
//! state and a panic in one of them stays there.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, anyhow};
use rayon::prelude::*;
use rekon_common::network::target::Target;
use rekon_common::success;
use rekon_common::tag::Tag;
use rekon_common::utils::timing::format_elapsed;
use tracing::{error, info};

use crate::context::{RunContext, TargetContext};
use crate::scheduler::{ScanSummary, Scheduler};

#[derive(Debug)]
pub struct TargetSummary {
    pub target: Target,
    pub elapsed: Duration,
    pub outcome: anyhow::Result<ScanSummary>,
}

impl TargetSummary {
    pub fn cancelled(&self) -> bool {
        self.outcome.as_ref().map_or(true, |summary| summary.cancelled)
    }
}

pub struct Engine {
    run: RunContext,
}

impl Engine {
    pub fn new(run: RunContext) -> Self {
        Self { run }
    }

    pub fn context(&self) -> &RunContext {
        &self.run
    }

    /// Scans every target and returns one summary per target, in input order.
    ///
    /// Only configuration problems fail the whole run; anything that goes
    /// wrong inside a target ends up in that target's summary.
    pub fn run(&self, targets: Vec<Target>) -> anyhow::Result<Vec<TargetSummary>> {
        let config = &self.run.config;
        config.validate()?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.concurrent_targets)
            .thread_name(|i| format!("rekon-target-{i}"))
            .build()
            .context("failed to build the target worker pool")?;

        info!(
            "Running {} against {} target(s), {} at a time",
            self.run.module,
            targets.len(),
            config.concurrent_targets
        );

        Ok(pool.install(|| {
            targets
                .into_par_iter()
                .map(|target| self.scan_target(target))
                .collect()
        }))
    }

    fn scan_target(&self, target: Target) -> TargetSummary {
        let started = Instant::now();

        let outcome = if self.run.shutdown.is_triggered() {
            Err(anyhow!("skipped after shutdown"))
        } else {
            panic::catch_unwind(AssertUnwindSafe(|| self.drive(target.clone())))
                .unwrap_or_else(|_| Err(anyhow!("scan loop of {target} panicked")))
        };

        let elapsed = started.elapsed();
        match &outcome {
            Ok(summary) if !summary.cancelled => {
                success!("Finished {target} in {}", format_elapsed(elapsed))
            }
            Ok(_) => info!("Stopped {target} after {}", format_elapsed(elapsed)),
            Err(e) => error!("{target}: {e:#}"),
        }

        TargetSummary {
            target,
            elapsed,
            outcome,
        }
    }

    fn drive(&self, target: Target) -> anyhow::Result<ScanSummary> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("failed to build a runtime")?;

        let ctx = TargetContext::prepare(&self.run, target)?;
        let tag = Tag::new("rekon", self.run.module.as_str()).with(ctx.target.to_string());
        ctx.audit.info(&tag, "scan started");
        info!("Scanning {} into {}", ctx.target, ctx.layout.base.display());

        let audit = Arc::clone(&ctx.audit);
        let summary = runtime.block_on(Scheduler::new(Arc::new(ctx)).run())?;

        audit.info(
            &tag,
            format!(
                "scan {}: {} completed, {} failed, {} cancelled",
                summary.phase,
                summary.stats.completed,
                summary.stats.failed,
                summary.stats.cancelled
            ),
        );
        Ok(summary)
    }
}
