//! One scheduled plugin invocation and its result.

use std::sync::Arc;
use std::time::Duration;

use rekon_common::finding::Finding;
use rekon_common::tag::Tag;
use rekon_plugins::{Category, Invocation, PatternSet, RegisteredPlugin, ServiceContext};
use thiserror::Error;
use tracing::debug;

use crate::context::TargetContext;
use crate::matcher::PatternMatcher;
use crate::runner::{RunOutcome, RunnerError};

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("failed to build command: {0}")]
    Command(String),

    #[error(transparent)]
    Runner(#[from] RunnerError),
}

impl TaskError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskError::Runner(RunnerError::Cancelled))
    }
}

/// Immutable once built. The scheduler hands it to [`Task::execute`] and
/// never looks at it again.
#[derive(Debug, Clone)]
pub struct Task {
    pub tag: Tag,
    /// What the command runs against: the scanned host, or a discovered
    /// name or address.
    pub target: String,
    pub plugin: Arc<RegisteredPlugin>,
    pub patterns: Arc<PatternSet>,
    pub service: Option<ServiceContext>,
}

#[derive(Debug)]
pub struct TaskReport {
    pub tag: Tag,
    pub phase: Category,
    pub plugin: String,
    pub target: String,
    pub result: Result<RunOutcome, TaskError>,
}

impl TaskReport {
    pub fn exit_code(&self) -> Option<i32> {
        self.result.as_ref().ok().map(|outcome| outcome.exit_code)
    }

    pub fn duration(&self) -> Duration {
        self.result
            .as_ref()
            .map(|outcome| outcome.duration)
            .unwrap_or_default()
    }

    pub fn findings(&self) -> &[Finding] {
        self.result
            .as_ref()
            .map(|outcome| outcome.findings.as_slice())
            .unwrap_or_default()
    }
}

impl Task {
    pub async fn execute(self, ctx: Arc<TargetContext>) -> TaskReport {
        let meta = self.plugin.meta();
        let phase = meta.phase();
        let plugin = meta.name.clone();

        let result = self.run(&ctx).await;
        if let Err(e) = &result {
            debug!("{} ended early: {e}", self.tag);
        }

        TaskReport {
            tag: self.tag,
            phase,
            plugin,
            target: self.target,
            result,
        }
    }

    async fn run(&self, ctx: &TargetContext) -> Result<RunOutcome, TaskError> {
        let invocation = Invocation {
            target: self.target.clone(),
            output_dir: ctx.layout.base.clone(),
            tag: self.tag.clone(),
            module: ctx.run.module,
            service: self.service.clone(),
        };

        let command = self
            .plugin
            .plugin()
            .command(&invocation)
            .await
            .map_err(|e| TaskError::Command(format!("{e:#}")))?;

        let matcher = PatternMatcher::new(
            Arc::clone(&self.patterns),
            self.tag.clone(),
            Arc::clone(&ctx.audit),
            Arc::clone(&ctx.run.resolver),
        )
        .with_base_domain(ctx.base_domain.clone());

        Ok(ctx.runner.run(&command, &self.tag, matcher).await?)
    }
}
