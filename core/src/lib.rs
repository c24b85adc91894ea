//! Scheduling core of rekon.
//!
//! A run is an [`engine::Engine`] over a list of targets. Each target gets a
//! [`scheduler::Scheduler`] that seeds plugin tasks, runs them through the
//! [`runner::ProcessRunner`] and fans out on whatever the
//! [`matcher::PatternMatcher`] finds in their output.

pub mod audit;
pub mod context;
pub mod engine;
pub mod governor;
pub mod matcher;
pub mod registry;
pub mod resolver;
pub mod runner;
pub mod scheduler;
pub mod service;
pub mod shutdown;
pub mod state;
pub mod task;

pub use context::{RunContext, TargetContext};
pub use engine::{Engine, TargetSummary};
pub use scheduler::{ScanSummary, Scheduler, SchedulerPhase, SchedulerStats};
pub use shutdown::Shutdown;
