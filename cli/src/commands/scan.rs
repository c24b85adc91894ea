use std::io::IsTerminal;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use colored::*;
use rekon_common::config::{Config, ConfigError, ScanModule};
use rekon_common::network::target::collect_targets;
use rekon_common::utils::timing::format_elapsed;
use rekon_core::runner::ProcessTracker;
use rekon_core::{Engine, RunContext, Shutdown, TargetSummary};
use rekon_plugins::catalog;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{debug, error, warn};

use crate::commands::ScanArgs;
use crate::terminal::input::InputHandle;
use crate::terminal::{format, print, spinner};

/// Extra time the runners get on top of the grace period before every
/// leftover process group is killed from here.
const KILL_MARGIN: Duration = Duration::from_secs(2);

pub async fn scan(module: ScanModule, args: ScanArgs, verbose: u8) -> anyhow::Result<()> {
    let (config, inputs) = args.into_config(module, verbose);
    config.validate()?;

    let targets = collect_targets(&inputs)?;
    if targets.is_empty() {
        return Err(ConfigError::NoTargets.into());
    }
    let catalogs = catalog::load(config.catalog_dir.as_deref())?;

    print::header(&format!("starting {module}"));
    print_config(module, &config, targets.len(), catalogs.plugins.len());

    let run = RunContext::new(module, config, catalogs);
    let shutdown = run.shutdown.clone();
    let tracker = Arc::clone(&run.tracker);
    let grace_period = run.config.grace_period;

    let input_enabled = !run.config.disable_input && std::io::stdin().is_terminal();
    let input = input_enabled.then(|| InputHandle::start(shutdown.clone()));
    let signals = tokio::spawn(watch_signals(shutdown.clone()));
    let reaper = tokio::spawn(reap_after_grace(
        shutdown.clone(),
        Arc::clone(&tracker),
        grace_period + KILL_MARGIN,
    ));

    let span = spinner::scan_span(module.as_str(), targets.len(), input_enabled);
    let engine = Engine::new(run);
    let started = Instant::now();
    let result = tokio::task::spawn_blocking(move || span.in_scope(|| engine.run(targets)))
        .await
        .context("scan workers stopped unexpectedly")?;

    signals.abort();
    reaper.abort();
    if let Some(input) = input {
        input.stop();
    }

    if !tracker.is_empty() {
        let killed = tracker.kill_all();
        warn!("Killed {killed} leftover process group(s)");
    }

    let summaries = result?;
    print_summaries(&summaries, started.elapsed());
    Ok(())
}

async fn watch_signals(shutdown: Shutdown) {
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            error!("Failed to install SIGTERM handler: {e}");
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }

    warn!("Interrupt received, stopping all scans");
    shutdown.trigger();
}

/// Last line of defence when runners cannot clean up in time. Groups whose
/// runner has not reacted yet get `SIGTERM` right away, survivors `SIGKILL`
/// once `deadline` has passed.
async fn reap_after_grace(shutdown: Shutdown, tracker: Arc<ProcessTracker>, deadline: Duration) {
    shutdown.listener().triggered().await;
    let terminated = tracker.terminate_all();
    if terminated > 0 {
        debug!("Sent SIGTERM to {terminated} process group(s)");
    }
    tokio::time::sleep(deadline).await;

    let killed = tracker.kill_all();
    if killed > 0 {
        warn!("Killed {killed} process group(s) that outlived the grace period");
    }
}

fn print_config(module: ScanModule, config: &Config, targets: usize, plugins: usize) {
    print::set_key_width(["Targets", "Plugins", "Output", "Profile", "Workers"]);
    print::aligned_line("Targets", targets.to_string());
    print::aligned_line("Plugins", plugins.to_string());
    print::aligned_line("Output", config.output_dir.display().to_string());
    if module == ScanModule::Netscan {
        print::aligned_line("Profile", config.profile.as_str());
    }
    print::aligned_line(
        "Workers",
        format!(
            "{} target(s) x {} command(s)",
            config.concurrent_targets, config.concurrent_scans
        ),
    );
    print::fat_separator();
}

fn print_summaries(summaries: &[TargetSummary], total: Duration) {
    print::header("scan summary");

    for (idx, summary) in summaries.iter().enumerate() {
        print::tree_head(idx, &summary.target.to_string());

        let scan = match &summary.outcome {
            Ok(scan) => scan,
            Err(e) => {
                print::as_tree_one_level(vec![("Error".into(), format!("{e:#}").red())]);
                continue;
            }
        };

        let mut lines = format::stats_to_key_value_pair(&scan.stats, summary);
        if scan.cancelled {
            lines.push(("Status".into(), "cancelled".yellow().bold()));
        }
        print::as_tree_one_level(lines);

        if !scan.services.is_empty() {
            print::as_tree_one_level(format::services_to_key_value_pair(&scan.services));
        }
        if !scan.names.is_empty() {
            print::as_tree_one_level(format::names_to_key_value_pair(&scan.names));
        }
    }

    if summaries.iter().all(|s| {
        s.outcome
            .as_ref()
            .is_ok_and(|scan| scan.services.is_empty() && scan.names.is_empty())
    }) {
        print::no_results();
    }

    print::centerln(&format!("done in {}", format_elapsed(total)).bright_black().to_string());
    print::end_of_program();
}
