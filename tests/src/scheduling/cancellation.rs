use std::time::{Duration, Instant};

use rekon_common::config::{Config, ScanModule};
use rekon_core::audit::COMMANDS_LOG;
use rekon_core::{RunContext, Scheduler};
use tokio::time::{sleep, timeout};

use crate::support::Harness;

fn sleepers(count: usize, command: &str) -> String {
    (0..count)
        .map(|i| {
            format!(
                r#"
                [[plugin]]
                name = "Sleep{i}"
                categories = ["portscan"]
                modules = ["netscan"]
                profiles = ["default"]
                command = "{command}"
                "#
            )
        })
        .collect()
}

async fn wait_for_running(run: &RunContext, count: usize) {
    timeout(Duration::from_secs(10), async {
        while run.tracker.len() < count {
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("commands never started");
}

#[tokio::test]
async fn shutdown_cancels_running_and_queued_tasks() {
    let config = Config {
        concurrent_scans: 5,
        ..Config::default()
    };
    let harness = Harness::with_config(ScanModule::Netscan, &sleepers(8, "sleep 30"), "", config);
    let scheduler = Scheduler::new(harness.context("10.0.0.5"));

    let started = Instant::now();
    let (summary, _) = tokio::join!(scheduler.run(), async {
        wait_for_running(&harness.run, 5).await;
        // The governor holds the rest back.
        sleep(Duration::from_millis(100)).await;
        assert_eq!(harness.run.tracker.len(), 5);
        harness.run.shutdown.trigger();
    });
    let summary = summary.unwrap();

    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(summary.cancelled);
    assert_eq!(summary.stats.seeded, 8);
    assert_eq!(summary.stats.cancelled, 8);
    assert_eq!(summary.stats.completed, 0);
    assert_eq!(harness.log_lines("10.0.0.5", COMMANDS_LOG).len(), 5);
    assert!(harness.run.tracker.is_empty());
}

#[tokio::test]
async fn commands_ignoring_sigterm_are_killed_after_the_grace_period() {
    let harness = Harness::new(
        ScanModule::Netscan,
        &sleepers(1, "trap '' TERM; sleep 30"),
        "",
    );
    let grace = harness.run.config.grace_period;
    let scheduler = Scheduler::new(harness.context("10.0.0.5"));

    let (summary, stopped_at) = tokio::join!(scheduler.run(), async {
        wait_for_running(&harness.run, 1).await;
        // Give the shell time to install the trap.
        sleep(Duration::from_millis(300)).await;
        harness.run.shutdown.trigger();
        Instant::now()
    });
    let summary = summary.unwrap();

    let waited = stopped_at.elapsed();
    assert!(waited >= grace, "stopped after {waited:?}");
    assert!(waited < Duration::from_secs(10));
    assert_eq!(summary.stats.cancelled, 1);
    assert!(harness.run.tracker.is_empty());
}

#[tokio::test]
async fn no_followups_after_shutdown() {
    let plugins = r#"
        [[plugin]]
        name = "NmapTCPTop1000"
        categories = ["portscan"]
        modules = ["netscan"]
        profiles = ["default"]
        command = "echo '80/tcp open http'"

        [[plugin]]
        name = "Whatweb"
        categories = ["scans"]
        modules = ["netscan"]
        service_matches = ["^http"]
        command = "echo whatweb {target}"
    "#;
    let patterns = r#"
        [[global]]
        description = "portscan: {match}"
        pattern = '^(?P<port>\d+)/(?P<protocol>tcp|udp)\s+open\s+(?P<service>\S+)'
    "#;
    let harness = Harness::new(ScanModule::Netscan, plugins, patterns);
    harness.run.shutdown.trigger();

    let summary = harness.scan("10.0.0.5").await;

    assert!(summary.cancelled);
    assert_eq!(summary.stats.followups, 0);
    assert!(harness.commands_of("10.0.0.5", "Whatweb").is_empty());
}
