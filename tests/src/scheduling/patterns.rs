use rekon_common::config::ScanModule;
use rekon_core::audit::{PATTERNS_LOG, PatternEntry};

use crate::support::Harness;

const CVE_PATTERNS: &str = r#"
    [[global]]
    description = "cve: {match}"
    pattern = 'CVE-\d{4}-\d{4,7}'
"#;

fn plugin(name: &str, command: &str) -> String {
    format!(
        r#"
        [[plugin]]
        name = "{name}"
        categories = ["portscan"]
        modules = ["netscan"]
        profiles = ["default"]
        command = "{command}"
        "#
    )
}

fn entries(harness: &Harness) -> Vec<PatternEntry> {
    harness
        .log_lines("10.0.0.5", PATTERNS_LOG)
        .iter()
        .filter_map(|line| PatternEntry::parse(line))
        .collect()
}

#[tokio::test]
async fn repeated_match_in_one_stream_is_logged_once() {
    let plugins = plugin("Vuln", "echo CVE-2021-41773; echo again CVE-2021-41773");
    let harness = Harness::new(ScanModule::Netscan, &plugins, CVE_PATTERNS);

    harness.scan("10.0.0.5").await;

    let logged = entries(&harness);
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].plugin, "Vuln");
    assert_eq!(logged[0].detail, "10.0.0.5:cve:CVE-2021-41773");
}

#[tokio::test]
async fn same_match_from_two_plugins_is_logged_per_plugin() {
    let plugins = format!(
        "{}{}",
        plugin("VulnA", "echo CVE-2021-41773"),
        plugin("VulnB", "echo CVE-2021-41773; echo CVE-2021-41773")
    );
    let harness = Harness::new(ScanModule::Netscan, &plugins, CVE_PATTERNS);

    harness.scan("10.0.0.5").await;

    let mut plugins: Vec<String> = entries(&harness).into_iter().map(|e| e.plugin).collect();
    plugins.sort();
    assert_eq!(plugins, ["VulnA", "VulnB"]);
}

#[tokio::test]
async fn plugin_patterns_take_precedence_over_global() {
    let plugins = format!(
        "{}{}",
        plugin("NmapTCPTop1000", "echo '21/tcp open ftp'; echo CVE-2021-41773"),
        plugin("Other", "echo CVE-2021-41773")
    );
    let patterns = format!(
        r#"{CVE_PATTERNS}
        [[phases.portscan.NmapTCPTop1000]]
        description = "portscan: {{match}}"
        pattern = '^(?P<port>\d+)/(?P<protocol>tcp|udp)\s+open\s+(?P<service>\S+)'
        "#
    );
    let harness = Harness::new(ScanModule::Netscan, &plugins, &patterns);

    let summary = harness.scan("10.0.0.5").await;

    assert_eq!(summary.services.len(), 1);
    let logged = entries(&harness);
    assert_eq!(logged.len(), 2);
    assert!(logged
        .iter()
        .any(|e| e.plugin == "NmapTCPTop1000" && e.detail.ends_with(":tcp/21/ftp")));
    assert!(logged
        .iter()
        .any(|e| e.plugin == "Other" && e.detail.ends_with(":cve:CVE-2021-41773")));
}
