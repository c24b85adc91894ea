use rekon_common::config::ScanModule;
use rekon_common::finding::{Protocol, ServiceTriple};
use rekon_core::SchedulerPhase;

use crate::support::Harness;

const NMAP_PATTERN: &str = r#"
    [[phases.portscan.NmapTCPTop1000]]
    description = "portscan: {match}"
    pattern = '^(?P<port>\d+)/(?P<protocol>tcp|udp)\s+open\s+(?P<service>[A-Za-z0-9_.+-]+)\s*(?P<version>.*)$'

    [[phases.portscan.NaabuTCPTop1000]]
    description = "portscan: {match}"
    pattern = '^(?P<port>\d+)/(?P<protocol>tcp|udp)\s+open\s+(?P<service>[A-Za-z0-9_.+-]+)\s*(?P<version>.*)$'
"#;

const SERVICE_PLUGINS: &str = r#"
    [[plugin]]
    name = "Whatweb"
    categories = ["scans"]
    modules = ["netscan"]
    service_matches = ["^http", "^https"]
    command = "echo whatweb {service}://{target}:{port}"

    [[plugin]]
    name = "Nuclei"
    categories = ["scans"]
    modules = ["netscan"]
    service_matches = ["^http"]
    run_once = true
    command = "echo nuclei {target}"

    [[plugin]]
    name = "NmapSsh"
    categories = ["scans"]
    modules = ["netscan"]
    service_matches = ["^ssh"]
    command = "echo nmap -p {port} {target}"

    [[plugin]]
    name = "SSLScan"
    categories = ["scans"]
    modules = ["netscan"]
    tls = true
    command = "echo sslscan {target}:{port}"
"#;

fn catalog(seeds: &str) -> String {
    format!("{seeds}\n{SERVICE_PLUGINS}")
}

#[tokio::test]
async fn http_service_fans_out_to_matching_plugins() {
    let plugins = catalog(
        r#"
        [[plugin]]
        name = "NmapTCPTop1000"
        categories = ["portscan"]
        modules = ["netscan"]
        profiles = ["default"]
        run_once = true
        command = "echo '80/tcp open  http    syn-ack ttl 63 nginx 1.18.0'"
        "#,
    );
    let harness = Harness::new(ScanModule::Netscan, &plugins, NMAP_PATTERN);

    let summary = harness.scan("10.0.0.5").await;

    assert_eq!(summary.phase, SchedulerPhase::Drained);
    assert_eq!(
        summary.services,
        vec![ServiceTriple {
            protocol: Protocol::Tcp,
            port: 80,
            service: "http".into(),
        }]
    );
    assert_eq!(summary.stats.seeded, 1);
    assert_eq!(summary.stats.followups, 2);
    assert_eq!(summary.stats.completed, 3);

    let whatweb = harness.commands_of("10.0.0.5", "Whatweb");
    assert_eq!(whatweb.len(), 1);
    assert!(whatweb[0]
        .ends_with(":scans:Whatweb:tcp/80/http:10.0.0.5:echo whatweb http://10.0.0.5:80"));
    assert_eq!(harness.commands_of("10.0.0.5", "Nuclei").len(), 1);
    assert!(harness.commands_of("10.0.0.5", "NmapSsh").is_empty());
    assert!(harness.commands_of("10.0.0.5", "SSLScan").is_empty());

    let patterns = harness.log_lines("10.0.0.5", "patterns.log");
    let expected = ":portscan:NmapTCPTop1000:10.0.0.5:portscan:tcp/80/http => nginx 1.18.0 ttl 63";
    assert!(patterns.iter().any(|l| l.ends_with(expected)));
}

#[tokio::test]
async fn repeated_services_and_run_once_plugins_dispatch_once() {
    let plugins = catalog(
        r#"
        [[plugin]]
        name = "NmapTCPTop1000"
        categories = ["portscan"]
        modules = ["netscan"]
        profiles = ["default"]
        run_once = true
        command = "echo '80/tcp open http'; echo '8080/tcp open http'; echo '22/tcp open ssh'"

        [[plugin]]
        name = "NaabuTCPTop1000"
        categories = ["portscan"]
        modules = ["netscan"]
        profiles = ["default"]
        run_once = true
        command = "echo '80/tcp open http'; echo '22/tcp open ssh'"
        "#,
    );
    let harness = Harness::new(ScanModule::Netscan, &plugins, NMAP_PATTERN);

    let summary = harness.scan("10.0.0.5").await;

    assert_eq!(summary.services.len(), 3);
    // Once per port for Whatweb, once per target for Nuclei.
    assert_eq!(harness.commands_of("10.0.0.5", "Whatweb").len(), 2);
    assert_eq!(harness.commands_of("10.0.0.5", "Nuclei").len(), 1);
    assert_eq!(harness.commands_of("10.0.0.5", "NmapSsh").len(), 1);
    assert_eq!(summary.stats.followups, 4);
}

#[tokio::test]
async fn seeds_without_findings_drain_after_k_completions() {
    let plugins = r#"
        [[plugin]]
        name = "ScanA"
        categories = ["portscan"]
        modules = ["netscan"]
        profiles = ["default"]
        command = "echo nothing to see"

        [[plugin]]
        name = "ScanB"
        categories = ["portscan"]
        modules = ["netscan"]
        profiles = ["default"]
        command = "true"

        [[plugin]]
        name = "ScanC"
        categories = ["portscan"]
        modules = ["netscan"]
        profiles = ["default"]
        command = "echo 'Host is up' >&2"

        [[plugin]]
        name = "ScanD"
        categories = ["portscan"]
        modules = ["netscan"]
        profiles = ["default"]
        command = "sleep 0.2"
    "#;
    let harness = Harness::new(ScanModule::Netscan, plugins, "");

    let summary = harness.scan("10.0.0.5").await;

    assert_eq!(summary.phase, SchedulerPhase::Drained);
    assert_eq!(summary.stats.seeded, 4);
    assert_eq!(summary.stats.completed, 4);
    assert_eq!(summary.stats.followups, 0);
    assert!(summary.services.is_empty());
}

#[tokio::test]
async fn wrapped_https_reaches_tls_plugins() {
    let plugins = catalog(
        r#"
        [[plugin]]
        name = "NmapTCPTop1000"
        categories = ["portscan"]
        modules = ["netscan"]
        profiles = ["default"]
        run_once = true
        command = "echo '443/tcp open tcpwrapped'; echo '31337/tcp open tcpwrapped'"
        "#,
    );
    let harness = Harness::new(ScanModule::Netscan, &plugins, NMAP_PATTERN);

    let summary = harness.scan("10.0.0.5").await;

    // The raw report is kept; only matching sees the guess.
    assert!(summary.services.iter().any(|s| s.port == 443 && s.service == "tcpwrapped"));
    assert!(summary.services.iter().any(|s| s.port == 31337));

    let sslscan = harness.commands_of("10.0.0.5", "SSLScan");
    assert_eq!(sslscan.len(), 1);
    assert!(sslscan[0].contains(":scans:SSLScan:tcp/443/https:10.0.0.5:"));

    let whatweb = harness.commands_of("10.0.0.5", "Whatweb");
    assert_eq!(whatweb.len(), 1);
    assert!(whatweb[0].ends_with("echo whatweb https://10.0.0.5:443"));
}

#[tokio::test]
async fn failed_seed_does_not_fan_out() {
    let plugins = catalog(
        r#"
        [[plugin]]
        name = "NmapTCPTop1000"
        categories = ["portscan"]
        modules = ["netscan"]
        profiles = ["default"]
        command = "echo '80/tcp open http'; exit 2"
        "#,
    );
    let harness = Harness::new(ScanModule::Netscan, &plugins, NMAP_PATTERN);

    let summary = harness.scan("10.0.0.5").await;

    assert_eq!(summary.stats.failed, 1);
    assert_eq!(summary.stats.followups, 0);
    let errors = harness.log_lines("10.0.0.5", "error.log");
    assert_eq!(errors.len(), 1);
    assert!(errors[0].ends_with(":portscan:NmapTCPTop1000:10.0.0.5:Error:2"));
}
