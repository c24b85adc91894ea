use std::collections::BTreeSet;
use std::net::IpAddr;

use rekon_common::config::{Config, ScanModule};
use rekon_core::audit::ERROR_LOG;
use rekon_core::resolver::StaticResolver;

use crate::support::Harness;

const PLUGINS: &str = r#"
    [[plugin]]
    name = "SubFinder"
    categories = ["discover"]
    modules = ["osint"]
    command = "printf 'example.com\nwww.example.com\nmail.example.com\nghost.example.com\n1.0.0.10.in-addr.arpa\nwww.evil.org\n'"

    [[plugin]]
    name = "DigEnum"
    categories = ["discover"]
    modules = ["osint"]
    command = "echo 'www.example.com A 10.0.0.1'"

    [[plugin]]
    name = "Rev"
    categories = ["revlookup"]
    modules = ["osint"]
    command = "echo 'mail.example.net A 10.0.0.2'"

    [[plugin]]
    name = "Geo"
    categories = ["ipnet"]
    modules = ["osint"]
    command = "echo geo {target}"

    [[plugin]]
    name = "Harvest"
    categories = ["subdomain"]
    modules = ["osint"]
    run_once = true
    recon_extra = true
    command = "echo harvest {target}"

    [[plugin]]
    name = "WebSub"
    categories = ["subdomain"]
    modules = ["osint"]
    command = "echo websub {target}"
"#;

const PATTERNS: &str = r#"
    [[phases.discover.SubFinder]]
    description = "domain2ip: {match}"
    pattern = '^(?P<domain>[a-zA-Z0-9.-]+)(?P<ipaddress>)$'

    [[phases.discover.DigEnum]]
    description = "domain2ip: {match}"
    pattern = '^(?P<domain>\S+)\s+A\s+(?P<ipaddress>\S+)$'

    [[phases.revlookup.Rev]]
    description = "domain2ip: {match}"
    pattern = '^(?P<domain>\S+)\s+A\s+(?P<ipaddress>\S+)$'
"#;

fn resolver() -> StaticResolver {
    StaticResolver::new()
        .with("example.com", "10.0.0.1".parse().unwrap())
        .with("www.example.com", "10.0.0.1".parse().unwrap())
        .with("mail.example.com", "10.0.0.2".parse().unwrap())
}

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

fn set(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|n| n.to_string()).collect()
}

#[tokio::test]
async fn discovered_names_branch_into_ipnet_and_subdomain_plugins() {
    let harness = Harness::new(ScanModule::Osint, PLUGINS, PATTERNS).with_resolver(resolver());

    let summary = harness.scan("example.com").await;

    assert_eq!(summary.stats.seeded, 2);
    assert_eq!(summary.names.len(), 2);
    assert_eq!(summary.names[&ip("10.0.0.1")], set(&["example.com", "www.example.com"]));
    assert_eq!(summary.names[&ip("10.0.0.2")], set(&["mail.example.com"]));

    // Once per new address, whichever seed reported it first.
    assert_eq!(harness.commands_of("example.com", "Geo").len(), 2);
    // Once per name, except for run-once plugins.
    assert_eq!(harness.commands_of("example.com", "WebSub").len(), 3);
    assert_eq!(harness.commands_of("example.com", "Harvest").len(), 1);
    assert_eq!(summary.stats.followups, 6);

    // Only the unresolvable in-scope name is an error.
    let errors = harness.log_lines("example.com", ERROR_LOG);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("ghost.example.com"));
}

#[tokio::test]
async fn subdomain_targets_share_the_base_domain_directory() {
    let harness = Harness::new(ScanModule::Osint, PLUGINS, PATTERNS).with_resolver(resolver());

    harness.scan("www.example.com").await;

    assert!(harness.logs("example.com").is_dir());
    assert!(!harness.logs("www.example.com").exists());
}

#[tokio::test]
async fn only_recon_records_names_without_followups() {
    let config = Config {
        only_recon: true,
        ..Config::default()
    };
    let harness = Harness::with_config(ScanModule::Osint, PLUGINS, PATTERNS, config)
        .with_resolver(resolver());

    let summary = harness.scan("example.com").await;

    // Recon-extra plugins join the seeds.
    assert_eq!(summary.stats.seeded, 3);
    assert_eq!(summary.stats.followups, 0);
    assert_eq!(summary.names.len(), 2);
    assert!(harness.commands_of("example.com", "Geo").is_empty());
    assert!(harness.commands_of("example.com", "WebSub").is_empty());
    assert_eq!(harness.commands_of("example.com", "Harvest").len(), 1);
}

#[tokio::test]
async fn ip_targets_start_from_reverse_lookups() {
    let harness = Harness::new(ScanModule::Osint, PLUGINS, PATTERNS).with_resolver(resolver());

    let summary = harness.scan("10.0.0.2").await;

    assert_eq!(summary.stats.seeded, 1);
    assert_eq!(summary.names[&ip("10.0.0.2")], set(&["mail.example.net"]));
    let geo = harness.commands_of("10.0.0.2", "Geo");
    assert_eq!(geo.len(), 1);
    assert!(geo[0].ends_with(":ipnet:Geo:10.0.0.2:echo geo 10.0.0.2"));
    assert_eq!(harness.commands_of("10.0.0.2", "WebSub").len(), 1);
}
