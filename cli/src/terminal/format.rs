use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;

use colored::*;
use rekon_common::finding::ServiceTriple;
use rekon_common::utils::timing::format_elapsed;
use rekon_core::{SchedulerStats, TargetSummary};

use crate::terminal::colors;

pub fn services_to_key_value_pair(services: &[ServiceTriple]) -> Vec<(String, ColoredString)> {
    services
        .iter()
        .map(|triple| {
            (
                format!("{}/{}", triple.protocol, triple.port),
                triple.service.color(colors::SERVICE),
            )
        })
        .collect()
}

pub fn names_to_key_value_pair(
    names: &BTreeMap<IpAddr, BTreeSet<String>>,
) -> Vec<(String, ColoredString)> {
    names
        .iter()
        .map(|(ip, names)| {
            let joined = names.iter().cloned().collect::<Vec<_>>().join(", ");
            (ip.to_string(), joined.color(colors::DOMAIN))
        })
        .collect()
}

pub fn stats_to_key_value_pair(
    stats: &SchedulerStats,
    summary: &TargetSummary,
) -> Vec<(String, ColoredString)> {
    let failed = if stats.failed > 0 {
        stats.failed.to_string().red().bold()
    } else {
        stats.failed.to_string().normal()
    };

    vec![
        ("Seeds".into(), stats.seeded.to_string().normal()),
        ("Followups".into(), stats.followups.to_string().normal()),
        ("Done".into(), stats.completed.to_string().green()),
        ("Failed".into(), failed),
        ("Elapsed".into(), format_elapsed(summary.elapsed).normal()),
    ]
}
