use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, bail};
use colored::*;
use rekon_core::audit::{PATTERNS_LOG, PatternEntry};

use crate::terminal::{colors, print};

/// `patterns.log` entries per target directory.
pub type Report = BTreeMap<String, Vec<PatternEntry>>;

pub fn report(dir: &Path, json: bool) -> anyhow::Result<()> {
    let report = collect(dir)?;

    if json {
        let out = serde_json::to_string_pretty(&report).context("failed to serialize report")?;
        println!("{out}");
        return Ok(());
    }

    print::header(&format!("report for {}", dir.display()));
    if report.is_empty() {
        print::no_results();
    }

    for (idx, (target, entries)) in report.iter().enumerate() {
        print::tree_head(idx, target);

        let mut per_plugin: BTreeMap<(&str, &str), Vec<&str>> = BTreeMap::new();
        for entry in entries {
            per_plugin
                .entry((entry.phase.as_str(), entry.plugin.as_str()))
                .or_default()
                .push(entry.detail.as_str());
        }

        for ((phase, plugin), details) in per_plugin {
            print::print_status(format!(
                "{}:{} {}",
                phase.color(colors::SEPARATOR),
                plugin.color(colors::PRIMARY),
                format!("({})", details.len()).color(colors::ACCENT)
            ));
            print::as_tree_one_level(
                details
                    .into_iter()
                    .enumerate()
                    .map(|(i, detail)| ((i + 1).to_string(), detail.normal()))
                    .collect(),
            );
        }
    }

    print::end_of_program();
    Ok(())
}

/// Reads `<dir>/<target>/logs/patterns.log` for every target directory.
/// Lines that do not follow the log layout are skipped.
pub fn collect(dir: &Path) -> anyhow::Result<Report> {
    if !dir.is_dir() {
        bail!("{} is not a directory", dir.display());
    }

    let mut report = Report::new();
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;

    for entry in entries {
        let entry = entry?;
        let log = entry.path().join("logs").join(PATTERNS_LOG);
        if !log.is_file() {
            continue;
        }

        let text = std::fs::read_to_string(&log)
            .with_context(|| format!("failed to read {}", log.display()))?;
        let parsed: Vec<PatternEntry> = text.lines().filter_map(PatternEntry::parse).collect();

        report.insert(entry.file_name().to_string_lossy().into_owned(), parsed);
    }

    Ok(report)
}
