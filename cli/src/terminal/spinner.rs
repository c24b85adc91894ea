use colored::*;
use indicatif::ProgressStyle;
use tracing::{Span, info_span};
use tracing_indicatif::span_ext::IndicatifSpanExt;

const TICK_STRINGS: &[&str] = &[
    "▁▁▁▁▁",
    "▁▂▂▂▁",
    "▁▄▂▄▁",
    "▂▄▆▄▂",
    "▄▆█▆▄",
    "▂▄▆▄▂",
    "▁▄▂▄▁",
    "▁▂▂▂▁",
];
const TIP: &str = "press 'q' to finish early";

fn style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.blue} {msg} {elapsed:.dim}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(TICK_STRINGS)
}

/// A spinner that lives as long as the returned span is open.
pub fn scan_span(module: &str, targets: usize, input_enabled: bool) -> Span {
    let span = info_span!("scan", indicatif.pb_show = true);
    span.pb_set_style(&style());

    let mut message = format!(
        "Running {} on {}",
        module.bold(),
        format!("{targets} target(s)").green().bold()
    );
    if input_enabled {
        message = format!("{message} {}", format!("({TIP})").italic().dimmed());
    }
    span.pb_set_message(&message);
    span
}
