use std::time::Duration;

/// Human readable elapsed time, e.g. `1 hour, 2 minutes, 3 seconds`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    if total == 0 {
        return "less than a second".to_string();
    }

    let units = [
        (total / 3600, "hour"),
        ((total % 3600) / 60, "minute"),
        (total % 60, "second"),
    ];

    units
        .iter()
        .filter(|(value, _)| *value > 0)
        .map(|(value, unit)| {
            let plural = if *value == 1 { "" } else { "s" };
            format!("{value} {unit}{plural}")
        })
        .collect::<Vec<_>>()
        .join(", ")
}
