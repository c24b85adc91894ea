//! Host name helpers used to scope discovered names.

use std::net::IpAddr;

/// Second-level labels that act like a public suffix. A name ending in one of
/// these keeps three labels as its base domain instead of two.
const MULTI_PART_SUFFIXES: &[&str] = &[
    "co.uk", "org.uk", "ac.uk", "gov.uk", "com.au", "net.au", "org.au", "co.nz", "co.jp",
    "co.za", "com.br", "com.mx", "com.ar", "com.tr", "com.cn", "co.in", "co.kr", "gob.mx",
    "gov.br", "edu.au",
];

/// Returns `true` if `s` looks like a DNS host name (not an IP address).
pub fn is_domain(s: &str) -> bool {
    if s.is_empty() || s.len() > 253 || s.parse::<IpAddr>().is_ok() {
        return false;
    }

    let labels: Vec<&str> = s.split('.').collect();
    if labels.len() < 2 {
        return false;
    }

    let valid_labels = labels.iter().all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    });

    let tld_ok = labels
        .last()
        .is_some_and(|tld| tld.chars().any(|c| c.is_ascii_alphabetic()));

    valid_labels && tld_ok
}

/// Cleans a name captured from tool output: trims whitespace, a trailing
/// root dot and a leading wildcard label, and lowercases it.
///
/// Returns `None` when what is left is not a host name.
pub fn normalize_name(raw: &str) -> Option<String> {
    let name = raw.trim().trim_end_matches('.');
    let name = name.strip_prefix("*.").unwrap_or(name);
    let name = name.to_ascii_lowercase();

    is_domain(&name).then_some(name)
}

/// The registrable root of `name`, e.g. `www.dev.example.com` → `example.com`.
pub fn base_domain(name: &str) -> Option<String> {
    let name = normalize_name(name)?;
    let labels: Vec<&str> = name.split('.').collect();

    let keep = if labels.len() >= 3 {
        let suffix = labels[labels.len() - 2..].join(".");
        if MULTI_PART_SUFFIXES.contains(&suffix.as_str()) { 3 } else { 2 }
    } else {
        2
    };

    Some(labels[labels.len() - keep..].join("."))
}

/// Returns `true` if `name` is `base` itself or one of its subdomains.
pub fn in_scope(name: &str, base: &str) -> bool {
    name == base
        || name
            .strip_suffix(base)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// Reverse-lookup zone names never leave the tool output.
pub fn is_reverse_zone(name: &str) -> bool {
    name.contains("arpa")
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
