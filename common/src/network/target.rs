//! # Scan Target Model
//!
//! Defines the possible inputs for a recon run.
//!
//! Command line inputs are parsed into a [`TargetSpec`], which can be:
//! * A single IP address (host).
//! * An IPv4 Range (e.g., `192.168.1.1-100`).
//! * A CIDR block (e.g., `192.168.1.0/24`).
//! * A domain name (e.g., `example.com`).
//! * A comma separated mix of the above.
//!
//! Every spec expands into concrete [`Target`]s, one scan tree each.

use std::collections::HashSet;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

use crate::network::domain;
use crate::network::range::{self, Ipv4Range};

#[derive(Debug, Error)]
pub enum TargetError {
    #[error("invalid target '{input}': {reason}")]
    Invalid { input: String, reason: String },
    #[error("failed to read targets from {}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn invalid(input: &str, reason: impl Into<String>) -> TargetError {
    TargetError::Invalid {
        input: input.to_string(),
        reason: reason.into(),
    }
}

/// One host under reconnaissance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Target {
    Ip(IpAddr),
    Domain(String),
}

impl Target {
    pub fn is_domain(&self) -> bool {
        matches!(self, Target::Domain(_))
    }

    /// Registrable root used to scope discovered names. `None` for IPs.
    pub fn base_domain(&self) -> Option<String> {
        match self {
            Target::Ip(_) => None,
            Target::Domain(name) => domain::base_domain(name),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Ip(addr) => write!(f, "{addr}"),
            Target::Domain(name) => f.write_str(name),
        }
    }
}

/// A parsed target argument, before expansion.
#[derive(Clone, Debug)]
pub enum TargetSpec {
    /// A single specific host.
    Host { target_addr: IpAddr },
    /// A range of IPv4 addresses.
    Range { ipv4_range: Ipv4Range },
    /// A resolvable host name.
    Domain { name: String },
    /// Holds a list of different targets
    Multi { targets: Vec<TargetSpec> },
}

impl FromStr for TargetSpec {
    type Err = TargetError;

    /// Parses a string into a `TargetSpec`.
    ///
    /// Supported formats:
    /// * **Host**: Single IPv4/IPv6 address (e.g., "192.168.1.5").
    /// * **Range**: "Start-End" (e.g., "192.168.1.1-50", "192.168.1.1-192.168.1.50").
    /// * **CIDR**: "Network/Prefix" (e.g., "192.168.1.0/24").
    /// * **Domain**: "example.com", "www.example.com." (trailing dot allowed).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        if s.contains(',') {
            return parse_commas(s);
        }

        if let Some(target) = parse_host(s) {
            return Ok(target);
        }

        if let Some(target) = parse_cidr_range(s)? {
            return Ok(target);
        }

        if let Some(name) = domain::normalize_name(s) {
            return Ok(TargetSpec::Domain { name });
        }

        if let Some(target) = parse_ip_range(s)? {
            return Ok(target);
        }

        Err(invalid(s, "not an IP address, range, CIDR block or domain"))
    }
}

impl TargetSpec {
    /// Flattens the spec into scan targets, in input order.
    pub fn expand(self) -> Vec<Target> {
        let mut out = Vec::new();
        self.expand_into(&mut out);
        out
    }

    fn expand_into(self, out: &mut Vec<Target>) {
        match self {
            TargetSpec::Host { target_addr } => out.push(Target::Ip(target_addr)),
            TargetSpec::Range { ipv4_range } => out.extend(ipv4_range.to_iter().map(Target::Ip)),
            TargetSpec::Domain { name } => out.push(Target::Domain(name)),
            TargetSpec::Multi { targets } => {
                for target in targets {
                    target.expand_into(out);
                }
            }
        }
    }
}

/// Resolves every command line input into a de-duplicated target list.
///
/// An input naming an existing file is read as a target list (one per line,
/// `#` starts a comment). Everything else is parsed as a [`TargetSpec`].
pub fn collect_targets<S: AsRef<str>>(inputs: &[S]) -> Result<Vec<Target>, TargetError> {
    let mut seen = HashSet::new();
    let mut targets = Vec::new();

    for input in inputs {
        let input = input.as_ref().trim();
        if input.is_empty() {
            continue;
        }

        let specs = if Path::new(input).is_file() {
            read_target_file(Path::new(input))?
        } else {
            vec![TargetSpec::from_str(input)?]
        };

        for target in specs.into_iter().flat_map(TargetSpec::expand) {
            if seen.insert(target.clone()) {
                targets.push(target);
            }
        }
    }

    Ok(targets)
}

/// Reads one target per line, skipping blank lines and `#` comments.
pub fn read_target_file(path: &Path) -> Result<Vec<TargetSpec>, TargetError> {
    let content = std::fs::read_to_string(path).map_err(|source| TargetError::File {
        path: path.to_path_buf(),
        source,
    })?;

    content
        .lines()
        .map(|line| line.split('#').next().unwrap_or_default().trim())
        .filter(|line| !line.is_empty())
        .map(TargetSpec::from_str)
        .collect()
}

/// Parses a comma-separated list of targets (e.g., "192.168.1.5, 10.0.0.1-50, example.com").
fn parse_commas(s: &str) -> Result<TargetSpec, TargetError> {
    let targets = s
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(TargetSpec::from_str)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(TargetSpec::Multi { targets })
}

/// Parses a single IP address.
fn parse_host(s: &str) -> Option<TargetSpec> {
    s.parse::<IpAddr>()
        .ok()
        .map(|target_addr| TargetSpec::Host { target_addr })
}

/// Parses a range string like "1.1.1.1-2.2.2.2" or "1.1.1.1-50".
fn parse_ip_range(s: &str) -> Result<Option<TargetSpec>, TargetError> {
    let Some((start_str, end_str)) = s.split_once('-') else {
        return Ok(None);
    };

    let start_addr = start_str
        .parse::<Ipv4Addr>()
        .map_err(|e| invalid(s, format!("invalid start IP in range '{start_str}': {e}")))?;

    let end_addr = parse_range_end_addr(end_str, &start_addr, s)?;

    let ipv4_range = Ipv4Range::new(start_addr, end_addr);
    Ok(Some(TargetSpec::Range { ipv4_range }))
}

/// Helper to parse the end address of a range.
///
/// Handles abbreviated forms like "192.168.1.1-50" (implies 192.168.1.50)
/// and full forms like "192.168.1.1-192.168.1.255".
fn parse_range_end_addr(
    end_str: &str,
    start_addr: &Ipv4Addr,
    original_s: &str,
) -> Result<Ipv4Addr, TargetError> {
    if let Ok(full_addr) = end_str.parse::<Ipv4Addr>() {
        return Ok(full_addr);
    }

    let mut end_octets = start_addr.octets();
    let partial_octets: Vec<u8> = end_str
        .split('.')
        .map(|octet_str| octet_str.parse::<u8>())
        .collect::<Result<Vec<u8>, _>>()
        .map_err(|e| invalid(original_s, format!("invalid end range '{end_str}': {e}")))?;

    if partial_octets.len() > 4 {
        return Err(invalid(original_s, "end range has too many octets"));
    }

    let start_index = 4 - partial_octets.len();
    end_octets[start_index..].copy_from_slice(&partial_octets);

    Ok(Ipv4Addr::from(end_octets))
}

/// Parses CIDR notation like "192.168.1.0/24".
fn parse_cidr_range(s: &str) -> Result<Option<TargetSpec>, TargetError> {
    let Some((ip_str, prefix_str)) = s.split_once('/') else {
        return Ok(None);
    };

    let ipv4_addr = ip_str
        .parse::<Ipv4Addr>()
        .map_err(|e| invalid(s, format!("invalid IP in CIDR '{ip_str}': {e}")))?;

    let prefix = prefix_str
        .parse::<u8>()
        .map_err(|e| invalid(s, format!("invalid prefix in CIDR '{prefix_str}': {e}")))?;

    let ipv4_range = range::cidr_range(ipv4_addr, prefix).map_err(|e| invalid(s, e.to_string()))?;

    Ok(Some(TargetSpec::Range { ipv4_range }))
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
