//! Structured facts extracted from command output.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            other => Err(format!("unknown protocol: {other}")),
        }
    }
}

/// The `(protocol, port, service)` key used to tell services apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceTriple {
    pub protocol: Protocol,
    pub port: u16,
    pub service: String,
}

impl fmt::Display for ServiceTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.protocol, self.port, self.service)
    }
}

/// An open port as reported by a port scanner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub protocol: Protocol,
    pub port: u16,
    pub service: String,
    pub version: Option<String>,
    pub ttl: Option<u8>,
}

impl ServiceRecord {
    pub fn triple(&self) -> ServiceTriple {
        ServiceTriple {
            protocol: self.protocol,
            port: self.port,
            service: self.service.clone(),
        }
    }

    /// Version and ttl text, e.g. `Apache httpd 2.4.41 ttl 63`.
    pub fn extra(&self) -> Option<String> {
        let parts: Vec<String> = [
            self.version.clone(),
            self.ttl.map(|ttl| format!("ttl {ttl}")),
        ]
        .into_iter()
        .flatten()
        .collect();

        (!parts.is_empty()).then(|| parts.join(" "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Finding {
    DomainToIp { domain: String, ip: IpAddr },
    PortService(ServiceRecord),
    FreeText { description: String, matched: String },
}

impl Finding {
    /// Text written after the description in `patterns.log`.
    pub fn audit_text(&self) -> String {
        match self {
            Finding::DomainToIp { domain, ip } => format!("{domain} => {ip}"),
            Finding::PortService(record) => match record.extra() {
                Some(extra) => format!("{} => {extra}", record.triple()),
                None => record.triple().to_string(),
            },
            Finding::FreeText { matched, .. } => matched.clone(),
        }
    }
}
