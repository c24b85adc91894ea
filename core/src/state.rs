//! Per-target scan state, owned by one scheduling loop.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::net::IpAddr;

use rekon_common::finding::ServiceTriple;

use crate::registry::RunOnceRegistry;

/// How a newly observed `(ip, name)` pair relates to what is already known.
/// Selects which follow-on plugin categories run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiscoveryKind {
    /// New address whose name is the queried target itself.
    DomainScan,
    /// New address for some other in-scope name.
    IpSubdomain,
    /// Known address, new name.
    SubdomainRecon,
}

impl DiscoveryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscoveryKind::DomainScan => "domain-scan",
            DiscoveryKind::IpSubdomain => "ip-subdomain",
            DiscoveryKind::SubdomainRecon => "subdomain-recon",
        }
    }

    /// Whether the address itself gets network-block plugins.
    pub fn scans_ip(&self) -> bool {
        !matches!(self, DiscoveryKind::SubdomainRecon)
    }
}

#[derive(Debug, Default)]
pub struct ScanState {
    ip_to_names: HashMap<IpAddr, BTreeSet<String>>,
    services: HashSet<ServiceTriple>,
    run_once: RunOnceRegistry,
}

impl ScanState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `name` under `ip`. Returns `None` if the pair was already known.
    pub fn record_name(&mut self, ip: IpAddr, name: &str, queried: &str) -> Option<DiscoveryKind> {
        match self.ip_to_names.get_mut(&ip) {
            Some(names) => names
                .insert(name.to_string())
                .then_some(DiscoveryKind::SubdomainRecon),
            None => {
                self.ip_to_names.insert(ip, BTreeSet::from([name.to_string()]));
                if name == queried {
                    Some(DiscoveryKind::DomainScan)
                } else {
                    Some(DiscoveryKind::IpSubdomain)
                }
            }
        }
    }

    /// Returns `true` the first time a triple is seen.
    pub fn record_service(&mut self, triple: ServiceTriple) -> bool {
        self.services.insert(triple)
    }

    pub fn names_for(&self, ip: &IpAddr) -> Option<&BTreeSet<String>> {
        self.ip_to_names.get(ip)
    }

    pub fn ip_to_names(&self) -> &HashMap<IpAddr, BTreeSet<String>> {
        &self.ip_to_names
    }

    pub fn services(&self) -> &HashSet<ServiceTriple> {
        &self.services
    }

    pub fn run_once(&self) -> &RunOnceRegistry {
        &self.run_once
    }
}

#[cfg(test)]
mod tests {
    use rekon_common::finding::Protocol;

    use super::*;

    #[test]
    fn repeated_pairs_are_stored_once() {
        let mut state = ScanState::new();
        let ip: IpAddr = "93.184.216.34".parse().unwrap();

        assert_eq!(
            state.record_name(ip, "example.com", "example.com"),
            Some(DiscoveryKind::DomainScan)
        );
        assert_eq!(state.record_name(ip, "example.com", "example.com"), None);
        assert_eq!(
            state.record_name(ip, "www.example.com", "example.com"),
            Some(DiscoveryKind::SubdomainRecon)
        );
        assert_eq!(state.record_name(ip, "www.example.com", "example.com"), None);

        let names = state.names_for(&ip).unwrap();
        assert_eq!(names.len(), 2);
        assert_eq!(names.iter().filter(|n| *n == "example.com").count(), 1);
    }

    #[test]
    fn new_ip_for_other_name_is_ip_subdomain() {
        let mut state = ScanState::new();
        let ip = "10.1.1.1".parse().unwrap();
        let kind = state.record_name(ip, "mail.example.com", "example.com");
        assert_eq!(kind, Some(DiscoveryKind::IpSubdomain));
        assert!(kind.unwrap().scans_ip());
        assert!(!DiscoveryKind::SubdomainRecon.scans_ip());
    }

    #[test]
    fn services_are_deduplicated() {
        let mut state = ScanState::new();
        let triple = ServiceTriple {
            protocol: Protocol::Tcp,
            port: 80,
            service: "http".into(),
        };

        assert!(state.record_service(triple.clone()));
        assert!(!state.record_service(triple));
        assert_eq!(state.services().len(), 1);
    }
}
