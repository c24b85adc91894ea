use std::collections::HashMap;
use std::io;
use std::net::IpAddr;

use async_trait::async_trait;

/// Forward lookup for names found without an address.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, name: &str) -> io::Result<IpAddr>;
}

/// Uses the operating system resolver. IPv4 answers win over IPv6.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

#[async_trait]
impl Resolver for SystemResolver {
    async fn resolve(&self, name: &str) -> io::Result<IpAddr> {
        let addrs: Vec<IpAddr> = tokio::net::lookup_host((name, 0))
            .await?
            .map(|addr| addr.ip())
            .collect();

        addrs
            .iter()
            .find(|ip| ip.is_ipv4())
            .or_else(|| addrs.first())
            .copied()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("{name} does not appear to be a resolvable hostname"),
                )
            })
    }
}

/// Fixed answers, for offline runs and tests.
#[derive(Debug, Default, Clone)]
pub struct StaticResolver {
    entries: HashMap<String, IpAddr>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, ip: IpAddr) -> Self {
        self.entries.insert(name.to_string(), ip);
        self
    }
}

#[async_trait]
impl Resolver for StaticResolver {
    async fn resolve(&self, name: &str) -> io::Result<IpAddr> {
        self.entries.get(name).copied().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{name} does not appear to be a resolvable hostname"),
            )
        })
    }
}
