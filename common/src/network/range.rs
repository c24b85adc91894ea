use std::net::{IpAddr, Ipv4Addr};

/// Inclusive IPv4 range, as written on the command line (`10.0.0.1-20`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4Range {
    pub start_addr: Ipv4Addr,
    pub end_addr: Ipv4Addr,
}

impl Ipv4Range {
    pub fn new(start_addr: Ipv4Addr, end_addr: Ipv4Addr) -> Self {
        Self {
            start_addr,
            end_addr,
        }
    }

    /// Yields every address in the range. A reversed range yields nothing.
    pub fn to_iter(&self) -> impl Iterator<Item = IpAddr> {
        let start: u32 = self.start_addr.into();
        let end: u32 = self.end_addr.into();
        (start..=end).map(|ip| IpAddr::V4(Ipv4Addr::from(ip)))
    }

    pub fn len(&self) -> usize {
        let start: u32 = self.start_addr.into();
        let end: u32 = self.end_addr.into();
        if end < start { 0 } else { (end - start) as usize + 1 }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Converts CIDR notation into a range.
///
/// Blocks wider than a /31 drop their network and broadcast addresses; a /31
/// or /32 keeps every address.
pub fn cidr_range(ip: Ipv4Addr, prefix: u8) -> anyhow::Result<Ipv4Range> {
    let network = pnet::ipnetwork::Ipv4Network::new(ip, prefix)?;
    let start: u32 = network.network().into();
    let end: u32 = network.broadcast().into();

    if prefix >= 31 {
        return Ok(Ipv4Range::new(start.into(), end.into()));
    }

    Ok(Ipv4Range::new(
        start.saturating_add(1).into(),
        end.saturating_sub(1).into(),
    ))
}
