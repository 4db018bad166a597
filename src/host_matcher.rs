//! Classifies packet direction against a configured set of "my hosts"
//! subnets. Pure function over an immutable subnet list; no state.

use std::net::IpAddr;
use std::str::FromStr;

use ipnetwork::IpNetwork;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    ToHost,
    FromHost,
    Unknown,
}

#[derive(Clone, Debug, Default)]
pub struct HostMatcher {
    subnets: Vec<IpNetwork>,
}

impl HostMatcher {
    pub fn new(subnets: Vec<IpNetwork>) -> Self {
        HostMatcher { subnets }
    }

    /// Parses a comma-separated CIDR list, e.g. `192.168.0.0/24,fe80::/10`.
    pub fn parse(host_spec: &str) -> Result<Self, ipnetwork::IpNetworkError> {
        let subnets = host_spec
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(IpNetwork::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(HostMatcher::new(subnets))
    }

    fn contains(&self, ip: IpAddr) -> bool {
        self.subnets.iter().any(|net| net.contains(ip))
    }

    /// Destination tested before source; first match wins (§4.2).
    pub fn classify(&self, src_ip: IpAddr, dst_ip: IpAddr) -> Direction {
        if self.contains(dst_ip) {
            Direction::ToHost
        } else if self.contains(src_ip) {
            Direction::FromHost
        } else {
            Direction::Unknown
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher() -> HostMatcher {
        HostMatcher::parse("192.168.0.0/24,fe80::/10").unwrap()
    }

    #[test]
    fn destination_in_subnet_is_to_host() {
        let m = matcher();
        let src: IpAddr = "8.8.8.8".parse().unwrap();
        let dst: IpAddr = "192.168.0.5".parse().unwrap();
        assert_eq!(m.classify(src, dst), Direction::ToHost);
    }

    #[test]
    fn source_in_subnet_is_from_host() {
        let m = matcher();
        let src: IpAddr = "192.168.0.5".parse().unwrap();
        let dst: IpAddr = "8.8.8.8".parse().unwrap();
        assert_eq!(m.classify(src, dst), Direction::FromHost);
    }

    #[test]
    fn neither_in_subnet_is_unknown() {
        let m = matcher();
        let src: IpAddr = "1.1.1.1".parse().unwrap();
        let dst: IpAddr = "8.8.8.8".parse().unwrap();
        assert_eq!(m.classify(src, dst), Direction::Unknown);
    }

    #[test]
    fn destination_wins_when_both_match() {
        let m = HostMatcher::parse("192.168.0.0/16").unwrap();
        let src: IpAddr = "192.168.1.1".parse().unwrap();
        let dst: IpAddr = "192.168.2.2".parse().unwrap();
        assert_eq!(m.classify(src, dst), Direction::ToHost);
    }

    #[test]
    fn ipv6_subnet_matches() {
        let m = matcher();
        let src: IpAddr = "fe80::1".parse().unwrap();
        let dst: IpAddr = "2001:db8::1".parse().unwrap();
        assert_eq!(m.classify(src, dst), Direction::FromHost);
    }

    #[test]
    fn empty_matcher_is_always_unknown() {
        let m = HostMatcher::new(Vec::new());
        let src: IpAddr = "10.0.0.1".parse().unwrap();
        let dst: IpAddr = "10.0.0.2".parse().unwrap();
        assert_eq!(m.classify(src, dst), Direction::Unknown);
    }
}
