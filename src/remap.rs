//! Cluster address remapping.
//!
//! Metadata reports replica addresses as the cluster sees them. When the
//! caller reaches the cluster through NAT or a virtualized network those
//! addresses must be rewritten before connecting. Remapping is pure and
//! total: every address maps to exactly one address.

use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use tracing::{debug, info};

use crate::error::{ResolutionError, SourceError};

/// Host and port of a partition replica.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeAddress {
    pub host: String,
    pub port: u16,
}

impl NodeAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for NodeAddress {
    type Err = SourceError;

    /// Parse `host:port` or `[v6-host]:port`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SourceError::InvalidAddress(s.to_string());
        let s = s.trim();
        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            let (host, tail) = rest.split_once(']').ok_or_else(invalid)?;
            (host, tail.strip_prefix(':').ok_or_else(invalid)?)
        } else {
            s.rsplit_once(':').ok_or_else(invalid)?
        };
        if host.is_empty() {
            return Err(invalid());
        }
        let port = port.parse::<u16>().map_err(|_| invalid())?;
        Ok(Self::new(host, port))
    }
}

/// Which addresses a substitution applies to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RemapCondition {
    /// Every address
    #[default]
    Always,
    /// Addresses whose host starts with the prefix
    HostPrefix(String),
    /// Addresses on the given port
    Port(u16),
}

impl RemapCondition {
    fn applies_to(&self, address: &NodeAddress) -> bool {
        match self {
            RemapCondition::Always => true,
            RemapCondition::HostPrefix(prefix) => address.host.starts_with(prefix.as_str()),
            RemapCondition::Port(port) => address.port == *port,
        }
    }
}

/// Remap policy attached to a logical file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RemapInfo {
    /// Addresses are used as reported
    #[default]
    Identity,
    /// Rewrite hosts and ports from explicit tables
    Substitute {
        hosts: HashMap<String, String>,
        ports: HashMap<u16, u16>,
        /// Port used for matching addresses whose port has no table entry
        default_port: Option<u16>,
        condition: RemapCondition,
    },
    /// Map each distinct cluster node onto consecutive IPv4 addresses
    Sequential {
        base: Ipv4Addr,
        node_count: usize,
        /// Replaces every port when set
        port: Option<u16>,
    },
}

impl RemapInfo {
    /// Sequential remap of `node_count` nodes starting at `base`.
    pub fn sequential(base: Ipv4Addr, node_count: usize) -> Self {
        RemapInfo::Sequential {
            base,
            node_count,
            port: None,
        }
    }

    /// Empty substitution that rewrites nothing until tables are added.
    pub fn substitute() -> Self {
        RemapInfo::Substitute {
            hosts: HashMap::new(),
            ports: HashMap::new(),
            default_port: None,
            condition: RemapCondition::Always,
        }
    }

    /// Add a host substitution. Converts other policies into a substitution.
    pub fn with_host(self, from: impl Into<String>, to: impl Into<String>) -> Self {
        let mut this = self.into_substitute();
        if let RemapInfo::Substitute { hosts, .. } = &mut this {
            hosts.insert(from.into(), to.into());
        }
        this
    }

    /// Add a port substitution. Converts other policies into a substitution.
    pub fn with_port(self, from: u16, to: u16) -> Self {
        let mut this = self.into_substitute();
        if let RemapInfo::Substitute { ports, .. } = &mut this {
            ports.insert(from, to);
        }
        this
    }

    /// Set the port used for every remapped address.
    pub fn with_default_port(mut self, port: u16) -> Self {
        match &mut self {
            RemapInfo::Substitute { default_port, .. } => *default_port = Some(port),
            RemapInfo::Sequential { port: p, .. } => *p = Some(port),
            RemapInfo::Identity => {
                return RemapInfo::substitute().with_default_port(port);
            }
        }
        self
    }

    /// Restrict a substitution to matching addresses.
    pub fn with_condition(self, condition: RemapCondition) -> Self {
        let mut this = self.into_substitute();
        if let RemapInfo::Substitute { condition: c, .. } = &mut this {
            *c = condition;
        }
        this
    }

    fn into_substitute(self) -> Self {
        match self {
            s @ RemapInfo::Substitute { .. } => s,
            _ => RemapInfo::substitute(),
        }
    }

    /// Whether this policy leaves addresses unchanged.
    pub fn is_identity(&self) -> bool {
        matches!(self, RemapInfo::Identity)
    }
}

#[derive(Debug, Clone)]
enum Mapping {
    Identity,
    Substitute {
        hosts: HashMap<String, String>,
        ports: HashMap<u16, u16>,
        default_port: Option<u16>,
        condition: RemapCondition,
    },
    Table {
        hosts: HashMap<String, String>,
        port: Option<u16>,
    },
}

/// Address mapping built from a [`RemapInfo`] and the nodes reported by
/// metadata.
#[derive(Debug, Clone)]
pub struct ClusterAddressRemapper {
    mapping: Mapping,
}

impl ClusterAddressRemapper {
    /// The mapping that returns every address unchanged.
    pub fn identity() -> Self {
        Self {
            mapping: Mapping::Identity,
        }
    }

    /// Build the mapping for `info` over the replica addresses of a file.
    ///
    /// # Errors
    /// `ResolutionError::Remap` when a sequential policy does not match the
    /// number of distinct hosts or its range overflows IPv4.
    pub fn build<'a>(
        info: &RemapInfo,
        nodes: impl IntoIterator<Item = &'a NodeAddress>,
    ) -> Result<Self, ResolutionError> {
        let mapping = match info {
            RemapInfo::Identity => Mapping::Identity,
            RemapInfo::Substitute {
                hosts,
                ports,
                default_port,
                condition,
            } => Mapping::Substitute {
                hosts: hosts.clone(),
                ports: ports.clone(),
                default_port: *default_port,
                condition: condition.clone(),
            },
            RemapInfo::Sequential {
                base,
                node_count,
                port,
            } => {
                let mut distinct: Vec<&str> = Vec::new();
                for node in nodes {
                    if !distinct.contains(&node.host.as_str()) {
                        distinct.push(&node.host);
                    }
                }
                if distinct.len() != *node_count {
                    return Err(ResolutionError::Remap(format!(
                        "remap declares {} nodes but the file spans {} distinct hosts",
                        node_count,
                        distinct.len()
                    )));
                }
                let start = u32::from(*base);
                let mut hosts = HashMap::with_capacity(distinct.len());
                for (i, host) in distinct.into_iter().enumerate() {
                    let ip = u32::try_from(i)
                        .ok()
                        .and_then(|i| start.checked_add(i))
                        .ok_or_else(|| {
                            ResolutionError::Remap(format!(
                                "{} nodes from {} overflow the IPv4 range",
                                node_count, base
                            ))
                        })?;
                    hosts.insert(host.to_string(), Ipv4Addr::from(ip).to_string());
                }
                Mapping::Table { hosts, port: *port }
            }
        };

        if !matches!(mapping, Mapping::Identity) {
            info!(policy = ?info, "Built cluster address remapper");
        }
        Ok(Self { mapping })
    }

    /// Map one address.
    pub fn apply(&self, address: &NodeAddress) -> NodeAddress {
        let mapped = match &self.mapping {
            Mapping::Identity => return address.clone(),
            Mapping::Substitute {
                hosts,
                ports,
                default_port,
                condition,
            } => {
                if !condition.applies_to(address) {
                    return address.clone();
                }
                let host = hosts
                    .get(&address.host)
                    .cloned()
                    .unwrap_or_else(|| address.host.clone());
                let port = ports
                    .get(&address.port)
                    .copied()
                    .or(*default_port)
                    .unwrap_or(address.port);
                NodeAddress::new(host, port)
            }
            Mapping::Table { hosts, port } => NodeAddress::new(
                hosts
                    .get(&address.host)
                    .cloned()
                    .unwrap_or_else(|| address.host.clone()),
                port.unwrap_or(address.port),
            ),
        };
        if mapped != *address {
            debug!(from = %address, to = %mapped, "Remapped replica address");
        }
        mapped
    }

    /// Map a replica list, preserving order and length.
    pub fn apply_all(&self, addresses: &[NodeAddress]) -> Vec<NodeAddress> {
        addresses.iter().map(|a| self.apply(a)).collect()
    }

    pub fn is_identity(&self) -> bool {
        matches!(self.mapping, Mapping::Identity)
    }
}

impl Default for ClusterAddressRemapper {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> NodeAddress {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!(addr("10.0.0.1:7100"), NodeAddress::new("10.0.0.1", 7100));
        assert_eq!(addr("[::1]:80"), NodeAddress::new("::1", 80));
        assert_eq!(NodeAddress::new("::1", 80).to_string(), "[::1]:80");
        for bad in ["", "host", ":80", "host:port", "host:70000", "[::1]80"] {
            assert!(bad.parse::<NodeAddress>().is_err(), "{bad}");
        }
    }

    #[test]
    fn test_identity() {
        let remapper = ClusterAddressRemapper::build(&RemapInfo::Identity, []).unwrap();
        assert!(remapper.is_identity());
        assert_eq!(remapper.apply(&addr("a:1")), addr("a:1"));
    }

    #[test]
    fn test_substitute_with_condition() {
        let info = RemapInfo::substitute()
            .with_host("10.0.0.1", "gateway")
            .with_port(7100, 17100)
            .with_condition(RemapCondition::HostPrefix("10.".into()));
        let remapper = ClusterAddressRemapper::build(&info, []).unwrap();
        assert_eq!(remapper.apply(&addr("10.0.0.1:7100")), addr("gateway:17100"));
        assert_eq!(remapper.apply(&addr("10.0.0.2:7200")), addr("10.0.0.2:7200"));
        assert_eq!(remapper.apply(&addr("192.168.0.1:7100")), addr("192.168.0.1:7100"));
    }

    #[test]
    fn test_default_port() {
        let info = RemapInfo::Identity.with_default_port(9000).with_port(1, 2);
        let remapper = ClusterAddressRemapper::build(&info, []).unwrap();
        assert_eq!(remapper.apply(&addr("h:1")), addr("h:2"));
        assert_eq!(remapper.apply(&addr("h:5")), addr("h:9000"));
    }

    #[test]
    fn test_sequential_in_first_seen_order() {
        let nodes = [addr("n2:7100"), addr("n1:7100"), addr("n2:7101")];
        let info = RemapInfo::sequential(Ipv4Addr::new(172, 16, 0, 254), 2).with_default_port(9999);
        let remapper = ClusterAddressRemapper::build(&info, &nodes).unwrap();
        assert_eq!(remapper.apply(&nodes[0]), addr("172.16.0.254:9999"));
        assert_eq!(remapper.apply(&nodes[1]), addr("172.16.0.255:9999"));
        assert_eq!(remapper.apply(&nodes[2]), addr("172.16.0.254:9999"));
        // Unknown hosts pass through
        assert_eq!(remapper.apply(&addr("n3:1")).host, "n3");
    }

    #[test]
    fn test_sequential_errors() {
        let nodes = [addr("a:1"), addr("b:1")];
        let err = ClusterAddressRemapper::build(&RemapInfo::sequential(Ipv4Addr::new(10, 0, 0, 1), 3), &nodes)
            .unwrap_err();
        assert!(matches!(err, ResolutionError::Remap(_)));

        let err = ClusterAddressRemapper::build(
            &RemapInfo::sequential(Ipv4Addr::new(255, 255, 255, 255), 2),
            &nodes,
        )
        .unwrap_err();
        assert!(matches!(err, ResolutionError::Remap(_)));
    }
}
