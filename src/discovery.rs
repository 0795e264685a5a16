use crate::config::Config;
use crate::executor::TaskExecutor;
use crate::types::ProbeOutcome;
use crate::{Result, ScanError};
use log::{debug, info};
use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Ports tried in order when deciding whether a host is alive.
pub const DEFAULT_PROBE_PORTS: [u16; 8] = [22, 80, 443, 3306, 5432, 8080, 25, 53];

/// Largest range expanded unless configured otherwise.
pub const DEFAULT_MAX_HOSTS: usize = 65_536;

pub struct HostDiscovery {
    concurrency: usize,
    timeout: Duration,
    probe_ports: Vec<u16>,
    max_hosts: usize,
}

impl HostDiscovery {
    pub fn new(concurrency: usize, timeout: Duration) -> Self {
        Self {
            concurrency,
            timeout,
            probe_ports: DEFAULT_PROBE_PORTS.to_vec(),
            max_hosts: DEFAULT_MAX_HOSTS,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let mut discovery = Self::new(config.discovery.threads, config.discovery_timeout());
        if !config.discovery.probe_ports.is_empty() {
            discovery.probe_ports = config.discovery.probe_ports.clone();
        }
        discovery.max_hosts = config.discovery.max_hosts;
        discovery
    }

    pub fn with_probe_ports(mut self, ports: Vec<u16>) -> Self {
        self.probe_ports = ports;
        self
    }

    pub fn with_max_hosts(mut self, max_hosts: usize) -> Self {
        self.max_hosts = max_hosts;
        self
    }

    /// Time allowed per host: each operation may walk the whole probe list.
    pub fn host_budget(&self) -> Duration {
        let ports = u32::try_from(self.probe_ports.len().max(1)).unwrap_or(u32::MAX);
        self.timeout.saturating_mul(ports)
    }

    /// Discover live hosts in a CIDR range, returned sorted and deduplicated.
    pub async fn discover(&self, cidr: &str) -> Result<Vec<IpAddr>> {
        let hosts = expand_cidr(cidr, self.max_hosts)?;
        info!("Scanning {} hosts on {}", hosts.len(), cidr);

        let executor = TaskExecutor::new(self.concurrency, self.host_budget());
        let probe_ports = self.probe_ports.as_slice();
        let per_port = self.timeout;

        let outcomes = executor
            .run(&hosts, |ip| probe_host(ip, probe_ports, per_port))
            .await;

        let alive: BTreeSet<IpAddr> = outcomes
            .into_iter()
            .filter(|outcome| outcome.reached)
            .map(|outcome| outcome.item)
            .collect();

        info!("Discovered {} live hosts on {}", alive.len(), cidr);
        Ok(alive.into_iter().collect())
    }
}

/// Try each probe port in order and stop at the first accepted connection.
pub async fn probe_host(ip: IpAddr, ports: &[u16], per_port: Duration) -> ProbeOutcome<IpAddr> {
    for &port in ports {
        let addr = SocketAddr::new(ip, port);
        match timeout(per_port, TcpStream::connect(addr)).await {
            Ok(Ok(_)) => {
                info!("Found active host: {} (TCP:{})", ip, port);
                return ProbeOutcome::reached(ip);
            }
            _ => continue,
        }
    }

    debug!("Host {} appears to be down", ip);
    ProbeOutcome::silent(ip)
}

/// Expand CIDR notation into its usable host addresses.
///
/// Network and broadcast addresses are excluded. A /31 (or /127) yields both
/// addresses and a /32 (or /128) yields the single address. Host bits in the
/// base address are ignored.
pub fn expand_cidr(cidr: &str, max_hosts: usize) -> Result<Vec<IpAddr>> {
    let (base, prefix) = cidr
        .trim()
        .split_once('/')
        .ok_or_else(|| ScanError::InvalidCidr(format!("missing prefix length: {}", cidr)))?;

    let base: IpAddr = base
        .parse()
        .map_err(|_| ScanError::InvalidCidr(format!("Invalid IP in CIDR: {}", base)))?;
    let prefix: u8 = prefix
        .parse()
        .map_err(|_| ScanError::InvalidCidr(format!("Invalid prefix length: {}", prefix)))?;

    match base {
        IpAddr::V4(ip) => expand_v4(ip, prefix, max_hosts),
        IpAddr::V6(ip) => expand_v6(ip, prefix, max_hosts),
    }
}

fn expand_v4(ip: Ipv4Addr, prefix: u8, max_hosts: usize) -> Result<Vec<IpAddr>> {
    if prefix > 32 {
        return Err(ScanError::InvalidCidr("Prefix length cannot exceed 32".to_string()));
    }

    let host_bits = 32 - u32::from(prefix);
    let mask = if host_bits == 32 { 0 } else { u32::MAX << host_bits };
    let network = u64::from(u32::from(ip) & mask);
    let broadcast = network + (1u64 << host_bits) - 1;

    let (first, last) = match prefix {
        32 | 31 => (network, broadcast),
        _ => (network + 1, broadcast - 1),
    };

    check_size(last - first + 1, max_hosts)?;
    Ok((first..=last)
        .map(|n| IpAddr::V4(Ipv4Addr::from(n as u32)))
        .collect())
}

fn expand_v6(ip: Ipv6Addr, prefix: u8, max_hosts: usize) -> Result<Vec<IpAddr>> {
    if prefix > 128 {
        return Err(ScanError::InvalidCidr("Prefix length cannot exceed 128".to_string()));
    }

    let host_bits = 128 - u32::from(prefix);
    if host_bits >= 64 {
        return Err(ScanError::InvalidCidr(format!(
            "Range /{} is larger than the {} host limit", prefix, max_hosts
        )));
    }

    let mask = if host_bits == 0 { u128::MAX } else { u128::MAX << host_bits };
    let network = u128::from(ip) & mask;
    let last = network | ((1u128 << host_bits) - 1);

    // Only the subnet-router anycast (network) address is excluded for IPv6.
    let first = match prefix {
        128 | 127 => network,
        _ => network + 1,
    };

    check_size((last - first) as u64 + 1, max_hosts)?;
    Ok((first..=last).map(|n| IpAddr::V6(Ipv6Addr::from(n))).collect())
}

fn check_size(count: u64, max_hosts: usize) -> Result<()> {
    if count > max_hosts as u64 {
        return Err(ScanError::InvalidCidr(format!(
            "Range holds {} hosts, more than the {} host limit", count, max_hosts
        )));
    }
    Ok(())
}
