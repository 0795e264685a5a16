use crate::config::Config;
use crate::executor::TaskExecutor;
use crate::types::{PortSet, ProbeError, ProbeOutcome, ScanResult, Target};
use crate::{Result, ScanError};
use log::{debug, info};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;

/// TCP connect scanner for a single target.
pub struct PortScanner {
    executor: TaskExecutor,
}

impl PortScanner {
    pub fn new(concurrency: usize, timeout: Duration) -> Self {
        Self {
            executor: TaskExecutor::new(concurrency, timeout),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.scan.threads, config.scan_timeout())
    }

    /// Scan every port in `ports` on `target`.
    ///
    /// The target is resolved once up front, bounded by the probe timeout; a
    /// name that does not resolve aborts the scan with [`ScanError::Resolution`]
    /// before any port is probed.
    pub async fn scan(&self, target: &Target, ports: &PortSet) -> Result<ScanResult> {
        let ip = resolve_target(target, self.executor.timeout()).await?;

        info!(
            "Starting scan on {} ({} ports, {} workers)",
            target,
            ports.len(),
            self.executor.effective_limit(ports.len())
        );

        let outcomes = self
            .executor
            .run(ports.as_slice(), |port| probe_port(ip, port))
            .await;

        let mut open_ports = Vec::new();
        for outcome in outcomes {
            if outcome.reached {
                open_ports.push(outcome.item);
            } else if let Some(error) = outcome.error {
                debug!("Port {}:{} closed ({})", ip, outcome.item, error);
            }
        }

        let result = ScanResult::completed(target, ports, open_ports);
        info!("Scan completed: {} open ports found on {}", result.open_ports.len(), target);
        Ok(result)
    }
}

/// TCP connect probe; the caller bounds its duration.
pub async fn probe_port(ip: IpAddr, port: u16) -> ProbeOutcome<u16> {
    let addr = SocketAddr::new(ip, port);
    match TcpStream::connect(addr).await {
        Ok(_) => {
            info!("Port {} open on {}", port, ip);
            ProbeOutcome::reached(port)
        }
        Err(e) => ProbeOutcome::failed(port, ProbeError::from(&e)),
    }
}

/// Resolve a target to one address, preferring IPv4 results.
pub async fn resolve_target(target: &Target, limit: Duration) -> Result<IpAddr> {
    if let Ok(ip) = target.as_str().parse::<IpAddr>() {
        return Ok(ip);
    }

    let resolution_error = |reason: String| ScanError::Resolution {
        target: target.to_string(),
        reason,
    };

    let addrs: Vec<SocketAddr> = timeout(limit, lookup_host((target.as_str(), 0)))
        .await
        .map_err(|_| resolution_error("timed out".to_string()))?
        .map_err(|e| resolution_error(e.to_string()))?
        .collect();

    addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addrs.first())
        .map(|addr| addr.ip())
        .ok_or_else(|| resolution_error("no addresses returned".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn finds_listening_port_and_counts_the_rest_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open = listener.local_addr().unwrap().port();

        let closed = {
            let temp = TcpListener::bind("127.0.0.1:0").await.unwrap();
            temp.local_addr().unwrap().port()
        };

        let target = Target::new("127.0.0.1").unwrap();
        let ports = PortSet::new([open, closed]).unwrap();
        let scanner = PortScanner::new(10, Duration::from_millis(500));

        let result = scanner.scan(&target, &ports).await.unwrap();
        assert_eq!(result.open_ports, vec![open]);
        assert_eq!(result.closed_ports, 1);
        assert_eq!(result.total_ports_scanned, 2);
    }

    #[tokio::test]
    async fn literal_address_skips_resolution() {
        let target = Target::new("10.1.2.3").unwrap();
        let ip = resolve_target(&target, Duration::ZERO).await.unwrap();
        assert_eq!(ip, IpAddr::V4(Ipv4Addr::new(10, 1, 2, 3)));
    }

    #[tokio::test]
    async fn slow_lookup_is_a_resolution_timeout() {
        // Name lookups run on the blocking pool, so a zero budget elapses first.
        let target = Target::new("localhost").unwrap();
        match resolve_target(&target, Duration::ZERO).await {
            Err(ScanError::Resolution { target, reason }) => {
                assert_eq!(target, "localhost");
                assert_eq!(reason, "timed out");
            }
            other => panic!("expected resolution timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unresolvable_name_is_scan_level_error() {
        let target = Target::new("no-such-host.invalid").unwrap();
        let ports = PortSet::parse("22,80").unwrap();
        let scanner = PortScanner::new(4, Duration::from_millis(200));

        let err = scanner.scan(&target, &ports).await.unwrap_err();
        assert!(matches!(err, ScanError::Resolution { .. }));
    }
}
