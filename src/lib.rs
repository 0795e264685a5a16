//! Labscan - Concurrent Network Scan Engine
//!
//! This library discovers live hosts, probes their TCP ports, identifies the
//! services behind open ports, matches them against a static vulnerability
//! rule table and runs pluggable checks against what it found.
//!
//! # Warning
//! This tool is designed for ethical security assessment of networks you own
//! or are authorized to test. Users are responsible for obtaining permission
//! before scanning any networks or systems.

pub mod checks;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod display;
pub mod error;
pub mod executor;
pub mod pipeline;
pub mod plugin;
pub mod port_scan;
pub mod reporting;
pub mod service;
pub mod utils;
pub mod vuln;

pub use error::{Result, ScanError};

/// Common types shared by every scan stage
pub mod types {
    use crate::{Result, ScanError};
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};
    use std::collections::BTreeSet;
    use std::fmt;
    use std::io;
    use std::str::FromStr;
    use uuid::Uuid;

    /// Host identifier: IP literal or resolvable name.
    #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct Target(String);

    impl Target {
        pub fn new(host: impl Into<String>) -> Result<Self> {
            let host = host.into();
            let trimmed = host.trim();
            if trimmed.is_empty() {
                return Err(ScanError::InvalidTarget("target cannot be empty".to_string()));
            }
            if trimmed.chars().any(char::is_whitespace) {
                return Err(ScanError::InvalidTarget(format!("target contains whitespace: {}", trimmed)));
            }
            Ok(Self(trimmed.to_string()))
        }

        pub fn as_str(&self) -> &str {
            &self.0
        }
    }

    impl fmt::Display for Target {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(&self.0)
        }
    }

    impl FromStr for Target {
        type Err = ScanError;

        fn from_str(s: &str) -> Result<Self> {
            Target::new(s)
        }
    }

    /// Validated, ascending, duplicate-free set of TCP ports.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct PortSet(Vec<u16>);

    impl PortSet {
        pub fn new(ports: impl IntoIterator<Item = u16>) -> Result<Self> {
            let mut unique = BTreeSet::new();
            for port in ports {
                if port == 0 {
                    return Err(ScanError::InvalidPorts("port 0 is not scannable".to_string()));
                }
                unique.insert(port);
            }

            if unique.is_empty() {
                return Err(ScanError::InvalidPorts("no ports given".to_string()));
            }

            Ok(Self(unique.into_iter().collect()))
        }

        /// Parse expressions like `1-1024`, `22,80,443` or `20-25,8080`.
        pub fn parse(spec: &str) -> Result<Self> {
            let mut ports = Vec::new();

            for part in spec.split(',').map(str::trim) {
                if part.is_empty() {
                    return Err(ScanError::InvalidPorts(format!("empty entry in '{}'", spec)));
                }

                if let Some((start, end)) = part.split_once('-') {
                    let start: u16 = start.trim().parse()
                        .map_err(|_| ScanError::InvalidPorts(format!("Invalid start port: {}", start)))?;
                    let end: u16 = end.trim().parse()
                        .map_err(|_| ScanError::InvalidPorts(format!("Invalid end port: {}", end)))?;

                    if start > end {
                        return Err(ScanError::InvalidPorts(format!(
                            "Start port cannot be greater than end port: {}", part
                        )));
                    }

                    ports.extend(start..=end);
                } else {
                    let port: u16 = part.parse()
                        .map_err(|_| ScanError::InvalidPorts(format!("Invalid port: {}", part)))?;
                    ports.push(port);
                }
            }

            Self::new(ports)
        }

        pub fn len(&self) -> usize {
            self.0.len()
        }

        pub fn is_empty(&self) -> bool {
            self.0.is_empty()
        }

        pub fn as_slice(&self) -> &[u16] {
            &self.0
        }

        pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
            self.0.iter().copied()
        }
    }

    impl FromStr for PortSet {
        type Err = ScanError;

        fn from_str(s: &str) -> Result<Self> {
            PortSet::parse(s)
        }
    }

    /// Why a single probe did not reach its item.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum ProbeError {
        Refused,
        TimedOut,
        Unreachable,
        Other(String),
    }

    impl From<&io::Error> for ProbeError {
        fn from(err: &io::Error) -> Self {
            match err.kind() {
                io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset => ProbeError::Refused,
                io::ErrorKind::TimedOut => ProbeError::TimedOut,
                _ => {
                    let message = err.to_string();
                    if message.to_lowercase().contains("unreachable") {
                        ProbeError::Unreachable
                    } else {
                        ProbeError::Other(message)
                    }
                }
            }
        }
    }

    impl fmt::Display for ProbeError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                ProbeError::Refused => f.write_str("connection refused"),
                ProbeError::TimedOut => f.write_str("timed out"),
                ProbeError::Unreachable => f.write_str("unreachable"),
                ProbeError::Other(message) => f.write_str(message),
            }
        }
    }

    /// Result of probing one work item. Exactly one exists per input item.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ProbeOutcome<T> {
        pub item: T,
        pub reached: bool,
        pub error: Option<ProbeError>,
    }

    impl<T> ProbeOutcome<T> {
        pub fn reached(item: T) -> Self {
            Self { item, reached: true, error: None }
        }

        pub fn silent(item: T) -> Self {
            Self { item, reached: false, error: None }
        }

        pub fn failed(item: T, error: ProbeError) -> Self {
            Self { item, reached: false, error: Some(error) }
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum ScanStatus {
        Completed,
        Unresolved,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct ScanResult {
        pub target: String,
        pub total_ports_scanned: usize,
        pub open_ports: Vec<u16>,
        pub closed_ports: usize,
        pub status: ScanStatus,
    }

    impl ScanResult {
        pub fn completed(target: &Target, ports: &PortSet, mut open_ports: Vec<u16>) -> Self {
            open_ports.sort_unstable();
            open_ports.dedup();
            Self {
                target: target.to_string(),
                total_ports_scanned: ports.len(),
                closed_ports: ports.len().saturating_sub(open_ports.len()),
                open_ports,
                status: ScanStatus::Completed,
            }
        }

        /// Every port is reported as not reached because the name never resolved.
        pub fn unresolved(target: &Target, ports: &PortSet) -> Self {
            Self {
                target: target.to_string(),
                total_ports_scanned: ports.len(),
                open_ports: Vec::new(),
                closed_ports: ports.len(),
                status: ScanStatus::Unresolved,
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ServiceRecord {
        pub port: u16,
        pub service: String,
        pub banner: String,
        pub status: String,
    }

    /// Serialized as "Critical", "High", ...; parsed case-insensitively.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
    pub enum Severity {
        Info,
        Low,
        Medium,
        High,
        Critical,
    }

    impl Severity {
        pub fn score(self) -> f64 {
            match self {
                Severity::Critical => 9.0,
                Severity::High => 7.0,
                Severity::Medium => 5.0,
                Severity::Low => 3.0,
                Severity::Info => 0.1,
            }
        }

        pub fn as_str(self) -> &'static str {
            match self {
                Severity::Critical => "Critical",
                Severity::High => "High",
                Severity::Medium => "Medium",
                Severity::Low => "Low",
                Severity::Info => "Info",
            }
        }
    }

    impl Default for Severity {
        fn default() -> Self {
            Severity::Info
        }
    }

    impl fmt::Display for Severity {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.as_str())
        }
    }

    impl FromStr for Severity {
        type Err = ScanError;

        fn from_str(s: &str) -> Result<Self> {
            match s.trim().to_lowercase().as_str() {
                "critical" => Ok(Severity::Critical),
                "high" => Ok(Severity::High),
                "medium" => Ok(Severity::Medium),
                "low" => Ok(Severity::Low),
                "info" => Ok(Severity::Info),
                other => Err(ScanError::InvalidInput(format!("unknown severity: {}", other))),
            }
        }
    }

    impl<'de> Deserialize<'de> for Severity {
        fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
        where
            D: serde::Deserializer<'de>,
        {
            let label = String::deserialize(deserializer)?;
            label.parse().map_err(serde::de::Error::custom)
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct VulnerabilityFinding {
        pub name: String,
        pub severity: Severity,
        pub description: String,
        pub port: u16,
        pub cve: Option<String>,
        pub score: f64,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub enum RiskLevel {
        Low,
        Medium,
        High,
        Critical,
    }

    impl RiskLevel {
        pub fn from_average(average: f64) -> Self {
            if average >= 8.0 {
                RiskLevel::Critical
            } else if average >= 6.0 {
                RiskLevel::High
            } else if average >= 4.0 {
                RiskLevel::Medium
            } else {
                RiskLevel::Low
            }
        }
    }

    impl fmt::Display for RiskLevel {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let label = match self {
                RiskLevel::Low => "Low",
                RiskLevel::Medium => "Medium",
                RiskLevel::High => "High",
                RiskLevel::Critical => "Critical",
            };
            f.write_str(label)
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct RiskReport {
        pub target: String,
        pub vulnerability_count: usize,
        pub vulnerabilities: Vec<VulnerabilityFinding>,
        pub overall_risk_level: RiskLevel,
        pub average_risk_score: f64,
        pub max_risk_score: f64,
    }

    /// How a plugin invocation ended.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum PluginState {
        Completed,
        Failed,
        NotFound,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct PluginResult {
        pub plugin: String,
        pub target: String,
        pub port: u16,
        pub service: String,
        pub vulnerable: bool,
        pub status: String,
        pub state: PluginState,
        pub details: Option<serde_json::Value>,
    }

    impl PluginResult {
        pub fn safe(plugin: &str, target: &str, port: u16, service: &str, status: impl Into<String>) -> Self {
            Self {
                plugin: plugin.to_string(),
                target: target.to_string(),
                port,
                service: service.to_string(),
                vulnerable: false,
                status: status.into(),
                state: PluginState::Completed,
                details: None,
            }
        }

        pub fn vulnerable(plugin: &str, target: &str, port: u16, service: &str, status: impl Into<String>) -> Self {
            Self {
                vulnerable: true,
                ..Self::safe(plugin, target, port, service, status)
            }
        }

        pub fn error(plugin: &str, target: &str, port: u16, service: &str, status: impl Into<String>) -> Self {
            Self {
                state: PluginState::Failed,
                ..Self::safe(plugin, target, port, service, status)
            }
        }

        pub fn not_found(plugin: &str, target: &str, port: u16, service: &str) -> Self {
            Self {
                state: PluginState::NotFound,
                ..Self::safe(plugin, target, port, service, format!("Plugin not found: {}", plugin))
            }
        }

        pub fn with_details(mut self, details: serde_json::Value) -> Self {
            self.details = Some(details);
            self
        }

        pub fn is_error(&self) -> bool {
            self.state != PluginState::Completed
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
    #[serde(rename_all = "lowercase")]
    pub enum ScanType {
        /// Port scan only
        Port,
        /// Port scan plus service detection
        Service,
        /// Everything: services, vulnerability rules and plugins
        Full,
    }

    impl fmt::Display for ScanType {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let label = match self {
                ScanType::Port => "port",
                ScanType::Service => "service",
                ScanType::Full => "full",
            };
            f.write_str(label)
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct FullScanReport {
        pub id: Uuid,
        pub target: String,
        pub scan_type: ScanType,
        pub started_at: DateTime<Utc>,
        pub finished_at: DateTime<Utc>,
        pub scan: ScanResult,
        pub services: Vec<ServiceRecord>,
        pub os_guess: Option<String>,
        pub risk: Option<RiskReport>,
        pub plugin_results: Vec<PluginResult>,
    }

}
