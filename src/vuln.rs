//! Static vulnerability rules and risk aggregation.
//!
//! Findings are a pure function of `(service, port, banner)`: the same input
//! always produces the same findings in the same order, so a report built from
//! a fixed service list is deterministic.

use crate::types::{RiskLevel, RiskReport, ServiceRecord, Severity, VulnerabilityFinding};
use log::{debug, warn};
use std::str::FromStr;

struct VulnRule {
    /// Lowercase service names this rule applies to.
    services: &'static [&'static str],
    /// Substring the banner must contain, when set.
    banner_signature: Option<&'static str>,
    name: &'static str,
    severity: Severity,
    describe: fn(service: &str, banner: &str) -> String,
}

fn anonymous_ftp(_: &str, _: &str) -> String {
    "FTP server may allow anonymous login".to_string()
}

fn ssh_version(_: &str, banner: &str) -> String {
    let excerpt: String = banner.chars().take(50).collect();
    format!("SSH service running: {}", excerpt)
}

fn plain_http(_: &str, _: &str) -> String {
    "Service running on unencrypted HTTP instead of HTTPS".to_string()
}

fn exposed_smb(_: &str, _: &str) -> String {
    "Windows File Sharing (SMB) is exposed to network".to_string()
}

fn exposed_rdp(_: &str, _: &str) -> String {
    "Remote Desktop Protocol publicly accessible".to_string()
}

fn exposed_database(service: &str, _: &str) -> String {
    format!("{} database exposed to network", service)
}

static RULES: &[VulnRule] = &[
    VulnRule {
        services: &["ftp", "vsftpd"],
        banner_signature: None,
        name: "Anonymous FTP Access",
        severity: Severity::Medium,
        describe: anonymous_ftp,
    },
    VulnRule {
        services: &["ssh"],
        banner_signature: Some("OpenSSH"),
        name: "SSH Service Detected",
        severity: Severity::Info,
        describe: ssh_version,
    },
    VulnRule {
        services: &["http", "http-alt"],
        banner_signature: None,
        name: "Unencrypted HTTP",
        severity: Severity::Medium,
        describe: plain_http,
    },
    VulnRule {
        services: &["smb"],
        banner_signature: None,
        name: "SMB Service Exposed",
        severity: Severity::High,
        describe: exposed_smb,
    },
    VulnRule {
        services: &["rdp"],
        banner_signature: None,
        name: "RDP Service Exposed",
        severity: Severity::High,
        describe: exposed_rdp,
    },
    VulnRule {
        services: &["mysql", "postgresql"],
        banner_signature: None,
        name: "Database Service Exposed",
        severity: Severity::Critical,
        describe: exposed_database,
    },
];

impl VulnRule {
    fn matches(&self, service: &str, banner: &str) -> bool {
        self.services.contains(&service)
            && self.banner_signature.map_or(true, |sig| banner.contains(sig))
    }
}

/// Findings for one detected service. Service names match case-insensitively.
pub fn identify(service: &str, port: u16, banner: &str) -> Vec<VulnerabilityFinding> {
    let normalized = service.to_lowercase();

    RULES
        .iter()
        .filter(|rule| rule.matches(&normalized, banner))
        .map(|rule| VulnerabilityFinding {
            name: rule.name.to_string(),
            severity: rule.severity,
            description: (rule.describe)(service, banner),
            port,
            cve: None,
            score: rule.severity.score(),
        })
        .collect()
}

/// Numeric weight of a severity label; unknown labels weigh 0.0.
pub fn score(severity: &str) -> f64 {
    match Severity::from_str(severity) {
        Ok(severity) => severity.score(),
        Err(_) => {
            warn!("Unknown severity '{}' scored as 0.0", severity);
            0.0
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Aggregate findings over every service into one report.
pub fn generate_report(target: &str, services: &[ServiceRecord]) -> RiskReport {
    let mut findings: Vec<VulnerabilityFinding> = services
        .iter()
        .flat_map(|s| identify(&s.service, s.port, &s.banner))
        .collect();

    let (average, max) = if findings.is_empty() {
        (0.0, 0.0)
    } else {
        let total: f64 = findings.iter().map(|f| f.score).sum();
        let max = findings.iter().map(|f| f.score).fold(f64::MIN, f64::max);
        (total / findings.len() as f64, max)
    };

    // Stable: equal scores keep discovery order.
    findings.sort_by(|a, b| b.score.total_cmp(&a.score));

    debug!("{} findings for {}, average score {:.2}", findings.len(), target, average);

    RiskReport {
        target: target.to_string(),
        vulnerability_count: findings.len(),
        vulnerabilities: findings,
        overall_risk_level: RiskLevel::from_average(average),
        average_risk_score: round2(average),
        max_risk_score: round2(max),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(port: u16, name: &str, banner: &str) -> ServiceRecord {
        ServiceRecord {
            port,
            service: name.to_string(),
            banner: banner.to_string(),
            status: "open".to_string(),
        }
    }

    #[test]
    fn severity_scores() {
        assert_eq!(score("Critical"), 9.0);
        assert_eq!(score("High"), 7.0);
        assert_eq!(score("Medium"), 5.0);
        assert_eq!(score("Low"), 3.0);
        assert_eq!(score("Info"), 0.1);
        assert_eq!(score("Unknown-severity"), 0.0);
    }

    #[test]
    fn http_is_always_flagged_unencrypted() {
        let findings = identify("HTTP", 80, "");
        assert!(findings
            .iter()
            .any(|f| f.name == "Unencrypted HTTP" && f.severity == Severity::Medium));

        let alt = identify("http-alt", 8080, "HTTP/1.1 200 OK");
        assert_eq!(alt.len(), 1);
        assert_eq!(alt[0].port, 8080);
    }

    #[test]
    fn databases_are_critical() {
        let findings = identify("MySQL", 3306, "");
        assert!(findings.iter().any(|f| f.severity == Severity::Critical));
        assert_eq!(findings[0].description, "MySQL database exposed to network");
        assert!(identify("PostgreSQL", 5432, "N/A").iter().any(|f| f.score == 9.0));
    }

    #[test]
    fn ssh_needs_openssh_signature() {
        assert!(identify("SSH", 22, "N/A").is_empty());

        let findings = identify("SSH", 22, "SSH-2.0-OpenSSH_7.4");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Info);
        assert!(findings[0].description.contains("OpenSSH_7.4"));
    }

    #[test]
    fn unknown_service_has_no_findings() {
        assert!(identify("Unknown", 31337, "hello").is_empty());
    }

    #[test]
    fn empty_report_is_low_risk() {
        let report = generate_report("10.0.0.1", &[]);
        assert_eq!(report.vulnerability_count, 0);
        assert_eq!(report.overall_risk_level, RiskLevel::Low);
        assert_eq!(report.average_risk_score, 0.0);
        assert_eq!(report.max_risk_score, 0.0);
    }

    #[test]
    fn report_sorts_by_score_and_keeps_ties_in_order() {
        let services = vec![
            service(21, "FTP", "220 vsFTPd"),
            service(80, "HTTP", "N/A"),
            service(3306, "MySQL", "N/A"),
            service(445, "SMB", "N/A"),
        ];
        let report = generate_report("10.0.0.1", &services);

        let order: Vec<(&str, u16)> = report
            .vulnerabilities
            .iter()
            .map(|f| (f.name.as_str(), f.port))
            .collect();
        assert_eq!(
            order,
            vec![
                ("Database Service Exposed", 3306),
                ("SMB Service Exposed", 445),
                ("Anonymous FTP Access", 21),
                ("Unencrypted HTTP", 80),
            ]
        );
        // (5 + 5 + 9 + 7) / 4 = 6.5
        assert_eq!(report.average_risk_score, 6.5);
        assert_eq!(report.max_risk_score, 9.0);
        assert_eq!(report.overall_risk_level, RiskLevel::High);
    }

    #[test]
    fn average_is_rounded_to_two_decimals() {
        let services = vec![
            service(22, "SSH", "SSH-2.0-OpenSSH_9.0"),
            service(80, "HTTP", "N/A"),
            service(8080, "HTTP-Alt", "N/A"),
        ];
        let report = generate_report("host", &services);
        // (0.1 + 5 + 5) / 3 = 3.3666..
        assert_eq!(report.average_risk_score, 3.37);
        assert_eq!(report.overall_risk_level, RiskLevel::Low);
    }
}
