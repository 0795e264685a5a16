use crate::config::{OutputFormat, ReportingConfig};
use crate::types::FullScanReport;
use crate::{Result, ScanError};
use log::{debug, info};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;

/// One CSV line: a finding, a plugin hit, or an open service with neither.
#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    target: &'a str,
    port: u16,
    service: &'a str,
    kind: &'static str,
    name: &'a str,
    severity: &'a str,
    score: Option<f64>,
    detail: &'a str,
}

pub struct ReportGenerator {
    config: ReportingConfig,
}

impl ReportGenerator {
    pub fn new(config: ReportingConfig) -> Self {
        Self { config }
    }

    /// Write the report in every configured format. Returns the written paths.
    pub async fn generate_report(&self, report: &FullScanReport) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(&self.config.output_dir)
            .await
            .map_err(|e| ScanError::Reporting(format!("Failed to create output directory: {}", e)))?;

        let timestamp = report.started_at.format("%Y%m%d_%H%M%S");
        let base_filename = format!("labscan_{}_{}", sanitize(&report.target), timestamp);

        let mut generated_files = Vec::new();
        for format in &self.config.formats {
            let path = match format {
                OutputFormat::Json => {
                    let path = self.config.output_dir.join(format!("{}.json", base_filename));
                    write_json(report, &path).await?;
                    path
                }
                OutputFormat::Csv => {
                    let path = self.config.output_dir.join(format!("{}.csv", base_filename));
                    write_csv(report, &path).await?;
                    path
                }
            };
            generated_files.push(path);
        }

        info!("Generated {} report files", generated_files.len());
        Ok(generated_files)
    }
}

/// Pretty-printed JSON of any serializable result.
pub async fn write_json<T: Serialize + ?Sized>(value: &T, path: &Path) -> Result<()> {
    debug!("Writing JSON report: {}", path.display());

    let json_data = serde_json::to_string_pretty(value)?;
    fs::write(path, json_data)
        .await
        .map_err(|e| ScanError::Reporting(format!("Failed to write JSON report: {}", e)))
}

pub async fn write_csv(report: &FullScanReport, path: &Path) -> Result<()> {
    debug!("Writing CSV report: {}", path.display());

    let data = render_csv(report)?;
    fs::write(path, data)
        .await
        .map_err(|e| ScanError::Reporting(format!("Failed to write CSV report: {}", e)))
}

fn render_csv(report: &FullScanReport) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    for service in &report.services {
        let findings: Vec<_> = report
            .risk
            .iter()
            .flat_map(|risk| risk.vulnerabilities.iter())
            .filter(|f| f.port == service.port)
            .collect();
        let hits: Vec<_> = report
            .plugin_results
            .iter()
            .filter(|r| r.port == service.port && r.vulnerable)
            .collect();

        for finding in &findings {
            writer.serialize(CsvRow {
                target: &report.target,
                port: service.port,
                service: &service.service,
                kind: "finding",
                name: &finding.name,
                severity: finding.severity.as_str(),
                score: Some(finding.score),
                detail: &finding.description,
            })?;
        }

        for hit in &hits {
            writer.serialize(CsvRow {
                target: &report.target,
                port: service.port,
                service: &service.service,
                kind: "plugin",
                name: &hit.plugin,
                severity: "",
                score: None,
                detail: &hit.status,
            })?;
        }

        if findings.is_empty() && hits.is_empty() {
            writer.serialize(CsvRow {
                target: &report.target,
                port: service.port,
                service: &service.service,
                kind: "service",
                name: "",
                severity: "",
                score: None,
                detail: &service.banner,
            })?;
        }
    }

    // Port-only scans carry no service records.
    if report.services.is_empty() {
        for &port in &report.scan.open_ports {
            writer.serialize(CsvRow {
                target: &report.target,
                port,
                service: "",
                kind: "port",
                name: "",
                severity: "",
                score: None,
                detail: "open",
            })?;
        }
    }

    writer
        .into_inner()
        .map_err(|e| ScanError::Reporting(format!("Failed to flush CSV report: {}", e)))
}

fn sanitize(target: &str) -> String {
    target
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PortSet, ScanResult, ScanType, ServiceRecord, Target};
    use crate::vuln;
    use chrono::Utc;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn sample_report() -> FullScanReport {
        let target = Target::new("10.0.0.5").unwrap();
        let ports = PortSet::parse("22,80,3306").unwrap();
        let services = vec![
            ServiceRecord {
                port: 22,
                service: "SSH".to_string(),
                banner: "SSH-2.0-Dropbear".to_string(),
                status: "open".to_string(),
            },
            ServiceRecord {
                port: 3306,
                service: "MySQL".to_string(),
                banner: "N/A".to_string(),
                status: "open".to_string(),
            },
        ];

        FullScanReport {
            id: Uuid::new_v4(),
            target: target.to_string(),
            scan_type: ScanType::Full,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            scan: ScanResult::completed(&target, &ports, vec![22, 3306]),
            risk: Some(vuln::generate_report(target.as_str(), &services)),
            services,
            os_guess: Some("Linux/Unix".to_string()),
            plugin_results: Vec::new(),
        }
    }

    #[test]
    fn csv_has_one_row_per_finding_or_bare_service() {
        let data = render_csv(&sample_report()).unwrap();
        let text = String::from_utf8(data).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "target,port,service,kind,name,severity,score,detail");
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("10.0.0.5,22,SSH,service,"));
        assert!(lines[2].contains("Database Service Exposed"));
        assert!(lines[2].contains("Critical"));
    }

    #[tokio::test]
    async fn writes_every_configured_format() {
        let dir = TempDir::new().unwrap();
        let generator = ReportGenerator::new(ReportingConfig {
            output_dir: dir.path().join("out"),
            formats: vec![OutputFormat::Json, OutputFormat::Csv],
        });

        let report = sample_report();
        let files = generator.generate_report(&report).await.unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.exists()));

        let json = std::fs::read_to_string(&files[0]).unwrap();
        let parsed: FullScanReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, report.id);
        assert_eq!(parsed.scan.open_ports, vec![22, 3306]);
    }
}
