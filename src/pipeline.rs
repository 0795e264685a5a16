use crate::config::Config;
use crate::plugin::PluginRegistry;
use crate::port_scan::PortScanner;
use crate::service::{self, ServiceDetector};
use crate::types::{FullScanReport, PortSet, ScanResult, ScanStatus, ScanType, Target};
use crate::vuln;
use crate::{Result, ScanError};
use chrono::Utc;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of one target in a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchEntry {
    pub target: String,
    pub report: Option<FullScanReport>,
    pub error: Option<String>,
}

/// Runs port scan, service detection, rules and plugins in sequence for one
/// target, stopping at the stage the scan type asks for.
pub struct ScanPipeline<'a> {
    config: Config,
    registry: &'a PluginRegistry,
}

impl<'a> ScanPipeline<'a> {
    pub fn new(config: Config, registry: &'a PluginRegistry) -> Self {
        Self { config, registry }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn run(&self, target: &str, ports: &PortSet, scan_type: ScanType) -> Result<FullScanReport> {
        let target = Target::new(target)?;
        let started_at = Utc::now();
        info!("Starting {} scan of {}", scan_type, target);

        let scanner = PortScanner::from_config(&self.config);
        let scan = match scanner.scan(&target, ports).await {
            Ok(scan) => scan,
            Err(ScanError::Resolution { target: name, reason }) => {
                warn!("Could not resolve {}: {}", name, reason);
                ScanResult::unresolved(&target, ports)
            }
            Err(e) => return Err(e),
        };

        let mut report = FullScanReport {
            id: Uuid::new_v4(),
            target: target.to_string(),
            scan_type,
            started_at,
            finished_at: started_at,
            scan,
            services: Vec::new(),
            os_guess: None,
            risk: None,
            plugin_results: Vec::new(),
        };

        if scan_type != ScanType::Port && report.scan.status == ScanStatus::Completed {
            let detector = ServiceDetector::from_config(&self.config);
            report.services = detector.detect(&target, &report.scan.open_ports).await;
            report.os_guess = Some(service::fingerprint(&report.services).to_string());
        }

        if scan_type == ScanType::Full {
            report.risk = Some(vuln::generate_report(target.as_str(), &report.services));

            for record in report.services.iter().take(self.config.plugins.max_services) {
                let results = self
                    .registry
                    .run_all(target.as_str(), record.port, &record.service)
                    .await;
                report.plugin_results.extend(results);
            }
        }

        report.finished_at = Utc::now();
        info!(
            "Finished {} scan of {}: {} open ports, {} services",
            scan_type,
            target,
            report.scan.open_ports.len(),
            report.services.len()
        );
        Ok(report)
    }

    /// Scan targets one after another. A failing target becomes an error entry.
    pub async fn run_batch(&self, targets: &[String], ports: &PortSet, scan_type: ScanType) -> Vec<BatchEntry> {
        let mut entries = Vec::with_capacity(targets.len());

        for target in targets {
            let entry = match self.run(target, ports, scan_type).await {
                Ok(report) => BatchEntry {
                    target: report.target.clone(),
                    report: Some(report),
                    error: None,
                },
                Err(e) => {
                    error!("Batch scan of '{}' failed: {}", target, e);
                    BatchEntry {
                        target: target.clone(),
                        report: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            entries.push(entry);
        }

        entries
    }
}
