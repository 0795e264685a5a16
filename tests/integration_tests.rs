use labscan::{
    config::{Config, OutputFormat},
    discovery::{expand_cidr, DEFAULT_MAX_HOSTS},
    executor::TaskExecutor,
    pipeline::ScanPipeline,
    plugin::PluginRegistry,
    port_scan::PortScanner,
    types::{PluginState, PortSet, ProbeOutcome, RiskLevel, ScanStatus, ScanType, Severity, Target},
    vuln, Result,
};
use std::net::IpAddr;
use std::time::Duration;
use tokio::net::TcpListener;

#[test]
fn test_config_default() {
    let config = Config::default();

    assert_eq!(config.scan.threads, 100);
    assert_eq!(config.scan.default_ports, "1-1024");
    assert_eq!(config.discovery.probe_ports, vec![22, 80, 443, 3306, 5432, 8080, 25, 53]);
    assert_eq!(config.discovery.max_hosts, 65_536);
    assert_eq!(config.plugins.max_services, 5);
    assert_eq!(config.plugin_timeout(), Duration::from_secs(5));
    assert_eq!(config.reporting.formats, vec![OutputFormat::Json]);
}

#[test]
fn test_config_save_and_load() -> Result<()> {
    use tempfile::Builder;

    let mut config = Config::default();
    config.scan.threads = 17;
    config.plugins.max_services = 2;
    config.reporting.formats = vec![OutputFormat::Json, OutputFormat::Csv];

    let temp_file = Builder::new().suffix(".toml").tempfile().unwrap();
    let temp_path = temp_file.path().to_str().unwrap();

    config.save_to_file(temp_path)?;
    let loaded_config = Config::load_from_file(temp_path)?;

    assert_eq!(loaded_config.scan.threads, 17);
    assert_eq!(loaded_config.scan.timeout, config.scan.timeout);
    assert_eq!(loaded_config.discovery.probe_ports, config.discovery.probe_ports);
    assert_eq!(loaded_config.plugins.max_services, 2);
    assert_eq!(loaded_config.reporting.formats, config.reporting.formats);

    Ok(())
}

#[tokio::test]
async fn test_unreachable_target_reports_every_port_closed() -> Result<()> {
    // 192.0.2.0/24 is reserved for documentation and never routed.
    let target = Target::new("192.0.2.1")?;
    let ports = PortSet::parse("22,80,443,8080")?;
    let scanner = PortScanner::new(4, Duration::from_millis(200));

    let result = scanner.scan(&target, &ports).await?;
    assert!(result.open_ports.is_empty());
    assert_eq!(result.closed_ports, ports.len());
    assert_eq!(result.total_ports_scanned, 4);
    assert_eq!(result.status, ScanStatus::Completed);
    Ok(())
}

#[tokio::test]
async fn test_executor_yields_one_outcome_per_item_for_any_limit() {
    let items: Vec<u16> = (1..=40).collect();

    for limit in [1, items.len() / 2, items.len() * 2] {
        let executor = TaskExecutor::new(limit, Duration::from_secs(1));
        let outcomes = executor
            .run(&items, |item| async move {
                if item % 3 == 0 {
                    ProbeOutcome::reached(item)
                } else {
                    ProbeOutcome::silent(item)
                }
            })
            .await;

        assert_eq!(outcomes.len(), items.len(), "limit {}", limit);
        assert_eq!(outcomes.iter().filter(|o| o.reached).count(), 13);
    }
}

#[test]
fn test_cidr_expansion() -> Result<()> {
    let hosts = expand_cidr("192.168.1.0/30", DEFAULT_MAX_HOSTS)?;
    let expected: Vec<IpAddr> = vec!["192.168.1.1".parse().unwrap(), "192.168.1.2".parse().unwrap()];
    assert_eq!(hosts, expected);
    Ok(())
}

#[test]
fn test_rule_engine_properties() {
    assert_eq!(vuln::score("High"), 7.0);
    assert_eq!(vuln::score("Unknown-severity"), 0.0);

    assert!(vuln::identify("HTTP", 80, "")
        .iter()
        .any(|f| f.name == "Unencrypted HTTP" && f.severity == Severity::Medium));
    assert!(vuln::identify("MySQL", 3306, "")
        .iter()
        .any(|f| f.severity == Severity::Critical));

    let empty = vuln::generate_report("10.0.0.1", &[]);
    assert_eq!(empty.vulnerability_count, 0);
    assert_eq!(empty.overall_risk_level, RiskLevel::Low);
    assert_eq!(empty.average_risk_score, 0.0);
    assert_eq!(empty.max_risk_score, 0.0);
}

#[tokio::test]
async fn test_registry_loads_manifest_directory() -> Result<()> {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("ftp.toml"),
        r#"
name = "Lab FTP Anonymous"
kind = "ftp-anonymous"
description = "Anonymous FTP on lab hosts"
severity = "High"
author = "lab"
"#,
    )
    .unwrap();
    std::fs::write(
        dir.path().join("sample.toml"),
        "name = \"Lab Sample\"\nkind = \"sample\"\n",
    )
    .unwrap();

    let mut registry = PluginRegistry::new(Duration::from_secs(1));
    assert_eq!(registry.load(dir.path())?, 2);

    let listed = registry.list();
    assert_eq!(listed[0].name, "Lab FTP Anonymous");
    assert_eq!(listed[0].severity, Severity::High);
    assert_eq!(listed[1].version, "1.0.0");

    let sample = registry.run("Lab Sample", "10.0.0.1", 80, "HTTP").await;
    assert_eq!(sample.state, PluginState::Completed);
    assert_eq!(sample.status, "Sample check executed");

    let missing = registry.run("Nope", "10.0.0.1", 80, "HTTP").await;
    assert_eq!(missing.state, PluginState::NotFound);
    Ok(())
}

#[tokio::test]
async fn test_pipeline_service_scan_on_localhost() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let mut config = Config::default();
    config.scan.timeout = 500;
    config.detection.timeout = 500;
    config.detection.banner_window = 100;

    let registry = PluginRegistry::new(Duration::from_secs(1));
    let pipeline = ScanPipeline::new(config, &registry);
    let report = pipeline
        .run("127.0.0.1", &PortSet::new([port])?, ScanType::Service)
        .await?;

    assert_eq!(report.scan.open_ports, vec![port]);
    assert_eq!(report.services.len(), 1);
    assert_eq!(report.services[0].banner, "N/A");
    assert_eq!(report.os_guess.as_deref(), Some("Unknown"));
    assert!(report.risk.is_none());

    let json = serde_json::to_value(&report)?;
    assert_eq!(json["scan_type"], "service");
    assert_eq!(json["scan"]["status"], "completed");
    Ok(())
}

#[tokio::test]
async fn test_invalid_input_is_rejected_before_scanning() {
    assert!(PortSet::parse("80-20").unwrap_err().is_validation());
    assert!(Target::new("").unwrap_err().is_validation());

    let registry = PluginRegistry::new(Duration::from_secs(1));
    let pipeline = ScanPipeline::new(Config::default(), &registry);
    let ports = PortSet::parse("80").unwrap();
    assert!(pipeline.run(" ", &ports, ScanType::Port).await.is_err());
}
