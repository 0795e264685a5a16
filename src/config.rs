use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub scan: ScanConfig,
    pub discovery: DiscoveryConfig,
    pub detection: DetectionConfig,
    pub plugins: PluginConfig,
    pub reporting: ReportingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    pub threads: usize,
    pub timeout: u64, // milliseconds, per connect
    pub default_ports: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    pub threads: usize,
    pub timeout: u64, // milliseconds, per connect
    pub probe_ports: Vec<u16>,
    pub max_hosts: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    pub timeout: u64,        // milliseconds, connect and HTTP read
    pub banner_window: u64,  // milliseconds, passive read after connect
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    pub directory: PathBuf,
    pub timeout: u64, // seconds
    pub max_services: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportingConfig {
    pub output_dir: PathBuf,
    pub formats: Vec<OutputFormat>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Json,
    Csv,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scan: ScanConfig {
                threads: 100,
                timeout: 2000,
                default_ports: "1-1024".to_string(),
            },
            discovery: DiscoveryConfig {
                threads: 50,
                timeout: 1000,
                probe_ports: vec![22, 80, 443, 3306, 5432, 8080, 25, 53],
                max_hosts: 65_536,
            },
            detection: DetectionConfig {
                timeout: 3000,
                banner_window: 500,
            },
            plugins: PluginConfig {
                directory: PathBuf::from("./plugins"),
                timeout: 5,
                max_services: 5,
            },
            reporting: ReportingConfig {
                output_dir: PathBuf::from("./reports"),
                formats: vec![OutputFormat::Json],
            },
        }
    }
}

impl Config {
    pub fn load_from_file(path: &str) -> crate::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn save_to_file(&self, path: &str) -> crate::Result<()> {
        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;
        Ok(())
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan.timeout)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery.timeout)
    }

    pub fn detection_timeout(&self) -> Duration {
        Duration::from_millis(self.detection.timeout)
    }

    pub fn banner_window(&self) -> Duration {
        Duration::from_millis(self.detection.banner_window)
    }

    pub fn plugin_timeout(&self) -> Duration {
        Duration::from_secs(self.plugins.timeout)
    }
}
