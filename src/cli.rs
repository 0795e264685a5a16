use crate::config::OutputFormat;
use crate::types::ScanType;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "labscan")]
#[command(about = "Lab network scanner: host discovery, port scanning, service detection and vulnerability checks")]
#[command(long_about = r#"
Labscan discovers hosts, scans TCP ports, identifies services and rates the
exposure of a target with static rules and pluggable checks.

WARNING: Only scan networks and systems you own or have explicit permission
to test.

Usage Examples:
  labscan discover 192.168.1.0/24
  labscan scan 192.168.1.10 -p 1-1024
  labscan services 192.168.1.10 -p 21,22,80,443
  labscan full 192.168.1.10 -o ./reports --format json --format csv
  labscan batch 10.0.0.1 10.0.0.2 --scan-type service
  labscan web 192.168.1.10 --port 8080
  labscan plugins list --plugin-dir ./plugins
  labscan plugins run "FTP Anonymous Login" 192.168.1.10 --port 21
"#)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Number of concurrent connections
    #[arg(long, global = true)]
    pub threads: Option<usize>,

    /// Connect timeout in milliseconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Directory of plugin manifests (*.toml)
    #[arg(long, value_name = "DIR", env = "LABSCAN_PLUGIN_DIR", global = true)]
    pub plugin_dir: Option<PathBuf>,

    /// Write report files into this directory
    #[arg(short, long, value_name = "DIR", global = true)]
    pub output: Option<PathBuf>,

    /// Report formats written with --output
    #[arg(long, value_enum, global = true)]
    pub format: Vec<OutputFormat>,

    /// Print results as JSON on stdout
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Find live hosts in a CIDR range
    Discover {
        /// Network in CIDR notation (e.g., 192.168.1.0/24)
        cidr: String,

        /// Ports probed to decide a host is alive (e.g., 22,80,443)
        #[arg(long)]
        probe_ports: Option<String>,
    },

    /// TCP connect scan of one target
    Scan {
        target: String,

        /// Ports to scan (e.g., 1-1024 or 22,80,443)
        #[arg(short, long)]
        ports: Option<String>,
    },

    /// Port scan followed by service and banner detection
    Services {
        target: String,

        #[arg(short, long)]
        ports: Option<String>,
    },

    /// Services plus vulnerability rules and plugins
    Full {
        target: String,

        #[arg(short, long)]
        ports: Option<String>,
    },

    /// Scan several targets one after another
    Batch {
        targets: Vec<String>,

        /// File with one target per line
        #[arg(short, long, value_name = "FILE")]
        file: Option<PathBuf>,

        #[arg(short, long)]
        ports: Option<String>,

        #[arg(long, value_enum, default_value = "full")]
        scan_type: ScanType,
    },

    /// Web application checks: security headers, certificate, SQL errors, HTTP methods
    Web {
        target: String,

        #[arg(long, default_value = "80")]
        port: u16,
    },

    /// Inspect and run plugins
    Plugins {
        #[command(subcommand)]
        action: PluginCommands,
    },
}

#[derive(Subcommand)]
pub enum PluginCommands {
    /// List registered plugins
    List,

    /// Run one plugin against a target port
    Run {
        /// Plugin name as shown by `plugins list`
        name: String,

        target: String,

        #[arg(long)]
        port: u16,

        /// Service label passed to the plugin
        #[arg(long, default_value = "")]
        service: String,
    },
}
