use clap::Parser;
use env_logger::Env;
use labscan::{
    checks,
    cli::{Cli, Commands, PluginCommands},
    config::Config,
    discovery::HostDiscovery,
    display::DisplayManager,
    pipeline::ScanPipeline,
    plugin::PluginRegistry,
    reporting::{self, ReportGenerator},
    types::{FullScanReport, PortSet, ScanType},
    utils, Result, ScanError,
};
use serde::Serialize;
use std::path::Path;
use std::process;
use std::time::Instant;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };

    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_timestamp_secs()
        .init();

    // JSON on stdout stays machine readable.
    let display = DisplayManager::with_quiet(cli.quiet || cli.json);

    display.print_banner("🔒 LABSCAN - Lab Network Scanner", Some("Authorized Testing Only"));
    display.print_warning("Ensure you have proper permission before scanning any networks.");

    let config = load_config(&cli, &display);
    let registry = load_plugins(&cli, &config, &display);

    let start_time = Instant::now();
    let result = run(&cli, config, &registry, &display).await;
    let elapsed = start_time.elapsed();

    match result {
        Ok(()) => {
            display.print_success(&format!("Done in {}", utils::time::format_duration(elapsed)));
        }
        Err(e) => {
            display.print_error(&format!("Scan failed: {}", e));
            process::exit(1);
        }
    }
}

fn load_config(cli: &Cli, display: &DisplayManager) -> Config {
    let mut config = match &cli.config {
        Some(path) => match Config::load_from_file(&path.to_string_lossy()) {
            Ok(config) => {
                display.print_success(&format!("Loaded configuration from {}", path.display()));
                config
            }
            Err(e) => {
                display.print_warning(&format!("Failed to load configuration: {}, using defaults", e));
                Config::default()
            }
        },
        None => Config::default(),
    };

    if let Some(threads) = cli.threads {
        config.scan.threads = threads;
        config.discovery.threads = threads;
    }
    if let Some(timeout) = cli.timeout {
        config.scan.timeout = timeout;
        config.discovery.timeout = timeout;
    }
    if let Some(dir) = &cli.plugin_dir {
        config.plugins.directory = dir.clone();
    }
    if let Some(output) = &cli.output {
        config.reporting.output_dir = output.clone();
    }
    if !cli.format.is_empty() {
        config.reporting.formats = cli.format.clone();
    }

    config
}

fn load_plugins(cli: &Cli, config: &Config, display: &DisplayManager) -> PluginRegistry {
    let mut registry = PluginRegistry::with_builtins(config.plugin_timeout());
    let dir = &config.plugins.directory;

    if dir.is_dir() {
        match registry.load(dir) {
            Ok(count) => display.print_info(&format!("Loaded {} plugins from {}", count, dir.display())),
            Err(e) => display.print_warning(&format!("Failed to load plugins: {}", e)),
        }
    } else if cli.plugin_dir.is_some() {
        display.print_warning(&format!("Plugin directory {} not found", dir.display()));
    }

    registry
}

fn parse_ports(ports: Option<&str>, config: &Config) -> Result<PortSet> {
    PortSet::parse(ports.unwrap_or(&config.scan.default_ports))
}

async fn run(cli: &Cli, config: Config, registry: &PluginRegistry, display: &DisplayManager) -> Result<()> {
    match &cli.command {
        Commands::Discover { cidr, probe_ports } => {
            execute_discovery(cli, &config, display, cidr, probe_ports.as_deref()).await
        }
        Commands::Scan { target, ports } => {
            let ports = parse_ports(ports.as_deref(), &config)?;
            execute_scan(cli, config, registry, display, target, &ports, ScanType::Port).await
        }
        Commands::Services { target, ports } => {
            let ports = parse_ports(ports.as_deref(), &config)?;
            execute_scan(cli, config, registry, display, target, &ports, ScanType::Service).await
        }
        Commands::Full { target, ports } => {
            let ports = parse_ports(ports.as_deref(), &config)?;
            execute_scan(cli, config, registry, display, target, &ports, ScanType::Full).await
        }
        Commands::Batch {
            targets,
            file,
            ports,
            scan_type,
        } => {
            let mut all_targets = targets.clone();
            if let Some(file) = file {
                all_targets.extend(utils::targets::load_targets(file).await?);
            }
            if all_targets.is_empty() {
                return Err(ScanError::InvalidInput("No targets given for batch scan".to_string()));
            }
            let ports = parse_ports(ports.as_deref(), &config)?;
            execute_batch(cli, config, registry, display, &all_targets, &ports, *scan_type).await
        }
        Commands::Web { target, port } => execute_web(cli, &config, display, target, *port).await,
        Commands::Plugins { action } => match action {
            PluginCommands::List => {
                let plugins = registry.list();
                display.print_section_header(&format!("🧩 PLUGINS ({})", plugins.len()));
                display.print_plugin_list(&plugins);
                emit_json(cli, &plugins)
            }
            PluginCommands::Run {
                name,
                target,
                port,
                service,
            } => {
                let result = registry.run(name, target, *port, service).await;
                display.print_plugin_result(&result);
                emit_json(cli, &result)
            }
        },
    }
}

async fn execute_discovery(
    cli: &Cli,
    config: &Config,
    display: &DisplayManager,
    cidr: &str,
    probe_ports: Option<&str>,
) -> Result<()> {
    display.print_section_header("🔍 HOST DISCOVERY");

    let mut discovery = HostDiscovery::from_config(config);
    if let Some(ports) = probe_ports {
        discovery = discovery.with_probe_ports(PortSet::parse(ports)?.as_slice().to_vec());
    }

    let spinner = spinner(cli, &format!("Probing {}", cidr));
    let hosts = discovery.discover(cidr).await;
    spinner.finish_and_clear();
    let hosts = hosts?;

    display.print_host_table(&hosts);
    display.print_success(&format!("Discovery completed: {} live hosts found", hosts.len()));

    if cli.output.is_some() {
        let path = config.reporting.output_dir.join(format!(
            "labscan_discovery_{}.json",
            chrono::Utc::now().format("%Y%m%d_%H%M%S")
        ));
        write_output(&path, &hosts).await?;
        display.print_info(&format!("Saved {}", path.display()));
    }

    emit_json(cli, &hosts)
}

async fn execute_web(cli: &Cli, config: &Config, display: &DisplayManager, target: &str, port: u16) -> Result<()> {
    display.print_section_header(&format!("🌐 WEB CHECKS {}:{}", target, port));

    let suite = PluginRegistry::with_plugins(
        config.plugin_timeout(),
        checks::web_suite(config.detection_timeout()),
    );

    let spinner = spinner(cli, &format!("Running {} web checks", suite.len()));
    let results = suite.run_all(target, port, "HTTP").await;
    spinner.finish_and_clear();

    for result in &results {
        display.print_plugin_result(result);
    }
    let vulnerable = results.iter().filter(|r| r.vulnerable).count();
    display.print_success(&format!("Web checks completed: {}/{} flagged", vulnerable, results.len()));

    if cli.output.is_some() {
        let path = config.reporting.output_dir.join(format!(
            "labscan_web_{}_{}.json",
            target.replace([':', '/'], "_"),
            chrono::Utc::now().format("%Y%m%d_%H%M%S")
        ));
        write_output(&path, &results).await?;
        display.print_info(&format!("Saved {}", path.display()));
    }

    emit_json(cli, &results)
}

async fn execute_scan(
    cli: &Cli,
    config: Config,
    registry: &PluginRegistry,
    display: &DisplayManager,
    target: &str,
    ports: &PortSet,
    scan_type: ScanType,
) -> Result<()> {
    let pipeline = ScanPipeline::new(config, registry);

    let spinner = spinner(cli, &format!("Scanning {} ({} ports)", target, ports.len()));
    let report = pipeline.run(target, ports, scan_type).await;
    spinner.finish_and_clear();
    let report = report?;

    display.print_full_report(&report);
    save_report(cli, pipeline.config(), display, &report).await?;
    emit_json(cli, &report)
}

async fn execute_batch(
    cli: &Cli,
    config: Config,
    registry: &PluginRegistry,
    display: &DisplayManager,
    targets: &[String],
    ports: &PortSet,
    scan_type: ScanType,
) -> Result<()> {
    let pipeline = ScanPipeline::new(config, registry);

    let spinner = spinner(cli, &format!("Scanning {} targets", targets.len()));
    let entries = pipeline.run_batch(targets, ports, scan_type).await;
    spinner.finish_and_clear();

    display.print_batch_summary(&entries);
    for report in entries.iter().filter_map(|e| e.report.as_ref()) {
        save_report(cli, pipeline.config(), display, report).await?;
    }
    emit_json(cli, &entries)
}

async fn save_report(cli: &Cli, config: &Config, display: &DisplayManager, report: &FullScanReport) -> Result<()> {
    if cli.output.is_none() {
        return Ok(());
    }

    let generator = ReportGenerator::new(config.reporting.clone());
    for path in generator.generate_report(report).await? {
        display.print_info(&format!("Saved {}", path.display()));
    }
    Ok(())
}

async fn write_output<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    reporting::write_json(value, path).await
}

fn emit_json<T: Serialize + ?Sized>(cli: &Cli, value: &T) -> Result<()> {
    if cli.json {
        println!("{}", serde_json::to_string_pretty(value)?);
    }
    Ok(())
}

fn spinner(cli: &Cli, message: &str) -> indicatif::ProgressBar {
    if cli.quiet || cli.json {
        utils::progress::hidden()
    } else {
        utils::progress::create_spinner(message)
    }
}
