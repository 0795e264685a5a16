use crate::pipeline::BatchEntry;
use crate::plugin::PluginMetadata;
use crate::types::{
    FullScanReport, PluginResult, PluginState, RiskLevel, RiskReport, ScanResult, ScanStatus, ServiceRecord,
    Severity, VulnerabilityFinding,
};
use colored::*;
use std::net::IpAddr;

/// Colored terminal output for scan results
pub struct DisplayManager {
    use_colors: bool,
    quiet_mode: bool,
}

impl DisplayManager {
    pub fn new() -> Self {
        Self::with_quiet(false)
    }

    pub fn with_quiet(quiet: bool) -> Self {
        let use_colors = std::env::var("NO_COLOR").is_err()
            && std::env::var("TERM").map_or(true, |term| term != "dumb");

        Self {
            use_colors,
            quiet_mode: quiet,
        }
    }

    pub fn print_banner(&self, title: &str, subtitle: Option<&str>) {
        if self.quiet_mode { return; }

        let width = title.chars().count();
        if self.use_colors {
            println!();
            println!("  {}", "┌─".bright_cyan().to_string() + &"─".repeat(width + 2) + "─┐");
            println!("  {} {} {}", "│".bright_cyan(), title.bright_white().bold(), "│".bright_cyan());
            if let Some(sub) = subtitle {
                println!(
                    "  {} {} {}",
                    "│".bright_cyan(),
                    format!("{:^width$}", sub, width = width).bright_black(),
                    "│".bright_cyan()
                );
            }
            println!("  {}", "└─".bright_cyan().to_string() + &"─".repeat(width + 2) + "─┘");
            println!();
        } else {
            let border = "=".repeat(width + 4);
            println!("\n{}", border);
            println!("  {}  ", title);
            if let Some(sub) = subtitle {
                println!("  {}  ", sub);
            }
            println!("{}\n", border);
        }
    }

    pub fn print_section_header(&self, title: &str) {
        if self.quiet_mode { return; }

        if self.use_colors {
            println!("{}", title.bright_cyan().bold());
            println!("{}", "─".repeat(title.chars().count()).bright_cyan());
        } else {
            println!("{}", title);
            println!("{}", "=".repeat(title.chars().count()));
        }
    }

    pub fn print_success(&self, message: &str) {
        if self.quiet_mode { return; }

        if self.use_colors {
            println!("  {} {}", "✓".bright_green().bold(), message.green());
        } else {
            println!("[✓] {}", message);
        }
    }

    pub fn print_warning(&self, message: &str) {
        if self.quiet_mode { return; }

        if self.use_colors {
            println!("  {} {}", "!".bright_yellow().bold(), message.yellow());
        } else {
            println!("[!] {}", message);
        }
    }

    /// Errors are printed even in quiet mode.
    pub fn print_error(&self, message: &str) {
        if self.use_colors {
            eprintln!("  {} {}", "✗".bright_red().bold(), message.red().bold());
        } else {
            eprintln!("[✗] {}", message);
        }
    }

    pub fn print_info(&self, message: &str) {
        if self.quiet_mode { return; }

        if self.use_colors {
            println!("  {} {}", "i".bright_blue().bold(), message.blue());
        } else {
            println!("[i] {}", message);
        }
    }

    pub fn print_host_table(&self, hosts: &[IpAddr]) {
        if self.quiet_mode { return; }

        if hosts.is_empty() {
            self.print_warning("No live hosts found");
            return;
        }

        if self.use_colors {
            println!(
                "\n  📡 {} {}",
                "Discovered Hosts:".bright_white().bold(),
                format!("({})", hosts.len()).bright_black()
            );
            for host in hosts {
                println!("    {} {}", "→".bright_green(), host.to_string().cyan());
            }
        } else {
            println!("\nDiscovered Hosts ({}):", hosts.len());
            for host in hosts {
                println!("  → {}", host);
            }
        }
        println!();
    }

    pub fn print_scan_result(&self, result: &ScanResult) {
        if self.quiet_mode { return; }

        if result.status == ScanStatus::Unresolved {
            self.print_warning(&format!("{} could not be resolved", result.target));
            return;
        }

        if result.open_ports.is_empty() {
            if self.use_colors {
                println!("  {} {} - {}", "•".bright_black(), result.target.cyan(), "No open ports".bright_black());
            } else {
                println!("  • {} - No open ports", result.target);
            }
            return;
        }

        let ports: Vec<String> = result.open_ports.iter().map(|p| p.to_string()).collect();
        if self.use_colors {
            println!(
                "  {} {} → {} open / {} scanned",
                "•".bright_green().bold(),
                result.target.cyan().bold(),
                result.open_ports.len().to_string().yellow().bold(),
                result.total_ports_scanned
            );
            println!("    {} {}", "→".bright_green(), ports.join(", ").yellow());
        } else {
            println!(
                "  • {} → {} open / {} scanned",
                result.target,
                result.open_ports.len(),
                result.total_ports_scanned
            );
            println!("    → {}", ports.join(", "));
        }
    }

    pub fn print_services(&self, services: &[ServiceRecord], os_guess: Option<&str>) {
        if self.quiet_mode || services.is_empty() { return; }

        for service in services {
            let banner = service.banner.truncate_with_ellipsis(60);
            if self.use_colors {
                println!(
                    "    {} {:<6} {:<12} {}",
                    "→".bright_green(),
                    service.port.to_string().yellow(),
                    service.service.cyan(),
                    banner.bright_black()
                );
            } else {
                println!("    → {:<6} {:<12} {}", service.port, service.service, banner);
            }
        }

        if let Some(os) = os_guess {
            self.print_info(&format!("OS guess: {}", os));
        }
    }

    pub fn print_finding(&self, finding: &VulnerabilityFinding) {
        if self.quiet_mode { return; }

        if self.use_colors {
            println!(
                "  {} {} {}",
                severity_icon(finding.severity).color(severity_color(finding.severity)),
                finding.name.bright_white().bold(),
                format!("(port {})", finding.port).bright_black()
            );
            println!("    └─ {}", finding.description.white());
        } else {
            println!(
                "  [{}] {} (port {})",
                finding.severity.as_str().to_uppercase(),
                finding.name,
                finding.port
            );
            println!("    Description: {}", finding.description);
        }
    }

    pub fn print_risk_report(&self, report: &RiskReport) {
        if self.quiet_mode { return; }

        for finding in &report.vulnerabilities {
            self.print_finding(finding);
        }

        let summary = format!(
            "{} findings, overall risk {} (avg {:.2}, max {:.2})",
            report.vulnerability_count, report.overall_risk_level, report.average_risk_score, report.max_risk_score
        );

        if self.use_colors {
            let color = match report.overall_risk_level {
                RiskLevel::Critical => Color::BrightRed,
                RiskLevel::High => Color::Red,
                RiskLevel::Medium => Color::Yellow,
                RiskLevel::Low => Color::Green,
            };
            println!("\n  📊 {}", summary.color(color).bold());
        } else {
            println!("\nRisk: {}", summary);
        }
    }

    pub fn print_plugin_result(&self, result: &PluginResult) {
        if self.quiet_mode { return; }

        let label = format!("{}:{} {}", result.target, result.port, result.plugin);
        if self.use_colors {
            let icon = match (result.state, result.vulnerable) {
                (PluginState::Completed, true) => "✗".bright_red().bold(),
                (PluginState::Completed, false) => "✓".bright_green().bold(),
                _ => "?".bright_yellow().bold(),
            };
            println!("  {} {} → {}", icon, label.bright_white(), result.status.white());
        } else {
            let tag = match (result.state, result.vulnerable) {
                (PluginState::Completed, true) => "VULN",
                (PluginState::Completed, false) => "SAFE",
                _ => "ERR",
            };
            println!("  [{}] {} → {}", tag, label, result.status);
        }
    }

    pub fn print_plugin_list(&self, plugins: &[PluginMetadata]) {
        if self.quiet_mode { return; }

        if plugins.is_empty() {
            self.print_warning("No plugins registered");
            return;
        }

        for plugin in plugins {
            if self.use_colors {
                println!(
                    "  {} {} {} {}",
                    severity_icon(plugin.severity).color(severity_color(plugin.severity)),
                    plugin.name.bright_white().bold(),
                    format!("v{}", plugin.version).bright_black(),
                    plugin.description.white()
                );
            } else {
                println!("  [{}] {} v{} - {}", plugin.severity, plugin.name, plugin.version, plugin.description);
            }
        }
    }

    pub fn print_full_report(&self, report: &FullScanReport) {
        if self.quiet_mode { return; }

        self.print_section_header(&format!("Scan of {} ({})", report.target, report.scan_type));
        self.print_scan_result(&report.scan);
        self.print_services(&report.services, report.os_guess.as_deref());

        if let Some(risk) = &report.risk {
            println!();
            self.print_section_header("Vulnerabilities");
            self.print_risk_report(risk);
        }

        if !report.plugin_results.is_empty() {
            println!();
            self.print_section_header("Plugins");
            for result in &report.plugin_results {
                self.print_plugin_result(result);
            }
        }

        let elapsed = (report.finished_at - report.started_at).to_std().unwrap_or_default();
        println!();
        self.print_info(&format!("Completed in {}", crate::utils::time::format_duration(elapsed)));
    }

    pub fn print_batch_summary(&self, entries: &[BatchEntry]) {
        if self.quiet_mode { return; }

        let failed = entries.iter().filter(|e| e.error.is_some()).count();
        self.print_section_header("Batch Summary");
        for entry in entries {
            match (&entry.report, &entry.error) {
                (Some(report), _) => self.print_scan_result(&report.scan),
                (None, Some(error)) => self.print_warning(&format!("{}: {}", entry.target, error)),
                (None, None) => {}
            }
        }
        self.print_info(&format!("{} targets, {} failed", entries.len(), failed));
    }
}

impl Default for DisplayManager {
    fn default() -> Self {
        Self::new()
    }
}

fn severity_icon(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "🔥",
        Severity::High => "⚠️",
        Severity::Medium => "⚡",
        Severity::Low => "ℹ️",
        Severity::Info => "💡",
    }
}

fn severity_color(severity: Severity) -> Color {
    match severity {
        Severity::Critical => Color::BrightRed,
        Severity::High => Color::Red,
        Severity::Medium => Color::Yellow,
        Severity::Low => Color::Green,
        Severity::Info => Color::Blue,
    }
}

trait StringExt {
    fn truncate_with_ellipsis(&self, max_len: usize) -> String;
}

impl StringExt for str {
    fn truncate_with_ellipsis(&self, max_len: usize) -> String {
        if self.chars().count() <= max_len {
            self.to_string()
        } else {
            let kept: String = self.chars().take(max_len.saturating_sub(3)).collect();
            format!("{}...", kept)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!("short".truncate_with_ellipsis(10), "short");
        assert_eq!("abcdefghij".truncate_with_ellipsis(6), "abc...");
        assert_eq!("ééééééé".truncate_with_ellipsis(5), "éé...");
    }
}
