/// Target list files for batch scans
pub mod targets {
    use crate::{Result, ScanError};
    use log::info;
    use std::path::Path;
    use tokio::fs;

    /// One target per line; blank lines and `#` comments are skipped.
    pub async fn load_targets(path: &Path) -> Result<Vec<String>> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| ScanError::InvalidInput(format!("Failed to read target list {}: {}", path.display(), e)))?;

        let targets = parse_targets(&content);
        info!("Loaded {} targets from {}", targets.len(), path.display());
        Ok(targets)
    }

    pub fn parse_targets(content: &str) -> Vec<String> {
        content
            .lines()
            .map(|line| line.trim())
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect()
    }
}

/// Progress indicators
pub mod progress {
    use indicatif::{ProgressBar, ProgressStyle};
    use std::time::Duration;

    pub fn create_spinner(message: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();

        let style = ProgressStyle::default_spinner()
            .template("  {spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        pb.set_style(style);

        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(120));
        pb
    }

    /// Spinner that draws nothing, for quiet mode.
    pub fn hidden() -> ProgressBar {
        ProgressBar::hidden()
    }
}

/// Time utilities
pub mod time {
    use std::time::Duration;

    /// Format duration as human readable string
    pub fn format_duration(duration: Duration) -> String {
        let secs = duration.as_secs();
        let hours = secs / 3600;
        let minutes = (secs % 3600) / 60;
        let seconds = secs % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else if secs > 0 {
            format!("{}s", seconds)
        } else {
            format!("{}ms", duration.as_millis())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn durations_are_human_readable() {
        assert_eq!(time::format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(time::format_duration(Duration::from_secs(42)), "42s");
        assert_eq!(time::format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(time::format_duration(Duration::from_secs(3725)), "1h 2m 5s");
    }

    #[test]
    fn target_lists_skip_comments_and_blanks() {
        let content = "# lab hosts\n10.0.0.1\n\n  db.lab.local  \n# end\n";
        assert_eq!(targets::parse_targets(content), vec!["10.0.0.1", "db.lab.local"]);
    }

    #[test]
    fn target_list_file_is_loaded() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "10.0.0.1\n# skip\n10.0.0.2\n").unwrap();

        let loaded = tokio_test::block_on(targets::load_targets(file.path()));
        let loaded = tokio_test::assert_ok!(loaded);
        assert_eq!(loaded, vec!["10.0.0.1", "10.0.0.2"]);
    }

    #[test]
    fn missing_target_list_is_an_error() {
        let result = tokio_test::block_on(targets::load_targets(std::path::Path::new("/no/such/targets.txt")));
        let err = tokio_test::assert_err!(result);
        assert!(err.is_validation());
    }
}
