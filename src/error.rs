use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScanError>;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Network error: {0}")]
    Network(#[from] std::io::Error),

    #[error("Could not resolve target {target}: {reason}")]
    Resolution { target: String, reason: String },

    #[error("Invalid target format: {0}")]
    InvalidTarget(String),

    #[error("Invalid port specification: {0}")]
    InvalidPorts(String),

    #[error("Invalid CIDR range: {0}")]
    InvalidCidr(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Plugin manifest error in {path}: {message}")]
    PluginManifest { path: String, message: String },

    #[error("Plugin directory not found: {0}")]
    PluginDirectory(String),

    #[error("Reporting error: {0}")]
    Reporting(String),
}

impl ScanError {
    /// Errors that are raised before any packet leaves the host.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ScanError::InvalidTarget(_)
                | ScanError::InvalidPorts(_)
                | ScanError::InvalidCidr(_)
                | ScanError::InvalidInput(_)
        )
    }
}

impl From<toml::ser::Error> for ScanError {
    fn from(err: toml::ser::Error) -> Self {
        ScanError::Reporting(format!("TOML serialization error: {}", err))
    }
}
