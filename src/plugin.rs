//! Plugin contract and registry.
//!
//! A plugin is an independently authored check run against one
//! `(target, port, service)` triple. The registry owns every plugin for the
//! lifetime of the process: it is populated once (built-in catalog and/or a
//! manifest directory) and then shared by reference for concurrent `run`
//! calls. No plugin failure escapes `run`/`run_all`; errors, panics and
//! timeouts all come back as a [`PluginResult`] with a failed state.

use crate::checks;
use crate::types::{PluginResult, Severity};
use crate::{Result, ScanError};
use async_trait::async_trait;
use futures::FutureExt;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginMetadata {
    pub name: String,
    pub description: String,
    pub severity: Severity,
    pub version: String,
    pub author: String,
}

impl PluginMetadata {
    pub fn new(name: &str, description: &str, severity: Severity) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            severity,
            version: "1.0.0".to_string(),
            author: "Labscan".to_string(),
        }
    }
}

#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str {
        &self.metadata().name
    }

    fn metadata(&self) -> &PluginMetadata;

    async fn check(&self, target: &str, port: u16, service: &str) -> anyhow::Result<PluginResult>;
}

/// On-disk description of one plugin instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginManifest {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub params: toml::Table,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

impl PluginManifest {
    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn metadata(&self) -> PluginMetadata {
        PluginMetadata {
            name: self.name.clone(),
            description: self.description.clone(),
            severity: self.severity,
            version: self.version.clone(),
            author: self.author.clone(),
        }
    }
}

pub struct PluginRegistry {
    plugins: Vec<Arc<dyn Plugin>>,
    index: HashMap<String, usize>,
    timeout: Duration,
}

impl PluginRegistry {
    pub fn new(timeout: Duration) -> Self {
        Self {
            plugins: Vec::new(),
            index: HashMap::new(),
            timeout,
        }
    }

    /// Registry preloaded with the compiled-in checks.
    pub fn with_builtins(timeout: Duration) -> Self {
        let mut registry = Self::new(timeout);
        for plugin in checks::builtin_catalog(timeout) {
            registry.register(plugin);
        }
        registry
    }

    /// Registry holding exactly the given plugins.
    pub fn with_plugins(timeout: Duration, plugins: Vec<Arc<dyn Plugin>>) -> Self {
        let mut registry = Self::new(timeout);
        for plugin in plugins {
            registry.register(plugin);
        }
        registry
    }

    /// Register a plugin under its name. A plugin with the same name is replaced
    /// in place and returned.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) -> Option<Arc<dyn Plugin>> {
        let name = plugin.name().to_string();

        match self.index.get(&name) {
            Some(&slot) => {
                warn!("Plugin '{}' already registered, replacing it", name);
                Some(std::mem::replace(&mut self.plugins[slot], plugin))
            }
            None => {
                info!("Loaded plugin: {}", name);
                self.index.insert(name, self.plugins.len());
                self.plugins.push(plugin);
                None
            }
        }
    }

    /// Register every `*.toml` manifest in `dir`, in file-name order.
    ///
    /// Manifests that fail to parse or name an unknown kind are logged and
    /// skipped. Loading the same directory again re-registers under the same
    /// names instead of duplicating. Returns the number of manifests loaded.
    pub fn load(&mut self, dir: impl AsRef<Path>) -> Result<usize> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(ScanError::PluginDirectory(dir.display().to_string()));
        }

        info!("Loading plugins from: {}", dir.display());

        let mut manifests: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && path.extension().map_or(false, |ext| ext == "toml"))
            .collect();
        manifests.sort();

        let mut loaded = 0;
        for path in manifests {
            match self.load_manifest(&path) {
                Ok(name) => {
                    debug!("Loaded plugin {} from {}", name, path.display());
                    loaded += 1;
                }
                Err(e) => warn!("Error loading plugin {}: {}", path.display(), e),
            }
        }

        info!("Loaded {} plugins from {}", loaded, dir.display());
        Ok(loaded)
    }

    fn load_manifest(&mut self, path: &Path) -> Result<String> {
        let manifest_error = |message: String| ScanError::PluginManifest {
            path: path.display().to_string(),
            message,
        };

        let content = std::fs::read_to_string(path)?;
        let manifest = PluginManifest::from_toml(&content).map_err(|e| manifest_error(e.to_string()))?;
        let plugin = checks::build(&manifest, self.timeout).map_err(manifest_error)?;

        let name = plugin.name().to_string();
        self.register(plugin);
        Ok(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.index.get(name).map(|&slot| Arc::clone(&self.plugins[slot]))
    }

    pub fn names(&self) -> Vec<String> {
        self.plugins.iter().map(|p| p.name().to_string()).collect()
    }

    pub fn list(&self) -> Vec<PluginMetadata> {
        self.plugins.iter().map(|p| p.metadata().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Run one plugin by name.
    pub async fn run(&self, name: &str, target: &str, port: u16, service: &str) -> PluginResult {
        match self.get(name) {
            Some(plugin) => self.invoke(plugin.as_ref(), target, port, service).await,
            None => {
                warn!("Plugin not found: {}", name);
                PluginResult::not_found(name, target, port, service)
            }
        }
    }

    /// Run every plugin in registration order, one after another.
    pub async fn run_all(&self, target: &str, port: u16, service: &str) -> Vec<PluginResult> {
        let mut results = Vec::with_capacity(self.plugins.len());
        for plugin in &self.plugins {
            results.push(self.invoke(plugin.as_ref(), target, port, service).await);
        }
        results
    }

    async fn invoke(&self, plugin: &dyn Plugin, target: &str, port: u16, service: &str) -> PluginResult {
        let name = plugin.name();
        let guarded = AssertUnwindSafe(plugin.check(target, port, service)).catch_unwind();

        let result = match timeout(self.timeout, guarded).await {
            Ok(Ok(Ok(result))) => result,
            Ok(Ok(Err(e))) => {
                error!("Error running plugin {}: {:#}", name, e);
                PluginResult::error(name, target, port, service, format!("Error - {:#}", e))
            }
            Ok(Err(panic)) => {
                let message = panic_message(&*panic);
                error!("Plugin {} panicked: {}", name, message);
                PluginResult::error(name, target, port, service, format!("Plugin panicked - {}", message))
            }
            Err(_) => {
                error!("Plugin {} timed out after {:?}", name, self.timeout);
                PluginResult::error(
                    name,
                    target,
                    port,
                    service,
                    format!("Timed out after {}s", self.timeout.as_secs_f64()),
                )
            }
        };

        info!("[{}] {}", name, result.status);
        result
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PluginState;
    use std::io::Write;
    use tempfile::TempDir;

    struct StaticPlugin {
        metadata: PluginMetadata,
        vulnerable: bool,
    }

    #[async_trait]
    impl Plugin for StaticPlugin {
        fn metadata(&self) -> &PluginMetadata {
            &self.metadata
        }

        async fn check(&self, target: &str, port: u16, service: &str) -> anyhow::Result<PluginResult> {
            let result = if self.vulnerable {
                PluginResult::vulnerable(self.name(), target, port, service, "Vulnerable")
            } else {
                PluginResult::safe(self.name(), target, port, service, "Safe")
            };
            Ok(result)
        }
    }

    struct FailingPlugin {
        metadata: PluginMetadata,
        panics: bool,
    }

    #[async_trait]
    impl Plugin for FailingPlugin {
        fn metadata(&self) -> &PluginMetadata {
            &self.metadata
        }

        async fn check(&self, _target: &str, _port: u16, _service: &str) -> anyhow::Result<PluginResult> {
            if self.panics {
                panic!("boom");
            }
            anyhow::bail!("connection reset by peer")
        }
    }

    fn static_plugin(name: &str, vulnerable: bool) -> Arc<dyn Plugin> {
        Arc::new(StaticPlugin {
            metadata: PluginMetadata::new(name, "test", Severity::Low),
            vulnerable,
        })
    }

    fn failing_plugin(name: &str, panics: bool) -> Arc<dyn Plugin> {
        Arc::new(FailingPlugin {
            metadata: PluginMetadata::new(name, "always fails", Severity::High),
            panics,
        })
    }

    #[tokio::test]
    async fn unknown_plugin_is_not_found() {
        let registry = PluginRegistry::new(Duration::from_secs(1));
        let result = registry.run("Missing", "10.0.0.1", 80, "HTTP").await;
        assert_eq!(result.state, PluginState::NotFound);
        assert!(!result.vulnerable);
        assert!(result.status.contains("Missing"));
    }

    #[tokio::test]
    async fn failing_plugin_yields_one_error_result() {
        let mut registry = PluginRegistry::new(Duration::from_secs(1));
        registry.register(failing_plugin("Broken", false));

        let result = registry.run("Broken", "10.0.0.1", 21, "FTP").await;
        assert_eq!(result.state, PluginState::Failed);
        assert!(result.status.contains("connection reset"));
        assert_eq!(result.plugin, "Broken");
        assert_eq!(result.port, 21);
    }

    #[tokio::test]
    async fn run_all_continues_past_failures_and_panics() {
        let mut registry = PluginRegistry::new(Duration::from_secs(1));
        registry.register(static_plugin("First", true));
        registry.register(failing_plugin("Panicky", true));
        registry.register(failing_plugin("Broken", false));
        registry.register(static_plugin("Last", false));

        let results = registry.run_all("10.0.0.1", 80, "HTTP").await;
        let names: Vec<&str> = results.iter().map(|r| r.plugin.as_str()).collect();
        assert_eq!(names, vec!["First", "Panicky", "Broken", "Last"]);
        assert!(results[0].vulnerable);
        assert!(results[1].is_error());
        assert!(results[1].status.contains("boom"));
        assert!(results[2].is_error());
        assert!(!results[3].is_error());
    }

    #[test]
    fn same_name_replaces_in_place() {
        let mut registry = PluginRegistry::new(Duration::from_secs(1));
        registry.register(static_plugin("A", false));
        registry.register(static_plugin("B", false));
        let replaced = registry.register(static_plugin("A", true));

        assert!(replaced.is_some());
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), vec!["A", "B"]);
    }

    #[test]
    fn load_reads_manifests_and_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut file = std::fs::File::create(dir.path().join("10-sample.toml")).unwrap();
        file.write_all(
            br#"
name = "Lab Sample"
kind = "sample"
description = "Template check"
severity = "Info"
"#,
        )
        .unwrap();

        let mut file = std::fs::File::create(dir.path().join("20-telnet.toml")).unwrap();
        file.write_all(
            br#"
name = "Telnet Banner"
kind = "banner-match"
severity = "medium"

[params]
pattern = "(?i)telnet"
"#,
        )
        .unwrap();

        std::fs::write(dir.path().join("30-broken.toml"), "name = ").unwrap();
        std::fs::write(dir.path().join("40-unknown.toml"), "name = \"X\"\nkind = \"nope\"\n").unwrap();
        std::fs::write(dir.path().join("README.md"), "not a plugin").unwrap();

        let mut registry = PluginRegistry::new(Duration::from_secs(1));
        assert_eq!(registry.load(dir.path()).unwrap(), 2);
        assert_eq!(registry.load(dir.path()).unwrap(), 2);
        assert_eq!(registry.names(), vec!["Lab Sample", "Telnet Banner"]);

        let telnet = registry.get("Telnet Banner").unwrap();
        assert_eq!(telnet.metadata().severity, Severity::Medium);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let mut registry = PluginRegistry::new(Duration::from_secs(1));
        assert!(registry.load("/definitely/not/here").is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn builtins_are_listed() {
        let registry = PluginRegistry::with_builtins(Duration::from_secs(1));
        let names = registry.names();
        assert!(names.contains(&"FTP Anonymous Login".to_string()));
        assert!(names.contains(&"Weak Security Headers".to_string()));
        assert!(names.contains(&"Sample Plugin".to_string()));
        assert_eq!(registry.list().len(), registry.len());
    }

    #[tokio::test]
    async fn web_suite_registry_isolates_failing_checks() {
        // Nothing listens on a just-released port, so every web check fails.
        let closed = {
            let temp = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            temp.local_addr().unwrap().port()
        };
        let registry = PluginRegistry::with_plugins(Duration::from_secs(2), checks::web_suite(Duration::from_secs(1)));
        assert_eq!(registry.len(), 4);

        let results = registry.run_all("127.0.0.1", closed, "HTTP").await;
        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|r| r.state == PluginState::Failed));
    }
}
