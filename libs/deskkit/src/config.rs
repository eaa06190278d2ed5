//! Application configuration.
//!
//! Layers, lowest priority first:
//! 1. built-in defaults
//! 2. YAML file (`--config`)
//! 3. environment, `DESKHOST__SECTION__KEY=value`
//! 4. CLI overrides ([`CliOverrides`])

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Yaml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::container::CollisionPolicy;

pub const ENV_PREFIX: &str = "DESKHOST__";
pub const DEFAULT_PLUGIN_PATTERN: &str = "deskhost.*.plugin.yaml";
pub const DEFAULT_LOG_FILE: &str = "log.log";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("config file does not exist: {}", path.display())]
    MissingFile { path: PathBuf },

    #[error("invalid configuration: {0}")]
    Invalid(#[from] Box<figment::Error>),

    #[error("invalid value for '{field}': {reason}")]
    Value { field: &'static str, reason: String },

    #[error("failed to render configuration: {0}")]
    Render(#[from] serde_json::Error),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub server: ServerConfig,
    pub plugins: PluginConfig,
    pub registry: RegistryConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub title: String,
    pub product_name: String,
    pub version: String,
    pub service_name: String,
    /// Name of the UI entry that owns the main thread.
    pub main_entry: String,
    /// Refuse to start while another process of the same title and version runs.
    pub single_instance: bool,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            title: "DeskHost".to_owned(),
            product_name: "DeskHost".to_owned(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
            service_name: "deskhost".to_owned(),
            main_entry: "console".to_owned(),
            single_instance: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Use the fixed development port when no explicit port is set.
    pub dev_mode: bool,
    /// Start the embedded endpoint before the UI loop.
    pub autostart: bool,
    pub port: Option<u16>,
    pub ready_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub stop_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            dev_mode: false,
            autostart: true,
            port: None,
            ready_timeout_ms: 5_000,
            poll_interval_ms: 500,
            stop_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    /// Directory searched for manifests; the executable's directory when unset.
    pub dir: Option<PathBuf>,
    pub pattern: String,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            dir: None,
            pattern: DEFAULT_PLUGIN_PATTERN.to_owned(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub on_collision: CollisionPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
    pub console: bool,
    pub file: bool,
    /// Log directory; `<data dir>/Logs` when unset.
    pub dir: Option<PathBuf>,
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            console: true,
            file: true,
            dir: None,
            max_files: 15,
        }
    }
}

/// Values taken from the command line.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub port: Option<u16>,
    pub dev: bool,
    /// `-v` info, `-vv` debug, `-vvv` trace.
    pub verbose: u8,
}

impl AppConfig {
    /// Load defaults, then the YAML file if given, then the environment.
    ///
    /// # Errors
    /// Returns [`ConfigError::MissingFile`] if `path` does not exist, or
    /// [`ConfigError::Invalid`] if a layer cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(AppConfig::default()));
        if let Some(path) = path {
            if !path.is_file() {
                return Err(ConfigError::MissingFile {
                    path: path.to_path_buf(),
                });
            }
            figment = figment.merge(Yaml::file(path));
        }
        let config: AppConfig = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_cli_overrides(&mut self, cli: &CliOverrides) {
        if let Some(port) = cli.port {
            self.server.port = Some(port);
        }
        if cli.dev {
            self.server.dev_mode = true;
        }
        match cli.verbose {
            0 => {}
            1 => "info".clone_into(&mut self.logging.level),
            2 => "debug".clone_into(&mut self.logging.level),
            _ => "trace".clone_into(&mut self.logging.level),
        }
    }

    /// # Errors
    /// Returns [`ConfigError::Value`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.app.main_entry.trim().is_empty() {
            return Err(ConfigError::Value {
                field: "app.main_entry",
                reason: "must not be empty".to_owned(),
            });
        }
        if self.server.ready_timeout_ms == 0 {
            return Err(ConfigError::Value {
                field: "server.ready_timeout_ms",
                reason: "must be greater than zero".to_owned(),
            });
        }
        if self.server.poll_interval_ms == 0
            || self.server.poll_interval_ms > self.server.ready_timeout_ms
        {
            return Err(ConfigError::Value {
                field: "server.poll_interval_ms",
                reason: "must be between 1 and server.ready_timeout_ms".to_owned(),
            });
        }
        if let Err(e) = glob::Pattern::new(&self.plugins.pattern) {
            return Err(ConfigError::Value {
                field: "plugins.pattern",
                reason: e.to_string(),
            });
        }
        if self.logging.max_files == 0 {
            return Err(ConfigError::Value {
                field: "logging.max_files",
                reason: "must be greater than zero".to_owned(),
            });
        }
        Ok(())
    }

    /// # Errors
    /// Returns [`ConfigError::Render`] if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Installation paths and version strings, registered as a singleton.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppInfo {
    pub title: String,
    pub version: String,
    pub product_name: String,
    pub service_name: String,
    /// Directory of the running executable.
    pub base_dir: PathBuf,
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub plugin_dir: PathBuf,
}

impl AppInfo {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        let base_dir = executable_dir();
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| base_dir.clone())
            .join(&config.app.product_name);
        let log_dir = config
            .logging
            .dir
            .clone()
            .unwrap_or_else(|| data_dir.join("Logs"));
        let plugin_dir = config
            .plugins
            .dir
            .clone()
            .unwrap_or_else(|| base_dir.clone());
        Self {
            title: config.app.title.clone(),
            version: config.app.version.clone(),
            product_name: config.app.product_name.clone(),
            service_name: config.app.service_name.clone(),
            base_dir,
            data_dir,
            log_dir,
            plugin_dir,
        }
    }

    /// `"{title} v{version}"`.
    #[must_use]
    pub fn title_version(&self) -> String {
        format!("{} v{}", self.title, self.version)
    }
}

fn executable_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}
