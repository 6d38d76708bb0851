//! Configuration management for herakles-libvirt-exporter.
//!
//! This module handles loading, merging, and validating configuration from files
//! and CLI arguments. It supports YAML, JSON, and TOML formats.

use crate::cli::{Args, ConfigFormat};
use crate::collector::CollectorOptions;
use crate::connection::DEFAULT_READ_BUFFER_BYTES;
use crate::serializers::SerializerOptions;
use crate::server::{ServerOptions, DEFAULT_BACKLOG, DEFAULT_MAX_EVENTS};
use crate::tenant::DEFAULT_TENANT_NAMESPACE;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tracing::info;

// Default configuration constants
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";

const DEFAULT_CONFIG_PATHS: [&str; 6] = [
    "/etc/herakles/libvirt-exporter.yaml",
    "/etc/herakles/libvirt-exporter.yml",
    "/etc/herakles/libvirt-exporter.json",
    "./herakles-libvirt-exporter.yaml",
    "./herakles-libvirt-exporter.yml",
    "./herakles-libvirt-exporter.json",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Listener
    pub bind: Option<String>,
    pub backlog: Option<i32>,
    #[serde(alias = "max-events")]
    pub max_events: Option<usize>,
    #[serde(alias = "read-buffer-bytes")]
    pub read_buffer_bytes: Option<usize>,

    // Exposition
    #[serde(alias = "metric-prefix")]
    pub metric_prefix: Option<String>,
    /// Adds uuid and tenant labels to every sample
    #[serde(alias = "identity-labels")]
    pub identity_labels: Option<bool>,
    /// Metadata namespace holding the tenant element
    #[serde(alias = "tenant-namespace")]
    pub tenant_namespace: Option<String>,
    #[serde(alias = "escape-label-values")]
    pub escape_label_values: Option<bool>,

    // Logging
    #[serde(alias = "log-level")]
    pub log_level: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: Some(DEFAULT_BIND_ADDR.to_string()),
            backlog: Some(DEFAULT_BACKLOG),
            max_events: Some(DEFAULT_MAX_EVENTS),
            read_buffer_bytes: Some(DEFAULT_READ_BUFFER_BYTES),
            metric_prefix: Some(String::new()),
            identity_labels: Some(false),
            tenant_namespace: Some(DEFAULT_TENANT_NAMESPACE.to_string()),
            escape_label_values: Some(false),
            log_level: Some("info".into()),
        }
    }
}

impl Config {
    fn bind_addr(&self) -> Result<IpAddr, String> {
        let bind = self.bind.as_deref().unwrap_or(DEFAULT_BIND_ADDR);
        bind.parse()
            .map_err(|_| format!("Invalid bind address '{}'", bind))
    }

    /// Listener settings for `port`. Call after `validate_effective_config`.
    pub fn server_options(&self, port: u16) -> Result<ServerOptions, Box<dyn std::error::Error>> {
        Ok(ServerOptions {
            bind: self.bind_addr()?,
            port,
            backlog: self.backlog.unwrap_or(DEFAULT_BACKLOG),
            max_events: self.max_events.unwrap_or(DEFAULT_MAX_EVENTS),
            read_buffer_bytes: self.read_buffer_bytes.unwrap_or(DEFAULT_READ_BUFFER_BYTES),
        })
    }

    pub fn collector_options(&self) -> CollectorOptions {
        CollectorOptions {
            serializer: SerializerOptions {
                prefix: self.metric_prefix.clone().unwrap_or_default(),
                identity_labels: self.identity_labels.unwrap_or(false),
            },
            tenant_namespace: self
                .tenant_namespace
                .clone()
                .unwrap_or_else(|| DEFAULT_TENANT_NAMESPACE.to_string()),
            escape_label_values: self.escape_label_values.unwrap_or(false),
        }
    }
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    cfg.bind_addr()?;

    if cfg.backlog.is_some_and(|b| b <= 0) {
        return Err("backlog must be greater than 0".into());
    }
    if cfg.max_events == Some(0) {
        return Err("max_events must be greater than 0".into());
    }
    if cfg.read_buffer_bytes == Some(0) {
        return Err("read_buffer_bytes must be greater than 0".into());
    }

    if let Some(prefix) = cfg.metric_prefix.as_deref() {
        let valid = prefix
            .chars()
            .enumerate()
            .all(|(i, c)| c == '_' || c == ':' || c.is_ascii_alphabetic() || (i > 0 && c.is_ascii_digit()));
        if !valid {
            return Err(format!(
                "Invalid metric_prefix '{}', expected [a-zA-Z_:][a-zA-Z0-9_:]*",
                prefix
            )
            .into());
        }
    }

    if cfg.identity_labels.unwrap_or(false)
        && cfg
            .tenant_namespace
            .as_deref()
            .is_some_and(|ns| ns.trim().is_empty())
    {
        return Err("identity_labels is enabled but tenant_namespace is empty".into());
    }

    if let Some(level) = cfg.log_level.as_deref() {
        match level {
            "off" | "error" | "warn" | "info" | "debug" | "trace" => {}
            other => {
                return Err(format!(
                    "Invalid log_level '{}', expected off/error/warn/info/debug/trace",
                    other
                )
                .into());
            }
        }
    }

    Ok(())
}

/// Resolves configuration from CLI args, config file, and defaults.
/// This enforces precedence: CLI (if provided) > config file > default.
pub fn resolve_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    if let Some(bind_ip) = args.bind {
        config.bind = Some(bind_ip.to_string());
    }
    if let Some(prefix) = &args.metric_prefix {
        config.metric_prefix = Some(prefix.clone());
    }
    if args.identity_labels {
        config.identity_labels = Some(true);
    }
    if args.escape_label_values {
        config.escape_label_values = Some(true);
    }

    Ok(config)
}

/// Loads a config file, or the first default path that exists, or defaults.
pub fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(format!("Config file not found: {}", p.display()).into());
            }
            p.to_path_buf()
        }
        None => match DEFAULT_CONFIG_PATHS
            .iter()
            .find(|p| Path::new(p).exists())
            .map(PathBuf::from)
        {
            Some(p) => p,
            None => return Ok(Config::default()),
        },
    };

    let content = fs::read_to_string(&path)?;

    match path.extension().and_then(|s| s.to_str()) {
        Some("json") => {
            let config: Config = serde_json::from_str(&content)?;
            info!("Loaded JSON configuration from: {}", path.display());
            Ok(config)
        }
        Some("toml") => {
            let config: Config = toml::from_str(&content)?;
            info!("Loaded TOML configuration from: {}", path.display());
            Ok(config)
        }
        _ => {
            // Default to YAML
            let config: Config = serde_yaml::from_str(&content)?;
            info!("Loaded YAML configuration from: {}", path.display());
            Ok(config)
        }
    }
}

/// Renders configuration in the requested format
pub fn render_config(config: &Config, format: ConfigFormat) -> Result<String, Box<dyn std::error::Error>> {
    Ok(match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    })
}

/// Shows configuration in requested format
pub fn show_config(config: &Config, format: ConfigFormat) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", render_config(config, format)?);
    Ok(())
}
