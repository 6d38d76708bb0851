//! CLI arguments and subcommands for herakles-libvirt-exporter.
//!
//! The serving form takes two positionals, `<port> <virtualization-uri>`.
//! They are collected raw and checked in `main` so that a wrong count or an
//! unparsable port prints the usage line and exits with status 1.

use clap::{Parser, Subcommand, ValueEnum};
use std::net::IpAddr;
use std::path::PathBuf;

pub const USAGE: &str = "usage: herakles-libvirt-exporter [OPTIONS] <port> <virtualization-uri>";

/// Log level options for CLI parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Configuration format options for output
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "herakles-libvirt-exporter",
    about = "Prometheus exporter for libvirt domain vCPU, network and block statistics",
    long_about = "Prometheus exporter for libvirt domain vCPU, network and block statistics.\n\n\
                  Serves a full snapshot of all active domains in Prometheus text format \
                  whenever a connected client sends any data. One thread, one readiness loop.",
    author = "Michael Moll <exporter@herakles.now> - Herakles",
    version,
    propagate_version = true,
    after_help = "Virtualization URIs: qemu:///system, qemu+ssh://host/system, fixture:///path/to/stats.json"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Listen port followed by the virtualization URI
    #[arg(value_name = "PORT URI", num_args = 0..)]
    pub positional: Vec<String>,

    /// Bind to specific interface/IP
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Log level (overrides config, default: info)
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// Prefix prepended to every metric name (e.g. "libvirt_")
    #[arg(long)]
    pub metric_prefix: Option<String>,

    /// Add uuid and tenant labels to every sample
    #[arg(long)]
    pub identity_labels: bool,

    /// Escape backslash, quote and newline in label values
    #[arg(long)]
    pub escape_label_values: bool,
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run collection cycles and print the last document
    Test {
        /// Virtualization URI to collect from
        #[arg(short = 'u', long)]
        uri: String,

        /// Number of collection cycles
        #[arg(short = 'n', long, default_value = "1")]
        iterations: usize,

        /// Print per-domain details for every cycle
        #[arg(short = 'v', long)]
        verbose: bool,
    },

    /// Generate a synthetic fixture JSON file
    GenerateFixture {
        /// Output file path
        #[arg(short = 'o', long, default_value = "libvirt-fixture.json")]
        output: PathBuf,

        /// Number of active domains
        #[arg(long, default_value = "3")]
        domains: usize,

        /// vCPUs per domain
        #[arg(long, default_value = "2")]
        vcpus: usize,

        /// Network interfaces per domain
        #[arg(long, default_value = "1")]
        interfaces: usize,

        /// Block devices per domain
        #[arg(long, default_value = "1")]
        disks: usize,
    },
}

/// Port and URI of the serving form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServeTarget {
    pub port: u16,
    pub uri: String,
}

impl Args {
    /// Returns `None` when the positionals are not exactly a valid port and a URI.
    pub fn serve_target(&self) -> Option<ServeTarget> {
        match self.positional.as_slice() {
            [port, uri] => Some(ServeTarget {
                port: port.parse().ok()?,
                uri: uri.clone(),
            }),
            _ => None,
        }
    }
}
