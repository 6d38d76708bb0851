//! Herakles libvirt Exporter Library
//!
//! Exposes per-domain vCPU, network interface and block device statistics of
//! a virtualization host in the Prometheus text exposition format.
//!
//! Every scrape runs a fresh collection cycle: list active domains, fetch one
//! stats snapshot per resource class, serialize, respond. Serving happens on
//! one thread driven by a readiness loop.
//!
//! # Usage
//!
//! ```rust
//! use herakles_libvirt_exporter::collector::{CollectorOptions, StatsCollector};
//! use herakles_libvirt_exporter::hypervisor::fixture::FixtureDocument;
//! use herakles_libvirt_exporter::hypervisor::FixtureHypervisor;
//!
//! let hypervisor = FixtureHypervisor::from_document(FixtureDocument::default());
//! let collector = StatsCollector::new(hypervisor, CollectorOptions::default());
//!
//! let collection = collector.run_cycle();
//! assert_eq!(collection.body, "# prometheus data\n");
//! ```
//!
//! # Feature Flags
//!
//! - `libvirt`: enables the libvirt backend (links the system libvirt)

pub mod cli;
pub mod collector;
pub mod commands;
pub mod config;
pub mod connection;
pub mod exposition;
pub mod fieldpath;
pub mod hypervisor;
pub mod serializers;
pub mod server;
pub mod startup_checks;
pub mod tenant;

// Re-export main types for convenience
pub use collector::{Collection, CollectorOptions, StatsCollector};
pub use connection::ScrapeHandler;
pub use hypervisor::{Hypervisor, HypervisorError, ResourceClass};
pub use server::{Server, ServerError, ServerOptions};
