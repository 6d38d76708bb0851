//! Hypervisor backends and the stats data model.
//!
//! The exporter never talks to libvirt directly outside this module. A
//! [`Hypervisor`] lists the active domains, resolves their identity and
//! produces stats records for one resource class at a time. Domain handles
//! are owned by the caller for one collection cycle and released on drop.

pub mod fixture;
#[cfg(feature = "libvirt")]
pub mod libvirt;

use ahash::AHashMap as HashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tracing::debug;

pub use fixture::FixtureHypervisor;
#[cfg(feature = "libvirt")]
pub use libvirt::LibvirtHypervisor;

/// URI scheme selecting the fixture backend.
pub const FIXTURE_SCHEME: &str = "fixture://";

/// Errors reported by a hypervisor backend.
#[derive(Debug, thiserror::Error)]
pub enum HypervisorError {
    #[error("Failed to connect to hypervisor at {uri}: {reason}")]
    Connect { uri: String, reason: String },

    #[error("Failed to list active domains: {0}")]
    ListDomains(String),

    #[error("Failed to get {class} stats: {reason}")]
    Stats { class: ResourceClass, reason: String },

    #[error("Failed to resolve domain identity: {0}")]
    Identity(String),

    #[error("Failed to read fixture {path}: {source}")]
    FixtureIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse fixture {path}: {source}")]
    FixtureParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// One of the three resource classes collected per cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceClass {
    /// Virtual CPUs.
    Vcpu,
    /// Network interfaces.
    Interface,
    /// Block devices.
    Block,
}

impl ResourceClass {
    /// Collection order within a cycle.
    pub const ALL: [ResourceClass; 3] = [
        ResourceClass::Vcpu,
        ResourceClass::Interface,
        ResourceClass::Block,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceClass::Vcpu => "vcpu",
            ResourceClass::Interface => "interface",
            ResourceClass::Block => "block",
        }
    }
}

impl fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed value of a stats parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Int(i32),
    UInt(u32),
    LLong(i64),
    ULLong(u64),
    Double(f64),
    Boolean(bool),
    String(String),
}

impl TypedValue {
    /// Unsigned 64-bit rendering of the value, if it has one.
    ///
    /// Negative numbers, non-finite doubles and strings have none.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            TypedValue::Int(v) => u64::try_from(*v).ok(),
            TypedValue::UInt(v) => Some(u64::from(*v)),
            TypedValue::LLong(v) => u64::try_from(*v).ok(),
            TypedValue::ULLong(v) => Some(*v),
            TypedValue::Double(v) if v.is_finite() && *v >= 0.0 => Some(*v as u64),
            TypedValue::Double(_) => None,
            TypedValue::Boolean(v) => Some(u64::from(*v)),
            TypedValue::String(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TypedValue::String(s) => Some(s),
            _ => None,
        }
    }
}

/// A single stats parameter: dotted field path plus typed value.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub field: String,
    pub value: TypedValue,
}

impl Parameter {
    pub fn new(field: impl Into<String>, value: TypedValue) -> Self {
        Self {
            field: field.into(),
            value,
        }
    }

    pub fn ullong(field: impl Into<String>, value: u64) -> Self {
        Self::new(field, TypedValue::ULLong(value))
    }

    pub fn string(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(field, TypedValue::String(value.into()))
    }
}

/// Stats record as returned by a backend.
///
/// `domain` is the position of the record's domain in the slice passed to
/// [`Hypervisor::get_stats`].
#[derive(Debug, Clone, PartialEq)]
pub struct StatsRecord {
    pub domain: usize,
    pub params: Vec<Parameter>,
}

/// Resolved identity of a domain, valid for one collection cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainIdentity {
    pub name: String,
    pub uuid: String,
    /// Tenant identifier from the domain metadata, if any.
    pub tenant: Option<String>,
}

impl DomainIdentity {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Stats of one domain for one resource class.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainStatsRecord {
    pub domain: DomainIdentity,
    pub params: Vec<Parameter>,
}

/// Stats of all active domains for one resource class.
pub type StatsSnapshot = Vec<DomainStatsRecord>;

/// Read-only view of a virtualization host.
pub trait Hypervisor {
    /// Handle of a running domain. Dropping it releases it.
    type Domain;

    /// Lists the currently active domains.
    fn list_active_domains(&self) -> Result<Vec<Self::Domain>, HypervisorError>;

    fn domain_name(&self, domain: &Self::Domain) -> Result<String, HypervisorError>;

    fn domain_uuid(&self, domain: &Self::Domain) -> Result<String, HypervisorError>;

    /// Raw metadata element stored under `namespace`, if the domain has one.
    fn domain_metadata(
        &self,
        domain: &Self::Domain,
        namespace: &str,
    ) -> Result<Option<String>, HypervisorError>;

    /// Fetches stats for `domains` without waiting on busy domains.
    fn get_stats(
        &self,
        domains: &[Self::Domain],
        class: ResourceClass,
    ) -> Result<Vec<StatsRecord>, HypervisorError>;
}

/// Maps fetched `(uuid, params)` records to positions in the listed domains.
///
/// `listed` holds the uuid of each listed domain in listing order. Records
/// without a uuid, or for a domain that was not listed, are dropped and the
/// rest are kept.
#[cfg_attr(not(feature = "libvirt"), allow(dead_code))]
pub(crate) fn match_records_by_uuid(
    listed: &[Option<String>],
    fetched: Vec<(Option<String>, Vec<Parameter>)>,
    class: ResourceClass,
) -> Vec<StatsRecord> {
    let positions: HashMap<&str, usize> = listed
        .iter()
        .enumerate()
        .filter_map(|(index, uuid)| uuid.as_deref().map(|uuid| (uuid, index)))
        .collect();

    fetched
        .into_iter()
        .filter_map(|(uuid, params)| {
            let index = uuid.as_deref().and_then(|uuid| positions.get(uuid).copied());
            if index.is_none() {
                debug!("Skipping {} stats record of an unlisted domain {:?}", class, uuid);
            }
            Some(StatsRecord {
                domain: index?,
                params,
            })
        })
        .collect()
}

/// Backend selected by the virtualization URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendUri {
    Fixture(PathBuf),
    Libvirt(String),
}

impl BackendUri {
    pub fn parse(uri: &str) -> Self {
        match uri.strip_prefix(FIXTURE_SCHEME) {
            Some(path) => BackendUri::Fixture(PathBuf::from(path)),
            None => BackendUri::Libvirt(uri.to_string()),
        }
    }
}
