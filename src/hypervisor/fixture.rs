//! Fixture backend: a virtualization host described by a JSON document.
//!
//! Selected with a `fixture://<path>` URI. The file is re-read on every
//! domain listing, so edits show up on the next scrape without a restart.
//! Used for demos, load tests and the integration tests.
//!
//! ```json
//! {
//!   "domains": [
//!     {
//!       "name": "vm1",
//!       "uuid": "43dc0cf8-809b-4adb-9bea-a9abb5f3d90e",
//!       "stats": {
//!         "vcpu": [{ "field": "vcpu.0.time", "value": 100 }],
//!         "interface": [
//!           { "field": "net.0.name", "value": "eth0" },
//!           { "field": "net.0.rx.bytes", "value": 4096 }
//!         ]
//!       }
//!     }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{Hypervisor, HypervisorError, Parameter, ResourceClass, StatsRecord, TypedValue};

/// Root of a fixture file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FixtureDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<String>,
    #[serde(default)]
    pub domains: Vec<FixtureDomain>,
}

/// A domain in a fixture file. Also serves as the domain handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureDomain {
    pub name: String,
    #[serde(default)]
    pub uuid: String,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Metadata elements keyed by namespace URI.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub stats: FixtureStats,
}

fn default_active() -> bool {
    true
}

/// Parameters per resource class.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FixtureStats {
    #[serde(default)]
    pub vcpu: Vec<FixtureParameter>,
    #[serde(default)]
    pub interface: Vec<FixtureParameter>,
    #[serde(default)]
    pub block: Vec<FixtureParameter>,
}

impl FixtureStats {
    pub fn for_class(&self, class: ResourceClass) -> &[FixtureParameter] {
        match class {
            ResourceClass::Vcpu => &self.vcpu,
            ResourceClass::Interface => &self.interface,
            ResourceClass::Block => &self.block,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureParameter {
    pub field: String,
    pub value: FixtureValue,
}

impl FixtureParameter {
    pub fn new(field: impl Into<String>, value: FixtureValue) -> Self {
        Self {
            field: field.into(),
            value,
        }
    }
}

/// JSON scalar of a fixture parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FixtureValue {
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl From<&FixtureValue> for TypedValue {
    fn from(value: &FixtureValue) -> Self {
        match value {
            FixtureValue::Unsigned(v) => TypedValue::ULLong(*v),
            FixtureValue::Signed(v) => TypedValue::LLong(*v),
            FixtureValue::Float(v) => TypedValue::Double(*v),
            FixtureValue::Bool(v) => TypedValue::Boolean(*v),
            FixtureValue::Text(v) => TypedValue::String(v.clone()),
        }
    }
}

#[derive(Debug, Clone)]
enum FixtureSource {
    File(PathBuf),
    Static(FixtureDocument),
}

/// Hypervisor backed by a fixture document.
#[derive(Debug, Clone)]
pub struct FixtureHypervisor {
    source: FixtureSource,
}

impl FixtureHypervisor {
    /// Backend that reads `path` on every listing.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            source: FixtureSource::File(path.into()),
        }
    }

    /// Backend over an in-memory document.
    pub fn from_document(document: FixtureDocument) -> Self {
        Self {
            source: FixtureSource::Static(document),
        }
    }

    fn load(&self) -> Result<FixtureDocument, HypervisorError> {
        match &self.source {
            FixtureSource::Static(doc) => Ok(doc.clone()),
            FixtureSource::File(path) => read_document(path),
        }
    }
}

/// Reads and parses a fixture file.
pub fn read_document(path: &Path) -> Result<FixtureDocument, HypervisorError> {
    let content = fs::read_to_string(path).map_err(|source| HypervisorError::FixtureIo {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| HypervisorError::FixtureParse {
        path: path.to_path_buf(),
        source,
    })
}

impl Hypervisor for FixtureHypervisor {
    type Domain = FixtureDomain;

    fn list_active_domains(&self) -> Result<Vec<FixtureDomain>, HypervisorError> {
        let document = self.load()?;
        let total = document.domains.len();
        let active: Vec<_> = document.domains.into_iter().filter(|d| d.active).collect();
        debug!("Fixture lists {} of {} domains as active", active.len(), total);
        Ok(active)
    }

    fn domain_name(&self, domain: &FixtureDomain) -> Result<String, HypervisorError> {
        Ok(domain.name.clone())
    }

    fn domain_uuid(&self, domain: &FixtureDomain) -> Result<String, HypervisorError> {
        Ok(domain.uuid.clone())
    }

    fn domain_metadata(
        &self,
        domain: &FixtureDomain,
        namespace: &str,
    ) -> Result<Option<String>, HypervisorError> {
        Ok(domain.metadata.get(namespace).cloned())
    }

    fn get_stats(
        &self,
        domains: &[FixtureDomain],
        class: ResourceClass,
    ) -> Result<Vec<StatsRecord>, HypervisorError> {
        let records = domains
            .iter()
            .enumerate()
            .filter_map(|(index, domain)| {
                let params: Vec<Parameter> = domain
                    .stats
                    .for_class(class)
                    .iter()
                    .map(|p| Parameter::new(p.field.clone(), TypedValue::from(&p.value)))
                    .collect();
                if params.is_empty() {
                    None
                } else {
                    Some(StatsRecord {
                        domain: index,
                        params,
                    })
                }
            })
            .collect();
        Ok(records)
    }
}
