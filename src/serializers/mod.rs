//! Metric serializers, one per resource class.
//!
//! Each serializer walks a [`StatsSnapshot`], classifies parameters by the
//! token count of their field path and appends samples to a shared
//! [`Document`]. Parameters that do not fit the schema of their class are
//! skipped silently.

pub mod block;
pub mod network;
pub mod vcpu;

use crate::exposition::{Document, LabelSet, Separator};
use crate::hypervisor::{DomainIdentity, ResourceClass, StatsSnapshot};

/// Options shared by all serializers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SerializerOptions {
    /// Prefix prepended to every metric name, e.g. `libvirt_`.
    pub prefix: String,
    /// Adds `uuid` and `tenant` labels to every sample.
    pub identity_labels: bool,
}

/// Serializes `snapshot` with the serializer of `class`.
///
/// Returns the number of samples appended.
pub fn serialize(
    class: ResourceClass,
    snapshot: &StatsSnapshot,
    options: &SerializerOptions,
    doc: &mut Document,
) -> usize {
    match class {
        ResourceClass::Vcpu => vcpu::serialize(snapshot, options, doc),
        ResourceClass::Interface => network::serialize(snapshot, options, doc),
        ResourceClass::Block => block::serialize(snapshot, options, doc),
    }
}

/// Joins `parts` with `_` behind the configured prefix.
pub(crate) fn metric_name(options: &SerializerOptions, parts: &[&str]) -> String {
    let mut name = String::with_capacity(options.prefix.len() + 32);
    name.push_str(&options.prefix);
    name.push_str(&parts.join("_"));
    name
}

/// Appends `uuid="…" tenant="…"` when identity labels are enabled.
///
/// `uuid` follows `separator`; block samples put a comma there.
pub(crate) fn with_identity(
    labels: LabelSet,
    separator: Separator,
    domain: &DomainIdentity,
    options: &SerializerOptions,
) -> LabelSet {
    if !options.identity_labels {
        return labels;
    }
    labels
        .push(separator, "uuid", &domain.uuid)
        .space("tenant", domain.tenant.as_deref().unwrap_or(""))
}
