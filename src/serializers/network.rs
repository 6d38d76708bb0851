//! Network interface serializer.
//!
//! libvirt reports each interface as a `net.<index>.name` string followed by
//! `net.<index>.<suffix>.<discriminator>` counters, e.g. `net.0.rx.bytes`.
//! The name parameter is not exported; it becomes the `name` label of the
//! counters with the same index. Counters are exported as
//! `<base>_<discriminator>_<suffix>`, so `net.0.rx.bytes` becomes
//! `net_bytes_rx`.

use ahash::AHashMap as HashMap;
use tracing::trace;

use super::{metric_name, with_identity, SerializerOptions};
use crate::exposition::{Document, LabelSet, MetricKind, Separator};
use crate::fieldpath;
use crate::hypervisor::StatsSnapshot;

pub fn serialize(snapshot: &StatsSnapshot, options: &SerializerOptions, doc: &mut Document) -> usize {
    let mut emitted = 0;

    for record in snapshot {
        // interface index -> name, for this record only
        let mut names: HashMap<&str, &str> = HashMap::new();

        for param in &record.params {
            let tokens = fieldpath::split(&param.field);
            match tokens.as_slice() {
                [_, index, _] => {
                    if let Some(name) = param.value.as_str() {
                        names.insert(*index, name);
                    }
                }
                [base, index, suffix, discriminator] => {
                    let Some(value) = param.value.as_u64() else {
                        trace!("Skipping non-numeric interface parameter {}", param.field);
                        continue;
                    };

                    let metric = metric_name(options, &[*base, *discriminator, *suffix]);
                    let labels = LabelSet::new()
                        .comma("domain", &record.domain.name)
                        .space("interfaceid", index)
                        .comma("name", names.get(*index).copied().unwrap_or(""));
                    let labels = with_identity(labels, Separator::Space, &record.domain, options);

                    doc.sample(&metric, MetricKind::Counter, &labels, value);
                    emitted += 1;
                }
                _ => {}
            }
        }
    }

    emitted
}
