//! Block device serializer.
//!
//! Exports `block.<index>.<suffix>.<discriminator>` counters as
//! `<base>_<discriminator>_<suffix>{domain, blockid}`; `block.0.rd.bytes`
//! becomes `block_bytes_rd`. Per-device scalars such as `block.0.capacity`
//! and the device name/path strings are not exported. With identity labels
//! on, `uuid` follows `blockid` after a comma.

use tracing::trace;

use super::{metric_name, with_identity, SerializerOptions};
use crate::exposition::{Document, LabelSet, MetricKind, Separator};
use crate::fieldpath;
use crate::hypervisor::StatsSnapshot;

pub fn serialize(snapshot: &StatsSnapshot, options: &SerializerOptions, doc: &mut Document) -> usize {
    let mut emitted = 0;

    for record in snapshot {
        for param in &record.params {
            let tokens = fieldpath::split(&param.field);
            let (base, index, suffix, discriminator) = match tokens.as_slice() {
                [base, index, suffix, discriminator] => (*base, *index, *suffix, *discriminator),
                _ => continue,
            };
            let Some(value) = param.value.as_u64() else {
                trace!("Skipping non-numeric block parameter {}", param.field);
                continue;
            };

            let metric = metric_name(options, &[base, discriminator, suffix]);
            let labels = LabelSet::new()
                .comma("domain", &record.domain.name)
                .space("blockid", index);
            let labels = with_identity(labels, Separator::Comma, &record.domain, options);

            doc.sample(&metric, MetricKind::Counter, &labels, value);
            emitted += 1;
        }
    }

    emitted
}
