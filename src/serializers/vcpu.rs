//! Compute-unit (vCPU) serializer.
//!
//! Only `<base>.<index>.<suffix>` parameters are exported, as
//! `<base>_<suffix>{domain, vcpu}`. Scalar counts such as `vcpu.current`
//! are skipped.

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
            let (base, index, suffix) = match tokens.as_slice() {
                [base, index, suffix] => (*base, *index, *suffix),
                _ => continue,
            };
            let Some(value) = param.value.as_u64() else {
                trace!("Skipping non-numeric vcpu parameter {}", param.field);
                continue;
            };

            let name = metric_name(options, &[base, suffix]);
            let labels = LabelSet::new()
                .comma("domain", &record.domain.name)
                .comma("vcpu", index);
            let labels = with_identity(labels, Separator::Space, &record.domain, options);

            doc.sample(&name, MetricKind::Counter, &labels, value);
            emitted += 1;
        }
    }

    emitted
}
