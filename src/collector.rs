//! Stats collection and the collect→serialize pipeline.
//!
//! One cycle lists the active domains, resolves their identity, fetches a
//! snapshot per resource class and serializes it into a fresh document.
//! Nothing is cached between cycles. Domain handles live in a local vector
//! and are released when the cycle returns, whatever the outcome.

use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::exposition::Document;
use crate::hypervisor::{
    DomainIdentity, DomainStatsRecord, Hypervisor, HypervisorError, ResourceClass, StatsSnapshot,
};
use crate::serializers::{self, SerializerOptions};
use crate::tenant;

/// Options of a collector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorOptions {
    pub serializer: SerializerOptions,
    /// Metadata namespace holding the tenant element.
    pub tenant_namespace: String,
    /// Escape `\`, `"` and newlines in label values.
    pub escape_label_values: bool,
}

impl Default for CollectorOptions {
    fn default() -> Self {
        Self {
            serializer: SerializerOptions::default(),
            tenant_namespace: tenant::DEFAULT_TENANT_NAMESPACE.to_string(),
            escape_label_values: false,
        }
    }
}

/// Result of one collection cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Collection {
    pub body: String,
    pub domains: usize,
    pub samples: usize,
    pub duration: Duration,
}

/// Collects stats from an optional hypervisor connection.
pub struct StatsCollector<H> {
    hypervisor: Option<H>,
    options: CollectorOptions,
}

impl<H: Hypervisor> StatsCollector<H> {
    pub fn new(hypervisor: H, options: CollectorOptions) -> Self {
        Self {
            hypervisor: Some(hypervisor),
            options,
        }
    }

    /// Collector without a backend; every cycle yields the preamble only.
    pub fn disconnected(options: CollectorOptions) -> Self {
        Self {
            hypervisor: None,
            options,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.hypervisor.is_some()
    }

    pub fn options(&self) -> &CollectorOptions {
        &self.options
    }

    /// Lists the active domains; empty when disconnected.
    pub fn list_domains(&self) -> Result<Vec<H::Domain>, HypervisorError> {
        match &self.hypervisor {
            Some(hv) => hv.list_active_domains(),
            None => Ok(Vec::new()),
        }
    }

    /// Resolves the identity of each domain.
    ///
    /// A domain whose name cannot be resolved maps to `None` and is left
    /// out of every snapshot of this cycle.
    pub fn resolve_identities(&self, domains: &[H::Domain]) -> Vec<Option<DomainIdentity>> {
        let Some(hv) = &self.hypervisor else {
            return vec![None; domains.len()];
        };

        domains
            .iter()
            .map(|domain| {
                let name = match hv.domain_name(domain) {
                    Ok(name) => name,
                    Err(e) => {
                        warn!("Skipping domain: {}", e);
                        return None;
                    }
                };

                let mut identity = DomainIdentity::named(name);
                if self.options.serializer.identity_labels {
                    identity.uuid = hv.domain_uuid(domain).unwrap_or_else(|e| {
                        warn!("No UUID for domain {}: {}", identity.name, e);
                        String::new()
                    });
                    identity.tenant = match hv.domain_metadata(domain, &self.options.tenant_namespace) {
                        Ok(Some(xml)) => tenant::extract_tenant(&xml),
                        Ok(None) => None,
                        Err(e) => {
                            debug!("No tenant metadata for domain {}: {}", identity.name, e);
                            None
                        }
                    };
                }
                Some(identity)
            })
            .collect()
    }

    /// Fetches the snapshot of one resource class.
    ///
    /// Empty when there are no domains, no stats, or no backend.
    pub fn collect(
        &self,
        domains: &[H::Domain],
        identities: &[Option<DomainIdentity>],
        class: ResourceClass,
    ) -> Result<StatsSnapshot, HypervisorError> {
        let Some(hv) = &self.hypervisor else {
            return Ok(Vec::new());
        };
        if domains.is_empty() {
            return Ok(Vec::new());
        }

        let records = hv.get_stats(domains, class)?;
        let snapshot = records
            .into_iter()
            .filter_map(|record| {
                let identity = identities.get(record.domain)?.clone()?;
                Some(DomainStatsRecord {
                    domain: identity,
                    params: record.params,
                })
            })
            .collect();
        Ok(snapshot)
    }

    /// Runs one full collect→serialize cycle.
    ///
    /// Never fails: backend errors are logged and the affected part of the
    /// body is left out.
    pub fn run_cycle(&self) -> Collection {
        let start = Instant::now();
        let mut doc = Document::new(self.options.escape_label_values);

        if !self.is_connected() {
            warn!("No hypervisor connection, serving empty document");
        }

        let domains = match self.list_domains() {
            Ok(domains) => domains,
            Err(e) => {
                warn!("{}", e);
                Vec::new()
            }
        };
        let identities = self.resolve_identities(&domains);

        let mut samples = 0;
        for class in ResourceClass::ALL {
            match self.collect(&domains, &identities, class) {
                Ok(snapshot) => {
                    let emitted =
                        serializers::serialize(class, &snapshot, &self.options.serializer, &mut doc);
                    debug!(
                        "{} stats: {} records, {} samples",
                        class,
                        snapshot.len(),
                        emitted
                    );
                    samples += emitted;
                }
                Err(e) => warn!("{}", e),
            }
        }

        let domain_count = domains.len();
        drop(domains);

        let body = doc.into_body();
        let duration = start.elapsed();
        debug!(
            "Collection cycle: {} domains, {} samples, {} bytes in {:.2}ms",
            domain_count,
            samples,
            body.len(),
            duration.as_secs_f64() * 1000.0
        );

        Collection {
            body,
            domains: domain_count,
            samples,
            duration,
        }
    }
}
