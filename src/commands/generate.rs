//! Generate-fixture command implementation.
//!
//! Writes a synthetic fixture JSON document, shaped like the stats libvirt
//! reports, for use with a `fixture://` URI.

use chrono::Utc;
use rand::Rng;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

use crate::hypervisor::fixture::{
    FixtureDocument, FixtureDomain, FixtureParameter, FixtureStats, FixtureValue,
};
use crate::tenant::DEFAULT_TENANT_NAMESPACE;

const GB: u64 = 1024 * 1024 * 1024;

// Ranges for generated counters
const MAX_VCPU_TIME_NS: u64 = 10_000 * 1_000_000_000; // 10000 s
const MAX_NETWORK_BYTES: u64 = 10 * GB;
const MAX_NETWORK_PACKETS: u64 = 1_000_000;
const MAX_DROPPED_PACKETS: u64 = 10_000;
const MAX_BLOCK_IO_BYTES: u64 = 50 * GB;
const MAX_BLOCK_IO_OPS: u64 = 100_000;
const MAX_BLOCK_IO_TIME_NS: u64 = 500 * 1_000_000_000;

/// Shape of a generated fixture.
#[derive(Debug, Clone, Copy)]
pub struct FixtureShape {
    pub domains: usize,
    pub vcpus: usize,
    pub interfaces: usize,
    pub disks: usize,
}

/// Generates synthetic fixture JSON file for testing purposes.
pub fn command_generate_fixture(
    output: PathBuf,
    shape: FixtureShape,
) -> Result<(), Box<dyn std::error::Error>> {
    debug!("Generating fixture {:?} into {}", shape, output.display());

    let document = generate_fixture(&mut rand::thread_rng(), shape);

    let json_content = serde_json::to_string_pretty(&document)?;
    fs::write(&output, &json_content)?;

    println!(
        "✅ Generated fixture: {} domains in {}",
        document.domains.len(),
        output.display()
    );
    println!("   Serve it with: herakles-libvirt-exporter 9177 fixture://{}", output.display());

    Ok(())
}

pub fn generate_fixture(rng: &mut impl Rng, shape: FixtureShape) -> FixtureDocument {
    let domains = (0..shape.domains)
        .map(|i| generate_domain(rng, i, shape))
        .collect();

    FixtureDocument {
        version: Some("1.0".to_string()),
        generated_at: Some(Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()),
        domains,
    }
}

fn generate_domain(rng: &mut impl Rng, index: usize, shape: FixtureShape) -> FixtureDomain {
    let tenant = random_uuid(rng);
    let mut metadata = BTreeMap::new();
    metadata.insert(
        DEFAULT_TENANT_NAMESPACE.to_string(),
        format!(
            "<instance xmlns=\"{}\"><tenant><uuid>{}</uuid></tenant></instance>",
            DEFAULT_TENANT_NAMESPACE, tenant
        ),
    );

    FixtureDomain {
        name: format!("instance-{:08x}", index + 1),
        uuid: random_uuid(rng),
        active: true,
        metadata,
        stats: FixtureStats {
            vcpu: vcpu_params(rng, shape.vcpus),
            interface: interface_params(rng, shape.interfaces),
            block: block_params(rng, shape.disks),
        },
    }
}

fn unsigned(field: String, value: u64) -> FixtureParameter {
    FixtureParameter::new(field, FixtureValue::Unsigned(value))
}

fn text(field: String, value: String) -> FixtureParameter {
    FixtureParameter::new(field, FixtureValue::Text(value))
}

fn vcpu_params(rng: &mut impl Rng, count: usize) -> Vec<FixtureParameter> {
    let mut params = vec![
        unsigned("vcpu.current".into(), count as u64),
        unsigned("vcpu.maximum".into(), count as u64),
    ];
    for i in 0..count {
        // 1 = running
        params.push(unsigned(format!("vcpu.{i}.state"), 1));
        params.push(unsigned(format!("vcpu.{i}.time"), rng.gen_range(0..MAX_VCPU_TIME_NS)));
        params.push(unsigned(format!("vcpu.{i}.wait"), rng.gen_range(0..MAX_VCPU_TIME_NS / 100)));
    }
    params
}

fn interface_params(rng: &mut impl Rng, count: usize) -> Vec<FixtureParameter> {
    let mut params = vec![unsigned("net.count".into(), count as u64)];
    for i in 0..count {
        params.push(text(format!("net.{i}.name"), format!("vnet{i}")));
        for direction in ["rx", "tx"] {
            params.push(unsigned(
                format!("net.{i}.{direction}.bytes"),
                rng.gen_range(0..MAX_NETWORK_BYTES),
            ));
            params.push(unsigned(
                format!("net.{i}.{direction}.pkts"),
                rng.gen_range(0..MAX_NETWORK_PACKETS),
            ));
            params.push(unsigned(format!("net.{i}.{direction}.errs"), 0));
            params.push(unsigned(
                format!("net.{i}.{direction}.drop"),
                rng.gen_range(0..MAX_DROPPED_PACKETS),
            ));
        }
    }
    params
}

fn block_params(rng: &mut impl Rng, count: usize) -> Vec<FixtureParameter> {
    let mut params = vec![unsigned("block.count".into(), count as u64)];
    for i in 0..count {
        let device = format!("vd{}", disk_letter(i));
        params.push(text(format!("block.{i}.name"), device.clone()));
        params.push(text(
            format!("block.{i}.path"),
            format!("/var/lib/libvirt/images/{device}.qcow2"),
        ));
        for op in ["rd", "wr"] {
            params.push(unsigned(
                format!("block.{i}.{op}.reqs"),
                rng.gen_range(0..MAX_BLOCK_IO_OPS),
            ));
            params.push(unsigned(
                format!("block.{i}.{op}.bytes"),
                rng.gen_range(0..MAX_BLOCK_IO_BYTES),
            ));
            params.push(unsigned(
                format!("block.{i}.{op}.times"),
                rng.gen_range(0..MAX_BLOCK_IO_TIME_NS),
            ));
        }
        params.push(unsigned(format!("block.{i}.fl.reqs"), rng.gen_range(0..MAX_BLOCK_IO_OPS)));
        params.push(unsigned(format!("block.{i}.fl.times"), rng.gen_range(0..MAX_BLOCK_IO_TIME_NS)));
        params.push(unsigned(format!("block.{i}.capacity"), 20 * GB));
        params.push(unsigned(format!("block.{i}.allocation"), rng.gen_range(0..20 * GB)));
    }
    params
}

fn disk_letter(index: usize) -> char {
    (b'a' + (index % 26) as u8) as char
}

fn random_uuid(rng: &mut impl Rng) -> String {
    let bytes: [u8; 16] = rng.gen();
    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{CollectorOptions, StatsCollector};
    use crate::hypervisor::FixtureHypervisor;
    use crate::serializers::SerializerOptions;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn shape() -> FixtureShape {
        FixtureShape {
            domains: 2,
            vcpus: 2,
            interfaces: 1,
            disks: 2,
        }
    }

    #[test]
    fn test_generated_shape() {
        let doc = generate_fixture(&mut StdRng::seed_from_u64(7), shape());
        assert_eq!(doc.domains.len(), 2);

        let domain = &doc.domains[0];
        assert!(domain.active);
        assert_eq!(domain.uuid.len(), 36);
        assert!(domain.metadata.contains_key(DEFAULT_TENANT_NAMESPACE));
        assert_eq!(domain.stats.vcpu.len(), 2 + 2 * 3);
        assert_eq!(domain.stats.interface.len(), 1 + 9);
        assert_eq!(domain.stats.block.len(), 1 + 2 * 12);
    }

    #[test]
    fn test_generated_fixture_is_served() {
        let doc = generate_fixture(&mut StdRng::seed_from_u64(7), shape());
        let options = CollectorOptions {
            serializer: SerializerOptions {
                prefix: "libvirt_".into(),
                identity_labels: true,
            },
            ..CollectorOptions::default()
        };
        let collector = StatsCollector::new(FixtureHypervisor::from_document(doc.clone()), options);
        let body = collector.run_cycle().body;

        let name = &doc.domains[1].name;
        assert!(body.contains("# TYPE libvirt_vcpu_time counter\n"));
        assert!(body.contains(&format!("libvirt_vcpu_time{{domain=\"{name}\", vcpu=\"1\"")));
        assert!(body.contains(&format!(
            "libvirt_net_bytes_rx{{domain=\"{name}\" interfaceid=\"0\", name=\"vnet0\""
        )));
        assert!(body.contains(&format!("libvirt_block_bytes_wr{{domain=\"{name}\" blockid=\"1\"")));
        assert!(!body.contains("tenant=\"\""));
    }

    #[test]
    fn test_write_fixture_file() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("fixture.json");
        command_generate_fixture(output.clone(), shape()).unwrap();

        let doc = crate::hypervisor::fixture::read_document(&output).unwrap();
        assert_eq!(doc.domains.len(), 2);
    }
}
