//! Integration tests for the collect→serialize→envelope pipeline.
//!
//! These tests drive `StatsCollector` with in-memory fixture documents and
//! check the exact exposition text a scraper receives.

use std::collections::BTreeMap;

use herakles_libvirt_exporter::collector::{CollectorOptions, StatsCollector};
use herakles_libvirt_exporter::exposition::{render_envelope, PREAMBLE};
use herakles_libvirt_exporter::hypervisor::fixture::{
    FixtureDocument, FixtureDomain, FixtureParameter, FixtureStats, FixtureValue,
};
use herakles_libvirt_exporter::hypervisor::FixtureHypervisor;
use herakles_libvirt_exporter::serializers::SerializerOptions;
use herakles_libvirt_exporter::tenant::DEFAULT_TENANT_NAMESPACE;

/// Helper to build an unsigned fixture parameter.
fn num(field: &str, value: u64) -> FixtureParameter {
    FixtureParameter::new(field, FixtureValue::Unsigned(value))
}

/// Helper to build a string fixture parameter.
fn text(field: &str, value: &str) -> FixtureParameter {
    FixtureParameter::new(field, FixtureValue::Text(value.to_string()))
}

fn domain(name: &str, stats: FixtureStats) -> FixtureDomain {
    FixtureDomain {
        name: name.to_string(),
        uuid: format!("{name}-uuid"),
        active: true,
        metadata: BTreeMap::new(),
        stats,
    }
}

fn collector(domains: Vec<FixtureDomain>, options: CollectorOptions) -> StatsCollector<FixtureHypervisor> {
    let document = FixtureDocument {
        domains,
        ..FixtureDocument::default()
    };
    StatsCollector::new(FixtureHypervisor::from_document(document), options)
}

fn body_of(domains: Vec<FixtureDomain>) -> String {
    collector(domains, CollectorOptions::default()).run_cycle().body
}

/// Splits an envelope into its declared Content-Length and the body bytes.
fn split_envelope(response: &[u8]) -> (usize, &[u8]) {
    let text = std::str::from_utf8(response).expect("utf-8 response");
    let header_end = text.find("\r\n\r\n").expect("header terminator") + 4;
    let length = text[..header_end]
        .lines()
        .find_map(|line| line.strip_prefix("Content-Length: "))
        .expect("Content-Length header")
        .trim()
        .parse()
        .expect("numeric Content-Length");
    (length, &response[header_end..])
}

#[test]
fn test_vcpu_time_scenario() {
    let body = body_of(vec![domain(
        "vm1",
        FixtureStats {
            vcpu: vec![num("vcpu.0.time", 100)],
            ..FixtureStats::default()
        },
    )]);

    assert!(body.starts_with(PREAMBLE));
    assert!(body.contains("# TYPE vcpu_time counter\nvcpu_time{domain=\"vm1\", vcpu=\"0\"} 100\n"));
}

#[test]
fn test_network_scenario() {
    let body = body_of(vec![domain(
        "vm1",
        FixtureStats {
            interface: vec![text("net.0.name", "eth0"), num("net.0.rx.bytes", 4096)],
            ..FixtureStats::default()
        },
    )]);

    assert_eq!(
        body,
        format!(
            "{PREAMBLE}# TYPE net_bytes_rx counter\n\
             net_bytes_rx{{domain=\"vm1\" interfaceid=\"0\", name=\"eth0\"}} 4096\n"
        )
    );
}

#[test]
fn test_two_token_paths_produce_nothing() {
    let body = body_of(vec![domain(
        "vm1",
        FixtureStats {
            vcpu: vec![num("vcpu.current", 2), num("vcpu.maximum", 2)],
            interface: vec![num("net.count", 1)],
            block: vec![num("block.count", 1)],
        },
    )]);
    assert_eq!(body, PREAMBLE);
}

#[test]
fn test_zero_domains_envelope() {
    let body = body_of(Vec::new());
    assert_eq!(body, PREAMBLE);

    let response = render_envelope(&body);
    let (length, payload) = split_envelope(&response);
    assert_eq!(length, PREAMBLE.len());
    assert_eq!(payload, PREAMBLE.as_bytes());
}

#[test]
fn test_content_length_matches_body() {
    for body in ["", PREAMBLE, "# prometheus data\nvcpu_time{domain=\"vm1\", vcpu=\"0\"} 100\n"] {
        let response = render_envelope(body);
        let (length, payload) = split_envelope(&response);
        assert_eq!(length, payload.len(), "body {:?}", body);
        assert_eq!(payload, body.as_bytes());
    }
}

#[test]
fn test_envelope_header_layout() {
    let response = render_envelope(PREAMBLE);
    let text = String::from_utf8(response).unwrap();
    assert_eq!(
        text,
        format!(
            "HTTP/1.0 200 OK\r\nContent-Length: {}\r\nContent-Type: text/plain; version=0.0.4\r\n\r\n{PREAMBLE}",
            PREAMBLE.len()
        )
    );
}

#[test]
fn test_consecutive_cycles_identical() {
    let collector = collector(
        vec![
            domain(
                "vm1",
                FixtureStats {
                    vcpu: vec![num("vcpu.0.time", 1), num("vcpu.1.time", 2)],
                    interface: vec![text("net.0.name", "vnet0"), num("net.0.tx.pkts", 3)],
                    block: vec![text("block.0.name", "vda"), num("block.0.rd.reqs", 4)],
                },
            ),
            domain(
                "vm2",
                FixtureStats {
                    vcpu: vec![num("vcpu.0.time", 5)],
                    ..FixtureStats::default()
                },
            ),
        ],
        CollectorOptions::default(),
    );

    let first = collector.run_cycle();
    let second = collector.run_cycle();
    assert_eq!(first.body, second.body);
    assert_eq!(first.samples, 5);
}

#[test]
fn test_type_lines_declared_once_across_domains() {
    let body = body_of(vec![
        domain(
            "vm1",
            FixtureStats {
                block: vec![num("block.0.wr.bytes", 10), num("block.1.wr.bytes", 11)],
                ..FixtureStats::default()
            },
        ),
        domain(
            "vm2",
            FixtureStats {
                block: vec![num("block.0.wr.bytes", 12)],
                ..FixtureStats::default()
            },
        ),
    ]);

    assert_eq!(body.matches("# TYPE block_bytes_wr counter\n").count(), 1);
    assert!(body.contains("block_bytes_wr{domain=\"vm1\" blockid=\"1\"} 11\n"));
    assert!(body.contains("block_bytes_wr{domain=\"vm2\" blockid=\"0\"} 12\n"));
}

#[test]
fn test_resource_classes_in_fixed_order() {
    let body = body_of(vec![domain(
        "vm1",
        FixtureStats {
            vcpu: vec![num("vcpu.0.time", 1)],
            interface: vec![num("net.0.rx.bytes", 2)],
            block: vec![num("block.0.rd.bytes", 3)],
        },
    )]);

    let vcpu = body.find("vcpu_time{").unwrap();
    let net = body.find("net_bytes_rx{").unwrap();
    let block = body.find("block_bytes_rd{").unwrap();
    assert!(vcpu < net && net < block);
}

#[test]
fn test_inactive_domains_not_exported() {
    let mut stopped = domain(
        "stopped",
        FixtureStats {
            vcpu: vec![num("vcpu.0.time", 1)],
            ..FixtureStats::default()
        },
    );
    stopped.active = false;

    let body = body_of(vec![stopped]);
    assert_eq!(body, PREAMBLE);
}

#[test]
fn test_identity_labels_with_prefix() {
    let mut vm = domain(
        "vm1",
        FixtureStats {
            vcpu: vec![num("vcpu.0.time", 100)],
            ..FixtureStats::default()
        },
    );
    vm.metadata.insert(
        DEFAULT_TENANT_NAMESPACE.to_string(),
        "<instance><tenant><uuid>tenant-42</uuid></tenant></instance>".to_string(),
    );

    let options = CollectorOptions {
        serializer: SerializerOptions {
            prefix: "libvirt_".into(),
            identity_labels: true,
        },
        ..CollectorOptions::default()
    };
    let body = collector(vec![vm], options).run_cycle().body;

    assert!(body.contains("# TYPE libvirt_vcpu_time counter\n"));
    assert!(body.contains(
        "libvirt_vcpu_time{domain=\"vm1\", vcpu=\"0\" uuid=\"vm1-uuid\" tenant=\"tenant-42\"} 100\n"
    ));
}

#[test]
fn test_label_values_verbatim_by_default() {
    let body = body_of(vec![domain(
        "web\"1",
        FixtureStats {
            vcpu: vec![num("vcpu.0.time", 1)],
            ..FixtureStats::default()
        },
    )]);
    assert!(body.contains("vcpu_time{domain=\"web\"1\", vcpu=\"0\"} 1\n"));
}
