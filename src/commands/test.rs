//! Test command implementation.
//!
//! Runs collection cycles against a URI without opening a listener and
//! prints the last document.

use std::time::Duration;

use crate::collector::StatsCollector;
use crate::hypervisor::Hypervisor;

/// Outcome of a series of collection cycles.
#[derive(Debug, Clone)]
pub struct TestReport {
    pub durations: Vec<Duration>,
    pub last_body: String,
    pub last_domains: usize,
    pub last_samples: usize,
    /// Whether every cycle produced the same body as the one before it
    pub identical: bool,
}

/// Runs `iterations` cycles (at least one) on `collector`.
pub fn run_cycles<H: Hypervisor>(
    collector: &StatsCollector<H>,
    iterations: usize,
    verbose: bool,
) -> TestReport {
    let mut report = TestReport {
        durations: Vec::new(),
        last_body: String::new(),
        last_domains: 0,
        last_samples: 0,
        identical: true,
    };

    for iteration in 1..=iterations.max(1) {
        let collection = collector.run_cycle();

        if verbose {
            println!("\n🔄 Iteration {}/{}:", iteration, iterations.max(1));
            println!("   🖥️  Domains: {}", collection.domains);
            println!("   📊 Samples: {}", collection.samples);
            println!("   📦 Body: {} bytes", collection.body.len());
            println!(
                "   ⏱️  Cycle duration: {:.2}ms",
                collection.duration.as_secs_f64() * 1000.0
            );
        }

        if iteration > 1 && collection.body != report.last_body {
            report.identical = false;
        }
        report.durations.push(collection.duration);
        report.last_domains = collection.domains;
        report.last_samples = collection.samples;
        report.last_body = collection.body;
    }

    report
}

/// Tests metrics collection.
pub fn command_test<H: Hypervisor>(
    collector: StatsCollector<H>,
    uri: &str,
    iterations: usize,
    verbose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("🧪 Herakles libvirt Exporter - Test Mode");
    println!("=========================================");
    println!("   URI: {}", uri);

    if !collector.is_connected() {
        return Err(format!("Not connected to {}", uri).into());
    }

    let report = run_cycles(&collector, iterations, verbose);

    println!("\n{}", report.last_body);

    let total: Duration = report.durations.iter().sum();
    let max = report.durations.iter().max().copied().unwrap_or_default();
    println!("📈 Cycles: {}", report.durations.len());
    println!(
        "   ├─ Average: {:.2}ms",
        total.as_secs_f64() * 1000.0 / report.durations.len() as f64
    );
    println!("   ├─ Max: {:.2}ms", max.as_secs_f64() * 1000.0);
    println!(
        "   ├─ Last: {} domains, {} samples",
        report.last_domains, report.last_samples
    );
    println!(
        "   └─ Consecutive bodies identical: {}",
        if report.identical { "yes" } else { "no" }
    );

    println!("\n✅ Test completed successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::CollectorOptions;
    use crate::hypervisor::fixture::{FixtureDocument, FixtureDomain, FixtureParameter, FixtureStats, FixtureValue};
    use crate::hypervisor::FixtureHypervisor;
    use std::collections::BTreeMap;

    fn collector() -> StatsCollector<FixtureHypervisor> {
        let document = FixtureDocument {
            domains: vec![FixtureDomain {
                name: "vm1".into(),
                uuid: "u-1".into(),
                active: true,
                metadata: BTreeMap::new(),
                stats: FixtureStats {
                    vcpu: vec![FixtureParameter::new("vcpu.0.time", FixtureValue::Unsigned(100))],
                    ..FixtureStats::default()
                },
            }],
            ..FixtureDocument::default()
        };
        StatsCollector::new(FixtureHypervisor::from_document(document), CollectorOptions::default())
    }

    #[test]
    fn test_run_cycles_reports_identical_bodies() {
        let report = run_cycles(&collector(), 3, false);
        assert_eq!(report.durations.len(), 3);
        assert!(report.identical);
        assert_eq!(report.last_domains, 1);
        assert_eq!(report.last_samples, 1);
        assert!(report.last_body.contains("vcpu_time{domain=\"vm1\", vcpu=\"0\"} 100\n"));
    }

    #[test]
    fn test_zero_iterations_runs_once() {
        assert_eq!(run_cycles(&collector(), 0, false).durations.len(), 1);
    }

    #[test]
    fn test_disconnected_collector_fails() {
        let collector = StatsCollector::<FixtureHypervisor>::disconnected(CollectorOptions::default());
        assert!(command_test(collector, "qemu:///system", 1, false).is_err());
    }
}
