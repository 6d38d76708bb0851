//! herakles-libvirt-exporter
//!
//! Prometheus exporter for libvirt domain statistics with tracing logging.
//! This is the main entry point that starts the readiness loop and handles
//! subcommands.

use anyhow::anyhow;
use clap::{Parser, ValueEnum};
use tracing::level_filters::LevelFilter;
use tracing::{error, info, warn};

use herakles_libvirt_exporter::cli::{Args, Commands, LogLevel, USAGE};
use herakles_libvirt_exporter::collector::StatsCollector;
use herakles_libvirt_exporter::commands::{command_generate_fixture, command_test, FixtureShape};
use herakles_libvirt_exporter::config::{
    resolve_config, show_config, validate_effective_config, Config,
};
use herakles_libvirt_exporter::hypervisor::{BackendUri, FixtureHypervisor, Hypervisor};
use herakles_libvirt_exporter::server::{Server, ServerOptions};
use herakles_libvirt_exporter::startup_checks;

#[cfg(feature = "libvirt")]
use herakles_libvirt_exporter::hypervisor::LibvirtHypervisor;

/// Initializes tracing logging subsystem with configured log level.
fn setup_logging(config: &Config, args: &Args) {
    let level = args
        .log_level
        .or_else(|| {
            config
                .log_level
                .as_deref()
                .and_then(|l| LogLevel::from_str(l, true).ok())
        })
        .unwrap_or(LogLevel::Info);

    let max_level = match level {
        LogLevel::Off => LevelFilter::OFF,
        LogLevel::Error => LevelFilter::ERROR,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Trace => LevelFilter::TRACE,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(max_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    info!("Logging initialized with level: {:?}", level);
}

/// Config helpers return `Box<dyn Error>`, which is not `Send`.
fn config_error(e: Box<dyn std::error::Error>) -> anyhow::Error {
    anyhow!("{}", e)
}

/// Hypervisor connection chosen by the virtualization URI.
enum Backend {
    Fixture(FixtureHypervisor),
    #[cfg(feature = "libvirt")]
    Libvirt(LibvirtHypervisor),
    Disconnected,
}

fn open_backend(uri: &str) -> Backend {
    match BackendUri::parse(uri) {
        BackendUri::Fixture(path) => {
            info!("Using fixture backend: {}", path.display());
            Backend::Fixture(FixtureHypervisor::from_path(path))
        }
        #[cfg(feature = "libvirt")]
        BackendUri::Libvirt(uri) => match LibvirtHypervisor::connect_read_only(&uri) {
            Ok(hv) => Backend::Libvirt(hv),
            Err(e) => {
                error!("Failed to connect to hypervisor: {}", e);
                Backend::Disconnected
            }
        },
        #[cfg(not(feature = "libvirt"))]
        BackendUri::Libvirt(uri) => {
            error!(
                "Cannot open {}: built without the `libvirt` feature, serving empty documents",
                uri
            );
            Backend::Disconnected
        }
    }
}

fn serve<H: Hypervisor>(collector: StatsCollector<H>, options: ServerOptions) -> anyhow::Result<()> {
    let mut server = match Server::bind(options, collector) {
        Ok(server) => server,
        Err(e) => {
            error!("❌ {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run() {
        error!("❌ {}", e);
        std::process::exit(1);
    }
    Ok(())
}

fn run_test<H: Hypervisor>(
    collector: StatsCollector<H>,
    uri: &str,
    iterations: usize,
    verbose: bool,
) -> anyhow::Result<()> {
    command_test(collector, uri, iterations, verbose).map_err(config_error)
}

/// Resolves the effective config and exits with status 1 when it is invalid.
fn load_validated_config(args: &Args) -> anyhow::Result<Config> {
    let config = resolve_config(args).map_err(config_error)?;
    if let Err(e) = validate_effective_config(&config) {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }
    Ok(config)
}

fn run_command(command: &Commands, config: &Config) -> anyhow::Result<()> {
    match command {
        Commands::Test {
            uri,
            iterations,
            verbose,
        } => {
            let options = config.collector_options();
            match open_backend(uri) {
                Backend::Fixture(hv) => {
                    run_test(StatsCollector::new(hv, options), uri, *iterations, *verbose)
                }
                #[cfg(feature = "libvirt")]
                Backend::Libvirt(hv) => {
                    run_test(StatsCollector::new(hv, options), uri, *iterations, *verbose)
                }
                Backend::Disconnected => run_test(
                    StatsCollector::<FixtureHypervisor>::disconnected(options),
                    uri,
                    *iterations,
                    *verbose,
                ),
            }
        }

        Commands::GenerateFixture {
            output,
            domains,
            vcpus,
            interfaces,
            disks,
        } => command_generate_fixture(
            output.clone(),
            FixtureShape {
                domains: *domains,
                vcpus: *vcpus,
                interfaces: *interfaces,
                disks: *disks,
            },
        )
        .map_err(config_error),
    }
}

/// Main application entry point.
fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Early config resolution for show/check modes
    if args.show_config || args.check_config {
        let config = resolve_config(&args).map_err(config_error)?;

        if args.check_config {
            if let Err(e) = validate_effective_config(&config) {
                eprintln!("❌ Configuration invalid: {}", e);
                std::process::exit(1);
            }
            println!("✅ Configuration is valid");
            return Ok(());
        }

        return show_config(&config, args.config_format).map_err(config_error);
    }

    // Handle subcommands
    if let Some(command) = &args.command {
        let config = load_validated_config(&args)?;
        setup_logging(&config, &args);
        return run_command(command, &config);
    }

    let Some(target) = args.serve_target() else {
        eprintln!("{}", USAGE);
        std::process::exit(1);
    };

    let config = load_validated_config(&args)?;
    let collector_options = config.collector_options();

    setup_logging(&config, &args);

    info!(
        "Starting herakles-libvirt-exporter {} (built {})",
        env!("CARGO_PKG_VERSION"),
        env!("VERGEN_BUILD_TIMESTAMP")
    );
    info!("Port: {}, virtualization URI: {}", target.port, target.uri);

    if let Err(e) = startup_checks::validate_requirements(&target.uri) {
        error!("❌ Startup validation failed: {}", e);
        warn!("   The exporter will start but may serve empty documents!");
    }

    let server_options = config.server_options(target.port).map_err(config_error)?;

    match open_backend(&target.uri) {
        Backend::Fixture(hv) => serve(StatsCollector::new(hv, collector_options), server_options),
        #[cfg(feature = "libvirt")]
        Backend::Libvirt(hv) => serve(StatsCollector::new(hv, collector_options), server_options),
        Backend::Disconnected => serve(
            StatsCollector::<FixtureHypervisor>::disconnected(collector_options),
            server_options,
        ),
    }
}
