use anyhow::Result;
use clap::{Parser, ValueEnum};
use qrscanner::backend::{probe, select_initial_backend};
use qrscanner::engine::{FallbackEngineFactory, PrimaryEngineFactory};
use qrscanner::platform::simulated::{
    SimulatedCamera, SimulatedDecoder, SimulatedPermissions, SimulatedServices,
};
use qrscanner::{
    AuthorizationState, BackendPreference, BridgeReply, CameraDevice, CameraDevices,
    CameraFacing, CameraSession, ErrorKind, ScannerBackendKind, ScannerBridge, ScannerCapability,
    ScannerCommand, ScannerConfig, ScannerError,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PermissionMode {
    /// Camera access already granted
    Granted,
    /// Camera access denied by the user
    Denied,
    /// Camera access blocked by device policy
    Restricted,
    /// Not yet decided; the prompt grants access
    Prompt,
}

#[derive(Parser, Debug)]
#[command(name = "qrscanner")]
#[command(about = "Hybrid barcode/QR scanner session with automatic backend fallback")]
#[command(version)]
#[command(long_about = "Drives a camera scanning session over a simulated platform. \
Actions are executed in order and each reply is printed as one JSON line. \
Pass actions by name (prepare, scan, cancelScan, show, hide, pausePreview, resumePreview, \
enableLight, disableLight, useCamera=<0|1>, openSettings, getStatus, destroy).")]
struct Args {
    /// Actions to run, in order
    #[arg(value_name = "ACTION", default_values_t = vec!["getStatus".to_string()])]
    actions: Vec<String>,

    /// Path to configuration file
    #[arg(short, long, default_value = "qrscanner.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Describe backend availability and selection, then exit
    #[arg(long, help = "Explain which recognition backend would be selected and why")]
    explain_backends: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Force the fallback engine regardless of the platform service
    #[arg(long)]
    fallback_only: bool,

    /// Simulate a device without the primary engine's platform service
    #[arg(long)]
    no_primary_service: bool,

    /// Simulate a device without a front camera
    #[arg(long)]
    no_front_camera: bool,

    /// Simulate a device without a back camera
    #[arg(long)]
    no_back_camera: bool,

    /// Simulated camera permission
    #[arg(long, value_enum, default_value_t = PermissionMode::Granted)]
    permission: PermissionMode,

    /// Barcode payload held in front of the camera
    #[arg(long, value_name = "TEXT")]
    payload: Option<String>,

    /// Give up on a scan after this many milliseconds
    #[arg(long, value_name = "MS", default_value_t = 5000)]
    scan_timeout_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    init_logging(&args)?;

    info!("Starting QR scanner v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let mut config = match ScannerConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };
    if args.fallback_only {
        config.scanner.fallback_only = true;
    }

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                info!("Configuration validation successful");
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                error!("Configuration validation failed: {}", e);
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    let services = Arc::new(SimulatedServices::new(!args.no_primary_service));

    if args.explain_backends {
        explain_backends(&config, &services);
        return Ok(());
    }

    let camera = Arc::new(simulated_camera(&args, &config));
    let permissions = Arc::new(match args.permission {
        PermissionMode::Granted => SimulatedPermissions::granted(),
        PermissionMode::Denied => SimulatedPermissions::denied(),
        PermissionMode::Restricted => SimulatedPermissions::restricted(),
        PermissionMode::Prompt => SimulatedPermissions::auto_respond(AuthorizationState::Authorized),
    });

    let session = CameraSession::builder()
        .config(config)
        .camera(camera.clone())
        .permissions(permissions)
        .services(services)
        .primary_engine(Arc::new(PrimaryEngineFactory::new(Arc::new(
            SimulatedDecoder::new("primary"),
        ))))
        .fallback_engine(Arc::new(FallbackEngineFactory::new(Arc::new(
            SimulatedDecoder::new("fallback"),
        ))))
        .build()
        .map_err(|e| {
            error!("Failed to create camera session: {}", e);
            e
        })?;

    let bridge = ScannerBridge::new(session.clone());
    let presenter = args
        .payload
        .clone()
        .map(|payload| spawn_presenter(camera.clone(), payload));

    let scan_timeout = Duration::from_millis(args.scan_timeout_ms);
    let mut failures = 0;
    for action in &args.actions {
        let reply = match action.parse::<ScannerCommand>() {
            Ok(command) => run_command(&bridge, command, scan_timeout).await,
            Err(e) => BridgeReply::error(&e),
        };
        if reply.is_error() {
            failures += 1;
        }
        println!("{}", serde_json::to_string(&reply)?);
    }

    if let Some(presenter) = presenter {
        presenter.abort();
    }
    session.destroy().await?;

    info!(
        "Executed {} actions ({} failed)",
        args.actions.len(),
        failures
    );
    Ok(())
}

async fn run_command(bridge: &ScannerBridge, command: ScannerCommand, scan_timeout: Duration) -> BridgeReply {
    if command != ScannerCommand::Scan {
        return bridge.execute(command).await;
    }

    match timeout(scan_timeout, bridge.execute(command)).await {
        Ok(reply) => reply,
        Err(_) => {
            warn!("No barcode within {:?}; canceling scan", scan_timeout);
            if let Err(e) = bridge.session().cancel_scan().await {
                error!("Failed to cancel scan: {}", e);
            }
            BridgeReply::error(&ScannerError::session(
                ErrorKind::ScanCanceled,
                format!("No barcode presented within {:?}", scan_timeout),
            ))
        }
    }
}

fn simulated_camera(args: &Args, config: &ScannerConfig) -> SimulatedCamera {
    let back = (!args.no_back_camera).then(|| {
        CameraDevice::new("sim-back", CameraFacing::Back)
            .with_torch()
            .with_autofocus()
    });
    let front = (!args.no_front_camera).then(|| CameraDevice::new("sim-front", CameraFacing::Front));

    SimulatedCamera::new(CameraDevices { back, front })
        .with_queue_depth(config.camera.frame_queue_depth)
}

/// Present the payload at roughly 30 frames per second
fn spawn_presenter(camera: Arc<SimulatedCamera>, payload: String) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(33));
        loop {
            ticker.tick().await;
            camera.present(&payload);
        }
    })
}

fn explain_backends(config: &ScannerConfig, services: &SimulatedServices) {
    let availability = probe(services, config.scanner.fallback_only);
    let selected = select_initial_backend(&availability);

    println!("Selected backend: {}", selected);
    println!("Fallback-only mode: {}", availability.forced_fallback_only);
    println!();

    let capabilities = [
        ScannerCapability::BasicScanning,
        ScannerCapability::TorchSupport,
        ScannerCapability::CameraSwitching,
        ScannerCapability::Autofocus,
        ScannerCapability::PerformanceOptimized,
    ];
    for kind in [
        ScannerBackendKind::PrimaryEngine,
        ScannerBackendKind::FallbackEngine,
    ] {
        println!("{}", kind);
        println!("  {}", kind.description(&availability));
        println!("  available: {}", kind.is_available(&availability));
        println!("  performance: {}/10", kind.performance_rating(&availability));
        let supported: Vec<_> = capabilities
            .iter()
            .filter(|capability| kind.has_capability(**capability))
            .collect();
        println!("  capabilities: {:?}", supported);
    }
    println!();

    for use_case in ["performance", "battery", "compatibility", "modern"] {
        let preference = BackendPreference::for_use_case(use_case, &availability);
        println!("Recommended for {}: {:?}", use_case, preference);
    }
}

fn init_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    // Determine log level based on flags
    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("qrscanner={}", log_level)));

    // Replies go to stdout, so logs go to stderr
    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") | None => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed(),
        Some("pretty") => fmt::layer()
            .pretty()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(())
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# QR scanner configuration file");
    println!("# Every key is optional; environment variables such as");
    println!("# QRSCANNER_SCANNER__FALLBACK_ONLY=true override the file.");
    println!();
    print!("{}", toml::to_string_pretty(&ScannerConfig::default())?);
    Ok(())
}
