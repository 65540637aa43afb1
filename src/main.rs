use anyhow::{Context, Result};
use camflow::simulation::{SimulatedCamera, SimulatedPlatform, StaticSurface};
use camflow::{
    Camera, CameraController, CamflowConfig, Lens, PreferenceSet, Settings, SupportLevel,
    SurfaceProvider,
};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "camflow")]
#[command(about = "Camera surface negotiation and capture session lifecycle engine")]
#[command(version)]
#[command(long_about = "Negotiates stream roles and resolutions for a set of camera surfaces, \
then drives a full open / session / preview / capture lifecycle against the built-in \
simulated camera platform and prints what was negotiated.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "camflow.toml", help = "Path to TOML configuration file")]
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

    /// Print the effective configuration and exit
    #[arg(long, help = "Print the effective configuration in TOML format and exit")]
    print_config: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Support level reported by the simulated camera
    #[arg(long, value_name = "LEVEL", default_value = "full", help = "Simulated support level: legacy, limited, full, level3 or external")]
    support_level: SupportLevel,

    /// Also record a short clip
    #[arg(long, help = "Record after the still capture")]
    record: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args)?;

    let config = CamflowConfig::load_from_file(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config))?;

    if args.print_config {
        let rendered = toml::to_string_pretty(&config).context("Failed to render configuration")?;
        println!("{}", rendered);
        return Ok(());
    }

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        eprintln!("✗ Configuration validation failed: {}", e);
        std::process::exit(1);
    }
    if args.validate_config {
        println!("✓ Configuration is valid");
        return Ok(());
    }

    info!("Starting camflow v{}", env!("CARGO_PKG_VERSION"));
    run_simulation(&args, &config).await
}

async fn run_simulation(args: &Args, config: &CamflowConfig) -> Result<()> {
    let platform = SimulatedPlatform::new()
        .with_camera(SimulatedCamera::new("0", Lens::Back).with_support_level(args.support_level))
        .with_camera(SimulatedCamera::new("1", Lens::Front).with_support_level(args.support_level));

    let camera = Camera::builder()
        .platform(Arc::new(platform.clone()))
        .query(Arc::new(platform.clone()))
        .timeouts(config.session.timeouts())
        .preferences(PreferenceSet::from_config(&config.capture))
        .build()?;

    let preview = Arc::new(StaticSurface::texture("preview"));
    let capture = Arc::new(StaticSurface::jpeg("capture"));
    let mut surfaces = vec![
        preview as Arc<dyn SurfaceProvider>,
        capture as Arc<dyn SurfaceProvider>,
    ];
    let recorder = if args.record {
        let recorder = Arc::new(StaticSurface::recorder("recorder"));
        surfaces.insert(1, recorder.clone() as Arc<dyn SurfaceProvider>);
        Some(recorder)
    } else {
        None
    };

    let controller = CameraController::new(camera, Settings::from_config(config, surfaces));
    controller.start().await?;

    println!(
        "Negotiated {} surfaces on a {} device:",
        controller.settings().surfaces.len(),
        args.support_level
    );
    for output in controller.camera().outputs().await {
        let role = output
            .role
            .map(|role| role.to_string())
            .unwrap_or_else(|| "watcher".to_string());
        let chosen = output
            .handle
            .map(|handle| handle.resolution.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<10} {:<14} role={:<8} candidates={:<2} chosen={}",
            output.name,
            output.format.to_string(),
            role,
            output.candidates.len(),
            chosen
        );
    }

    let result = controller.capture().await?;
    println!("Still captured (frame {})", result.frame_number);

    if recorder.is_some() {
        controller.start_record().await?;
        controller.stop_record().await?;
        println!("Recording started and stopped");
    }

    controller.release().await?;
    info!(
        "Simulation finished after {} platform calls",
        platform.calls().len()
    );
    Ok(())
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
        .unwrap_or_else(|_| EnvFilter::new(format!("camflow={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(())
}
