use anyhow::{Context, Result};
use clap::Parser;
use photobooth::{BoothConfig, BoothController, LogRenderSink};
use std::path::Path;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "photobooth")]
#[command(about = "Unattended photo booth: countdown, capture, montage, print and upload")]
#[command(version)]
#[command(long_about = "A photo booth controller that runs guided four-photo sessions. \
Each finished session is saved to the event directory, printed and uploaded in the \
background. Press SPACE to push the button, p to print the live preview, q to quit.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "photobooth.toml", help = "Path to TOML configuration file")]
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
    #[arg(long, help = "Validate configuration file and exit without starting the booth")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Dry run mode - initialize but don't start components
    #[arg(long, help = "Perform dry run - open the camera and recover sessions, then exit")]
    dry_run: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Also write logs to daily rolling files in this directory
    #[arg(long, value_name = "DIR", help = "Directory for daily rolling log files")]
    log_dir: Option<String>,

    /// Do not read the button from the terminal
    #[arg(long, help = "Disable keyboard input (SPACE button, p print, q quit)")]
    no_keyboard: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    let _log_guard = init_logging(&args)?;

    info!("Starting photobooth v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = BoothConfig::load_from_file(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config))?;

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        if args.validate_config {
            eprintln!("✗ Configuration validation failed: {}", e);
            std::process::exit(1);
        }
        return Err(e.into());
    }

    if args.validate_config {
        info!("Configuration validation successful");
        println!("✓ Configuration is valid");
        return Ok(());
    }

    let mut controller = BoothController::new(config, Box::new(LogRenderSink::new()))
        .map_err(|e| {
            error!("Failed to initialize booth: {}", e);
            e
        })?;
    controller.set_keyboard_enabled(!args.no_keyboard);

    if args.dry_run {
        let recovery = controller.recovery();
        info!("Dry run mode - components initialized but not started");
        println!(
            "✓ Dry run completed: camera {}, {} finished sessions, next session {}",
            controller.camera().driver_name(),
            recovery.finished,
            recovery.next_id
        );
        controller.shutdown().await;
        return Ok(());
    }

    controller.start().await;
    let exit_code = controller.run().await;

    info!("Photobooth exited with code: {}", exit_code);

    // Exit with appropriate code for systemd
    std::process::exit(exit_code);
}

fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

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
        .unwrap_or_else(|_| EnvFilter::new(format!("photobooth={}", log_level)));

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

    // Thread names tell the camera, capture and peripheral workers apart
    let (file_layer, guard) = match args.log_dir.as_deref() {
        Some(dir) => {
            std::fs::create_dir_all(Path::new(dir))
                .with_context(|| format!("Cannot create log directory {}", dir))?;
            let appender = tracing_appender::rolling::daily(dir, "photobooth.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_thread_names(true)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# Photobooth Configuration File");
    println!("# This is the default configuration with all available options");
    println!();

    let default_config = toml::to_string_pretty(&BoothConfig::default())
        .context("Failed to serialize default configuration")?;
    println!("{}", default_config);
    Ok(())
}
