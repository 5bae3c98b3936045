//! lamco-encode-buffers - simulated encode session
//!
//! Drives the tracked and recycled buffer pools through a configurable
//! encode session on host memory and reports pool statistics.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lamco_encode_buffers::allocator::EncodeAllocator;
use lamco_encode_buffers::config::Config;
use lamco_encode_buffers::pipeline::{EncodePipeline, ResizePlan, RunReport, MAX_FRAME_DIMENSION};
use lamco_encode_buffers::utils::{format_user_error, log_startup_diagnostics, RunTimer};

/// Command-line arguments for lamco-encode-buffers
#[derive(Parser, Debug)]
#[command(name = "lamco-encode-buffers")]
#[command(version, about = "Simulated encode session over tracked GPU buffer pools", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, env = "LAMCO_ENCODE_CONFIG")]
    pub config: Option<String>,

    /// Frames to encode
    #[arg(short, long)]
    pub frames: Option<u32>,

    /// Frame width
    #[arg(long)]
    pub width: Option<u32>,

    /// Frame height
    #[arg(long)]
    pub height: Option<u32>,

    /// Switch frame size at this frame number
    #[arg(long, requires = "resize_to")]
    pub resize_at: Option<u32>,

    /// New frame size as WIDTHxHEIGHT
    #[arg(long, value_parser = parse_size, requires = "resize_at")]
    pub resize_to: Option<(u32, u32)>,

    /// Verbose logging (can be specified multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log format (json|pretty|compact)
    #[arg(long, default_value = "pretty")]
    pub log_format: String,

    /// Write logs to file (in addition to stdout)
    #[arg(long)]
    pub log_file: Option<String>,

    /// Write the run report as JSON to this path ("-" for stdout)
    #[arg(long)]
    pub stats_json: Option<String>,
}

fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (width, height) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", value))?;
    let width = width
        .trim()
        .parse::<u32>()
        .map_err(|e| format!("invalid width: {}", e))?;
    let height = height
        .trim()
        .parse::<u32>()
        .map_err(|e| format!("invalid height: {}", e))?;
    if width == 0 || height == 0 {
        return Err("frame size must be non-zero".to_string());
    }
    if width > MAX_FRAME_DIMENSION || height > MAX_FRAME_DIMENSION {
        return Err(format!(
            "frame size {}x{} exceeds {} pixels per side",
            width, height, MAX_FRAME_DIMENSION
        ));
    }
    Ok((width, height))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default_config()?,
    };
    let config = config.with_overrides(args.frames, args.width, args.height);
    config.validate().context("Invalid configuration after CLI overrides")?;

    let _log_guard = init_logging(&args, &config)?;

    info!("════════════════════════════════════════════════════════");
    info!("  lamco-encode-buffers v{}", env!("CARGO_PKG_VERSION"));
    info!("  Built: {}", env!("BUILD_DATE"));
    info!("  Commit: {}", env!("GIT_HASH"));
    info!("  Profile: {}", if cfg!(debug_assertions) { "debug" } else { "release" });
    info!("════════════════════════════════════════════════════════");

    log_startup_diagnostics(&config);
    tracing::debug!("Config: {:?}", config);

    let report = match run_session(&args, &config) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("{}", format_user_error(&e));
            return Err(e);
        }
    };

    if let Some(path) = &args.stats_json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize run report")?;
        if path == "-" {
            println!("{}", json);
        } else {
            std::fs::write(path, json).context(format!("Failed to write stats to {}", path))?;
            info!("Run report written to {}", path);
        }
    }

    Ok(())
}

fn run_session(args: &Args, config: &Config) -> Result<RunReport> {
    let allocator = Arc::new(EncodeAllocator::system_memory());
    let mut pipeline =
        EncodePipeline::new(allocator.clone(), config).context("Failed to create encode pipeline")?;

    let resize = match (args.resize_at, args.resize_to) {
        (Some(at_frame), Some((width, height))) => Some(ResizePlan {
            at_frame,
            width,
            height,
        }),
        _ => None,
    };

    let timer = RunTimer::start();
    let report = pipeline
        .run(config.session.frames, resize)
        .context("Encode run failed")?;

    info!(
        "Session finished in {:.2}s ({:.1} fps)",
        timer.elapsed().as_secs_f64(),
        timer.fps(report.frames)
    );
    info!(
        "Allocations: {} created, {} destroyed, {} live",
        report.allocations, report.destroys, report.live_resources
    );
    info!(
        "Slots: peak {} busy, {} waits (avg {:.2}ms, max {:.2}ms), {} evicted, {} deferred",
        report.tracked.peak_busy_slots,
        report.tracked.waits,
        report.tracked.avg_wait_ms,
        report.tracked.max_wait_ms,
        report.tracked.slots_evicted,
        report.tracked.deferred_releases
    );
    info!(
        "Recycle: {} queues, {} resources, {} re-registrations",
        report.recycle.queues, report.recycle.resources_allocated, report.recycle.reregistrations
    );

    Ok(report)
}

fn init_logging(args: &Args, config: &Config) -> Result<Option<WorkerGuard>> {
    use std::fs::File;

    let log_level = match args.verbose {
        0 => config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "lamco_encode_buffers={level},warn",
            level = log_level
        ))
    });

    // Rolling files from the config take precedence over --log-file
    if let Some(log_dir) = &config.logging.log_dir {
        let appender = tracing_appender::rolling::daily(log_dir, "lamco-encode-buffers.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);

        let registry = tracing_subscriber::registry().with(env_filter);
        match args.log_format.as_str() {
            "json" => registry
                .with(tracing_subscriber::fmt::layer().json())
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(writer)
                        .with_ansi(false),
                )
                .init(),
            "compact" => registry
                .with(tracing_subscriber::fmt::layer().compact())
                .with(
                    tracing_subscriber::fmt::layer()
                        .compact()
                        .with_writer(writer)
                        .with_ansi(false),
                )
                .init(),
            _ => registry
                .with(tracing_subscriber::fmt::layer().pretty())
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false),
                )
                .init(),
        }
        info!("Logging to directory: {}", log_dir.display());
        return Ok(Some(guard));
    }

    if let Some(log_file_path) = &args.log_file {
        let file = File::create(log_file_path)
            .context(format!("Failed to create log file: {}", log_file_path))?;

        match args.log_format.as_str() {
            "json" => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(
                        tracing_subscriber::fmt::layer()
                            .json()
                            .with_writer(std::io::stdout),
                    )
                    .with(
                        tracing_subscriber::fmt::layer()
                            .json()
                            .with_writer(file)
                            .with_ansi(false),
                    )
                    .init();
            }
            "compact" => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(
                        tracing_subscriber::fmt::layer()
                            .compact()
                            .with_writer(std::io::stdout),
                    )
                    .with(
                        tracing_subscriber::fmt::layer()
                            .compact()
                            .with_writer(file)
                            .with_ansi(false),
                    )
                    .init();
            }
            _ => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(
                        tracing_subscriber::fmt::layer()
                            .pretty()
                            .with_writer(std::io::stdout),
                    )
                    .with(
                        tracing_subscriber::fmt::layer()
                            .with_writer(file)
                            .with_ansi(false),
                    )
                    .init();
            }
        }
        info!("Logging to file: {}", log_file_path);
    } else {
        match args.log_format.as_str() {
            "json" => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(tracing_subscriber::fmt::layer().json())
                    .init();
            }
            "compact" => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(tracing_subscriber::fmt::layer().compact())
                    .init();
            }
            _ => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(tracing_subscriber::fmt::layer().pretty())
                    .init();
            }
        }
    }

    Ok(None)
}
