//! CLI Entry Point for fluoro-daq
//!
//! Provides command-line interface for:
//! - Running a scan plan against both monochromators and saving CSV results
//! - Printing wavelength and resolution limits from a system file
//! - Validating configuration files without touching hardware
//!
//! # Usage
//!
//! ```bash
//! fluoro-daq run --system config/system.yml --scans config/scans.yml --output results/
//! fluoro-daq limits --system config/system.yml
//! fluoro-daq validate --system config/system.yml --scans config/scans.yml
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fluoro_daq::config::{ScanPlanConfig, SystemConfig};
use fluoro_daq::data::CsvWriter;
use fluoro_daq::experiment::{run_plan, PlaceholderDetector};
use fluoro_daq::hardware::{MonochromatorController, Role};
use fluoro_daq::logging::{self, OutputFormat, TracingConfig};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "fluoro-daq")]
#[command(about = "Two-monochromator fluorescence spectrometer control", long_about = None)]
struct Cli {
    /// Log level override (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Pretty)]
    log_format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize both monochromators and run every scan in the plan
    Run {
        /// System configuration file (.yml/.yaml/.toml)
        #[arg(long)]
        system: PathBuf,

        /// Scan plan file (.yml/.yaml/.toml)
        #[arg(long)]
        scans: PathBuf,

        /// Directory for CSV results
        #[arg(long, default_value = "results")]
        output: PathBuf,

        /// Skip the power-up handshake and zero-find
        #[arg(long)]
        skip_init: bool,
    },

    /// Print reachable wavelength and resolution ranges
    Limits {
        /// System configuration file
        #[arg(long)]
        system: PathBuf,
    },

    /// Load and validate configuration without opening any port
    Validate {
        /// System configuration file
        #[arg(long)]
        system: PathBuf,

        /// Optional scan plan file
        #[arg(long)]
        scans: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            system,
            scans,
            output,
            skip_init,
        } => {
            let config = load_system(&system)?;
            init_logging(cli.log_level.as_deref(), &config.log_level, cli.log_format)?;
            run(config, &scans, output, skip_init).await
        }
        Commands::Limits { system } => {
            let config = load_system(&system)?;
            init_logging(cli.log_level.as_deref(), &config.log_level, cli.log_format)?;
            print_limits(&config)
        }
        Commands::Validate { system, scans } => {
            let config = load_system(&system)?;
            init_logging(cli.log_level.as_deref(), &config.log_level, cli.log_format)?;
            if let Some(scans) = scans {
                let specs = load_plan(&scans)?.specs()?;
                println!("{}: {} scan(s) OK", scans.display(), specs.len());
            }
            println!("{}: OK", system.display());
            Ok(())
        }
    }
}

fn init_logging(cli_level: Option<&str>, config_level: &str, format: OutputFormat) -> Result<()> {
    let config = TracingConfig::from_level_name(cli_level.unwrap_or(config_level))?
        .with_format(format);
    logging::init(config)?;
    Ok(())
}

fn load_system(path: &Path) -> Result<SystemConfig> {
    let config = SystemConfig::load_from(path)
        .with_context(|| format!("Failed to load system configuration {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("Invalid system configuration {}", path.display()))?;
    Ok(config)
}

fn load_plan(path: &Path) -> Result<ScanPlanConfig> {
    ScanPlanConfig::load_from(path)
        .with_context(|| format!("Failed to load scan plan {}", path.display()))
}

async fn run(config: SystemConfig, scans: &Path, output: PathBuf, skip_init: bool) -> Result<()> {
    let specs = load_plan(scans)?
        .specs()
        .with_context(|| format!("Invalid scan plan {}", scans.display()))?;

    let mut excitation = connect(Role::Excitation, &config).await?;
    let mut emission = connect(Role::Emission, &config).await?;

    let outcome = async {
        if skip_init {
            tracing::warn!("Skipping initialization: step positions are not calibrated");
        } else {
            excitation
                .initialize()
                .await
                .context("Excitation monochromator initialization failed")?;
            emission
                .initialize()
                .await
                .context("Emission monochromator initialization failed")?;
        }

        let mut detector = PlaceholderDetector;
        let mut writer = CsvWriter::new(output);
        let written = run_plan(
            &specs,
            &mut excitation,
            &mut emission,
            &mut detector,
            &mut writer,
        )
        .await
        .context("Scan plan aborted")?;

        for path in &written {
            println!("Saved {}", path.display());
        }
        Ok::<_, anyhow::Error>(())
    }
    .await;

    for controller in [excitation, emission] {
        let role = controller.role();
        if let Err(e) = controller.shutdown().await {
            tracing::warn!(%role, error = %e, "Failed to release serial port");
        }
    }

    outcome
}

async fn connect(role: Role, config: &SystemConfig) -> Result<MonochromatorController> {
    let section = config.controller(role);
    MonochromatorController::connect(role, section)
        .await
        .with_context(|| format!("Failed to open {role} port {}", section.port))
}

fn print_limits(config: &SystemConfig) -> Result<()> {
    for role in [Role::Excitation, Role::Emission] {
        let section = config.controller(role);
        let (lo, hi) = section.wavelength_limits()?;
        println!("{role} monochromator ({})", section.kinematic_model()?);
        println!(
            "  wavelength: {lo} .. {hi} (steps {} .. {})",
            section.min_step, section.max_step
        );
        match section.resolution_limits()? {
            Some((narrow, wide)) => println!(
                "  resolution: {} .. {} ({} slit(s))",
                narrow.nm(),
                wide.nm(),
                section.slits.as_ref().map_or(0, |slits| slits.count)
            ),
            None => println!("  resolution: fixed (no slit bank)"),
        }
    }
    Ok(())
}
