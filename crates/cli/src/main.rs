mod logging;

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use size_detector_service::{open_session, write_report, ProbeReport, SizingAvailability};

#[derive(Debug, Parser)]
#[command(
    name = "size-detector",
    version,
    about = "Report per-subdirectory disk usage of a directory via du."
)]
struct Cli {
    /// Path to the size detector config file.
    #[arg(long, value_name = "FILE")]
    config: PathBuf,

    /// Directory for the log file; file logging is disabled without it.
    #[arg(long, value_name = "DIR")]
    logging_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Size a directory without the graphical interface.
    Shell(ShellArgs),
    /// Validate the config file and run the package check.
    Check,
}

#[derive(Debug, Args)]
struct ShellArgs {
    /// Path to the directory to size.
    #[arg(long, value_name = "DIR")]
    path: PathBuf,

    /// Optional JSON report output file.
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.logging_path.as_deref())?;

    match cli.command {
        Commands::Shell(args) => run_shell_command(&cli.config, args),
        Commands::Check => run_check_command(&cli.config),
    }
}

fn run_shell_command(config: &Path, args: ShellArgs) -> Result<()> {
    let session = open_session(config)?;
    ensure_enabled(session.availability(), &session.config().du_package)?;

    let report = session.probe(&args.path);
    print_report(&report);

    if let Some(output) = args.output {
        write_report(&report, &output)?;
        println!("Report written to {}", output.display());
    }

    match report.error {
        Some(message) if !report.success => bail!(message),
        _ => Ok(()),
    }
}

fn run_check_command(config: &Path) -> Result<()> {
    let session = open_session(config)?;
    let settings = session.config();
    let (width, height) = session.window_size();

    println!("Package manager: {}", settings.package_manager);
    println!("du package: {}", settings.du_package);
    println!(
        "Timeouts: du={}s general={}s",
        settings.du_timeout, settings.gen_timeout
    );
    println!("Window size: {width}x{height}");
    println!("Sizing: {}", describe_availability(session.availability()));

    ensure_enabled(session.availability(), &settings.du_package)
}

fn ensure_enabled(availability: &SizingAvailability, package: &str) -> Result<()> {
    match availability {
        SizingAvailability::Enabled => Ok(()),
        SizingAvailability::PackageNotFound => {
            bail!("package `{package}` not found; sizing is disabled")
        }
        SizingAvailability::GateFailed(_) => {
            bail!("runtime error during package check; for detailed information see the log file")
        }
    }
}

fn describe_availability(availability: &SizingAvailability) -> String {
    match availability {
        SizingAvailability::Enabled => "enabled".to_string(),
        SizingAvailability::PackageNotFound => "disabled (package not found)".to_string(),
        SizingAvailability::GateFailed(err) => format!("disabled ({err})"),
    }
}

fn print_report(report: &ProbeReport) {
    if !report.success {
        return;
    }
    println!("Sizes under {}:", report.directory.display());
    for entry in &report.entries {
        println!("{:>8}  {}", entry.size, entry.name);
    }
}
