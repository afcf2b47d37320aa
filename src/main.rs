//! Deprecation audit - CLI Entry Point

use anyhow::Result;
use clap::Parser;
use deprecate::audit::{scan_with, ScanOptions};
use deprecate::expiry::check_namespace_with;
use deprecate::report::{AuditReport, ReportFormat};
use deprecate::DeprecationManifest;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "deprecate-audit",
    about = "Audit deprecated callables declared in a deprecation manifest",
    version
)]
struct Args {
    /// Path to the deprecation manifest
    #[arg(default_value = "deprecations.yaml")]
    manifest: PathBuf,

    /// Glob pattern of modules or members to skip (repeatable)
    #[arg(short, long, value_name = "PATTERN")]
    ignore: Vec<String>,

    /// Do not scan submodules
    #[arg(long)]
    no_recursive: bool,

    /// Report callables past their removal version
    #[arg(long)]
    check_expiry: bool,

    /// Version to check removal deadlines against (defaults to the package version)
    #[arg(long, value_name = "VERSION")]
    current_version: Option<String>,

    /// Exit successfully even when errors are found
    #[arg(long)]
    skip_errors: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
    format: ReportFormat,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "warn")]
    log_level: Level,

    /// Print an example manifest and exit
    #[arg(long)]
    print_config: bool,

    /// Validate the manifest and exit
    #[arg(long)]
    validate: bool,
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if args.print_config {
        let example = include_str!("../demos/deprecations.yaml");
        println!("{}", example);
        return Ok(ExitCode::SUCCESS);
    }

    if !args.manifest.exists() {
        anyhow::bail!("Manifest file not found: {:?}", args.manifest);
    }
    info!(path = ?args.manifest, "Loading manifest");
    let manifest = DeprecationManifest::from_file(&args.manifest)?;

    if args.validate {
        println!("Manifest is valid");
        return Ok(ExitCode::SUCCESS);
    }

    let root = manifest.build()?;
    let recursive = manifest.audit.recursive && !args.no_recursive;
    let options = ScanOptions::new(recursive)
        .with_ignore(manifest.audit.ignore.iter().chain(args.ignore.iter()))?;

    let mut report = AuditReport::new(root.name(), scan_with(&root, &options));
    if args.check_expiry {
        let expired = check_namespace_with(&root, args.current_version.as_deref(), &options)?;
        report = report.with_expired(expired);
    }

    print!("{}", report.render(args.format)?);
    Ok(ExitCode::from(report.exit_code(args.skip_errors)))
}
