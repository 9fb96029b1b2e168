//! Mach-O Inspector CLI
//!
//! Command-line tool for dumping the structure of Mach-O images and
//! universal containers.

use anyhow::Context;
use clap::{Parser, ValueEnum};
use macho_inspect::formatter::{HumanFormatter, JsonFormatter, ReportFormatter};
use macho_inspect::{inspect_bytes_with_options, list_slices, parse_cpu_type, InspectOptions};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Mach-O structure inspector.
///
/// Prints header fields, load commands, segments, library dependencies and
/// the resolved entry point of thin or universal Mach-O files.
#[derive(Parser, Debug)]
#[command(name = "macho-inspect")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input file(s) to inspect
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// List the slices of a universal container instead of decoding one
    #[arg(short, long)]
    list: bool,

    /// Decode the universal slice at this index (takes precedence over --arch)
    #[arg(short, long)]
    slice: Option<usize>,

    /// Decode the first universal slice with this CPU type (arm64, x86_64, 0x0100000c, ...)
    #[arg(short, long, env = "MACHO_INSPECT_ARCH", value_parser = parse_cpu_type)]
    arch: Option<i32>,

    /// Output format
    #[arg(short, long, default_value = "human", env = "MACHO_INSPECT_FORMAT")]
    format: OutputFormat,

    /// Verbose output (every load command, debug logging)
    #[arg(short, long)]
    verbose: bool,

    /// Quiet mode (one line per file)
    #[arg(short, long)]
    quiet: bool,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}

impl Args {
    fn options(&self) -> InspectOptions {
        match (self.slice, self.arch) {
            (Some(index), _) => InspectOptions::with_index(index),
            (None, Some(cpu)) => InspectOptions::with_cpu_type(cpu),
            (None, None) => InspectOptions::new(),
        }
    }

    fn formatter(&self) -> Box<dyn ReportFormatter> {
        match self.format {
            OutputFormat::Human => Box::new(HumanFormatter {
                verbose: self.verbose,
                quiet: self.quiet,
            }),
            OutputFormat::Json => Box::new(JsonFormatter::new()),
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging if verbose
    if args.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("macho_inspect=debug")
            .with_writer(std::io::stderr)
            .init();
    }

    let options = args.options();
    let formatter = args.formatter();
    let mut success = true;

    for path in &args.files {
        if let Err(e) = inspect_path(path, &options, formatter.as_ref(), args.list) {
            eprintln!("Error inspecting {}: {e:#}", path.display());
            success = false;
        }
    }

    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn inspect_path(
    path: &Path,
    options: &InspectOptions,
    formatter: &dyn ReportFormatter,
    list: bool,
) -> anyhow::Result<()> {
    let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;

    if list {
        let slices = list_slices(&data)
            .context("reading architecture table")?
            .with_context(|| format!("{} is not a universal container", path.display()))?;
        print!("{}", formatter.format_slices(&slices, path));
        return Ok(());
    }

    let report = inspect_bytes_with_options(&data, options)?;
    print!("{}", formatter.format_report(&report, path));
    Ok(())
}
