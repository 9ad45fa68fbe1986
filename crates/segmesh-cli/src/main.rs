//! segmesh: export segmentation labels as triangle meshes.
//!
//! A non-interactive front end to `segmesh-export`, suitable for scripting
//! and batch jobs.
//!
//! # Logging
//!
//! Set the `RUST_LOG` environment variable to control log output:
//! - `RUST_LOG=segmesh_export=info` - One line per segment
//! - `RUST_LOG=segmesh_volume=debug` - Loading and extraction details
//! - `RUST_LOG=segmesh::timing=info` - Per-segment timing
//! - `RUST_LOG=debug` - All debug output
//!
//! # Example
//!
//! ```bash
//! # Key structures from a label table
//! segmesh export seg.nii --labels-file openmap.csv --group key_structures
//!
//! # Every label, resampled to 0.5 mm, four workers, JSON summary
//! segmesh --format json export seg.nii --all --workers 4
//!
//! # List the labels present in a volume
//! segmesh labels seg.nii --labels-file openmap.csv
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use miette::Diagnostic;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod commands;
mod output;

use commands::{export, labels};

/// segmesh - Export segmentation labels as triangle meshes.
///
/// Turns an integer-labeled NIfTI volume into one smoothed, decimated mesh
/// file per anatomical region.
#[derive(Parser)]
#[command(name = "segmesh")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format for results
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Suppress all non-error output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Increase output verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for scripting
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Export selected labels as mesh files
    Export(ExportArgs),

    /// List the labels present in a volume
    Labels {
        /// Input label volume (.nii, .nii.gz, .hdr)
        input: PathBuf,

        /// Label table with names and groups (TOML, JSON or CSV)
        #[arg(long)]
        labels_file: Option<PathBuf>,
    },
}

/// Options of the `export` command.
///
/// Unset options fall back to the config file, then to the preset of the
/// chosen selection.
#[derive(Args)]
pub struct ExportArgs {
    /// Input label volume (.nii, .nii.gz, .hdr)
    pub input: PathBuf,

    /// Label table with names and groups (TOML, JSON or CSV)
    #[arg(long)]
    pub labels_file: Option<PathBuf>,

    /// Export settings file (TOML or JSON)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Export a single label
    #[arg(long, group = "selection")]
    pub label: Option<u32>,

    /// Export a comma-separated list of labels, e.g. 75,76,83,84
    #[arg(long, group = "selection", value_delimiter = ',')]
    pub labels: Option<Vec<u32>>,

    /// Export a named group from the label table
    #[arg(long, group = "selection")]
    pub group: Option<String>,

    /// Export every label present in the volume
    #[arg(long, group = "selection")]
    pub all: bool,

    /// Output directory
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Mesh file format: stl, stl-ascii, obj, ply, 3mf, vtk
    #[arg(long)]
    pub mesh_format: Option<String>,

    /// Resample to this spacing in mm before extraction (one value or x,y,z)
    #[arg(long, value_delimiter = ',', num_args = 1..=3)]
    pub resample: Option<Vec<f64>>,

    /// Laplacian smoothing iterations
    #[arg(long)]
    pub smooth: Option<usize>,

    /// Smoothing relaxation factor in (0, 1]
    #[arg(long)]
    pub relaxation: Option<f64>,

    /// Fraction of triangles to remove, in [0, 1)
    #[arg(long)]
    pub reduction: Option<f64>,

    /// Compute vertex normals (OBJ, PLY, VTK)
    #[arg(long)]
    pub normals: bool,

    /// Name files by label id instead of anatomical name
    #[arg(long)]
    pub numeric_names: bool,

    /// Write an empty mesh file for labels absent from the volume
    #[arg(long)]
    pub write_empty: bool,

    /// Number of segments processed in parallel
    #[arg(long)]
    pub workers: Option<usize>,
}

/// Initialize the tracing subscriber based on verbosity level.
fn init_tracing(verbose: u8, quiet: bool) {
    if quiet {
        return;
    }

    // RUST_LOG wins over -v flags.
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match verbose {
            0 => "warn",
            1 => "segmesh_export=info,segmesh_volume=info,segmesh_mesh=info",
            2 => "segmesh_export=debug,segmesh_volume=debug,segmesh_mesh=debug,segmesh::timing=info",
            _ => "trace",
        };
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .with(filter)
        .init();
}

/// Print an error with its code and help text when it carries them.
fn report_error(e: &anyhow::Error) {
    eprintln!("{}: {}", "Error".red().bold(), e);

    if let Some(err) = e.downcast_ref::<segmesh_export::ExportError>() {
        eprintln!("  {}: {}", "Code".cyan(), err.code_str());
        print_help(err);
    } else if let Some(err) = e.downcast_ref::<segmesh_export::CatalogError>() {
        eprintln!("  {}: {}", "Code".cyan(), err.error_code());
        print_help(err);
    } else if let Some(err) = e.downcast_ref::<segmesh_volume::VolumeError>() {
        eprintln!("  {}: {}", "Code".cyan(), err.error_code());
        print_help(err);
    }

    for cause in e.chain().skip(1) {
        eprintln!("  {}: {}", "Caused by".yellow(), cause);
    }
}

fn print_help(diagnostic: &dyn Diagnostic) {
    if let Some(help) = diagnostic.help() {
        eprintln!("  {}: {}", "Suggestion".green(), help);
    }
}

fn main() -> Result<()> {
    #[cfg(debug_assertions)]
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let result = match &cli.command {
        Commands::Export(args) => export::run(args, &cli),
        Commands::Labels { input, labels_file } => labels::run(input, labels_file.as_deref(), &cli),
    };

    match result {
        Ok(code) if code != 0 => std::process::exit(code),
        Ok(_) => Ok(()),
        Err(e) => {
            if !cli.quiet {
                report_error(&e);
            }
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_selection_flags_are_exclusive() {
        let parsed = Cli::try_parse_from(["segmesh", "export", "seg.nii", "--all", "--label", "3"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_label_list_parsing() {
        let cli = Cli::try_parse_from([
            "segmesh",
            "export",
            "seg.nii",
            "--labels",
            "75,76,83",
            "--resample",
            "0.5,0.5,1.0",
        ])
        .unwrap();
        let Commands::Export(args) = cli.command else {
            panic!("expected export");
        };
        assert_eq!(args.labels, Some(vec![75, 76, 83]));
        assert_eq!(args.resample, Some(vec![0.5, 0.5, 1.0]));
    }
}
