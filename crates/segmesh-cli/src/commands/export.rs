//! segmesh export command - write one mesh file per selected label.

use anyhow::{Context, Result, bail};
use colored::Colorize;
use segmesh_export::{
    EmptySegmentPolicy, ExportConfig, ExportRequest, ExportSummary, Exporter, NamingMode,
    SegmentSelection, SegmentStatus, parse_format,
};

use super::load_catalog;
use crate::{Cli, ExportArgs, OutputFormat, output};

/// Exit code when the batch finished but some segments failed.
const PARTIAL_FAILURE: i32 = 2;

pub fn run(args: &ExportArgs, cli: &Cli) -> Result<i32> {
    let config = match &args.config {
        Some(path) => Some(
            ExportConfig::load(path)
                .with_context(|| format!("Failed to load export settings from {}", path.display()))?,
        ),
        None => None,
    };

    let request = build_request(args, config.as_ref())?;
    let labels_file = args
        .labels_file
        .as_deref()
        .or_else(|| config.as_ref().and_then(|c| c.labels_file.as_deref()));
    let catalog = load_catalog(labels_file)?;
    tracing::debug!(?request, segments = catalog.len(), "Export request assembled");

    output::info(
        &format!(
            "Exporting {} from {} to {}",
            request.targets,
            args.input.display(),
            request.output_dir.display()
        ),
        cli.format,
        cli.quiet,
    );

    let summary = Exporter::new(catalog)
        .export_path(&args.input, &request)
        .with_context(|| format!("Export from {} failed", args.input.display()))?;

    match cli.format {
        OutputFormat::Json => output::print(&summary, cli.format, cli.quiet),
        OutputFormat::Text => print_summary(&summary, cli),
    }

    Ok(if summary.is_success() { 0 } else { PARTIAL_FAILURE })
}

/// Preset for the selection, then config file values, then flags.
///
/// A selection flag wins over the config file's selection; either one picks
/// the preset.
fn build_request(args: &ExportArgs, config: Option<&ExportConfig>) -> Result<ExportRequest> {
    let Some(selection) =
        selection_from_flags(args).or_else(|| config.and_then(|c| c.selection.clone()))
    else {
        bail!("No labels selected: use --label, --labels, --group or --all");
    };

    let mut request = match &selection {
        SegmentSelection::AllPresent => ExportRequest::full_batch(),
        SegmentSelection::List(ids) => ExportRequest::custom_selection(ids.clone()),
        other => ExportRequest::new(other.clone()),
    };
    if let Some(config) = config {
        request = config.apply(request)?;
    }
    request.targets = selection;

    if let Some(token) = &args.mesh_format {
        request.format = parse_format(token)?;
    }
    if let Some(dir) = &args.output_dir {
        request.output_dir = dir.clone();
    }
    if let Some(spacing) = &args.resample {
        request.resample_spacing = Some(match spacing.as_slice() {
            [s] => [*s; 3],
            [x, y, z] => [*x, *y, *z],
            _ => bail!("--resample takes one value or three (x,y,z)"),
        });
    }
    if let Some(iterations) = args.smooth {
        request.smooth_iterations = iterations;
    }
    if let Some(relaxation) = args.relaxation {
        request.smooth_relaxation = relaxation;
    }
    if let Some(reduction) = args.reduction {
        request.decimate_reduction = reduction;
    }
    if args.normals {
        request.compute_normals = true;
    }
    if args.numeric_names {
        request.naming = NamingMode::NumericId;
    }
    if args.write_empty {
        request.empty_policy = EmptySegmentPolicy::WritePlaceholder;
    }
    if let Some(workers) = args.workers {
        request.workers = workers;
    }

    Ok(request)
}

fn selection_from_flags(args: &ExportArgs) -> Option<SegmentSelection> {
    if let Some(label) = args.label {
        Some(SegmentSelection::Single(label))
    } else if let Some(labels) = &args.labels {
        Some(SegmentSelection::List(labels.clone()))
    } else if let Some(group) = &args.group {
        Some(SegmentSelection::Group(group.clone()))
    } else if args.all {
        Some(SegmentSelection::AllPresent)
    } else {
        None
    }
}

fn print_summary(summary: &ExportSummary, cli: &Cli) {
    if cli.quiet {
        return;
    }

    println!("{}", "Export Summary".bold().underline());
    for result in &summary.results {
        let label = format!("{:>5}", result.label);
        match &result.status {
            SegmentStatus::Succeeded => println!(
                "  {} {} {} ({} faces)",
                "✓".green(),
                label,
                result.name,
                result.face_count
            ),
            SegmentStatus::Empty => println!(
                "  {} {} {} (not present in volume)",
                "-".dimmed(),
                label,
                result.name
            ),
            SegmentStatus::Failed(failure) => {
                println!("  {} {} {}: {}", "✗".red(), label, result.name, failure)
            }
        }
    }

    println!(
        "  {}: {} succeeded, {} empty, {} failed in {:.1} s",
        "Segments".cyan(),
        summary.succeeded,
        summary.empty,
        summary.failed,
        summary.elapsed_ms / 1000.0
    );
    println!("  {}: {}", "Output".cyan(), summary.output_dir.display());

    if summary.is_success() {
        output::success(
            &format!("{} mesh files written", summary.written_files().count()),
            cli.format,
            cli.quiet,
        );
    } else {
        output::warning(
            &format!("{} segments failed", summary.failed),
            cli.format,
            cli.quiet,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use segmesh_mesh::MeshFormat;
    use std::path::PathBuf;

    fn args(extra: &[&str]) -> ExportArgs {
        let mut argv = vec!["segmesh", "export", "seg.nii"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            crate::Commands::Export(args) => args,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_all_uses_full_batch_preset() {
        let request = build_request(&args(&["--all"]), None).unwrap();
        assert_eq!(request.targets, SegmentSelection::AllPresent);
        assert_eq!(request.resample_spacing, Some([0.5; 3]));
        assert_eq!(request.output_dir, PathBuf::from("meshes/all_segments"));
    }

    #[test]
    fn test_flags_override_preset() {
        let request = build_request(
            &args(&[
                "--labels",
                "75,83",
                "--mesh-format",
                "ply",
                "--resample",
                "1.0",
                "--reduction",
                "0.2",
                "--write-empty",
                "--workers",
                "3",
            ]),
            None,
        )
        .unwrap();
        assert_eq!(request.targets, SegmentSelection::List(vec![75, 83]));
        assert_eq!(request.output_dir, PathBuf::from("meshes/custom_segments"));
        assert_eq!(request.format, MeshFormat::Ply);
        assert_eq!(request.resample_spacing, Some([1.0; 3]));
        assert_eq!(request.decimate_reduction, 0.2);
        assert_eq!(request.empty_policy, EmptySegmentPolicy::WritePlaceholder);
        assert_eq!(request.workers, 3);
    }

    #[test]
    fn test_config_selection_used_without_flags() {
        let config = ExportConfig {
            selection: Some(SegmentSelection::Group("key_structures".into())),
            smooth_iterations: Some(4),
            ..Default::default()
        };
        let request = build_request(&args(&["--smooth", "7"]), Some(&config)).unwrap();
        assert_eq!(request.targets, SegmentSelection::Group("key_structures".into()));
        assert_eq!(request.smooth_iterations, 7);
    }

    #[test]
    fn test_config_selection_picks_preset() {
        let config = ExportConfig {
            selection: Some(SegmentSelection::AllPresent),
            ..Default::default()
        };
        let request = build_request(&args(&[]), Some(&config)).unwrap();
        assert_eq!(request.targets, SegmentSelection::AllPresent);
        assert_eq!(request.resample_spacing, Some([0.5; 3]));
        assert_eq!(request.output_dir, PathBuf::from("meshes/all_segments"));

        let config = ExportConfig {
            selection: Some(SegmentSelection::List(vec![75])),
            ..Default::default()
        };
        let request = build_request(&args(&[]), Some(&config)).unwrap();
        assert_eq!(request.output_dir, PathBuf::from("meshes/custom_segments"));
    }

    #[test]
    fn test_flag_selection_beats_config_selection() {
        let config = ExportConfig {
            selection: Some(SegmentSelection::AllPresent),
            ..Default::default()
        };
        let request = build_request(&args(&["--label", "75"]), Some(&config)).unwrap();
        assert_eq!(request.targets, SegmentSelection::Single(75));
        assert_eq!(request.resample_spacing, None);
    }

    #[test]
    fn test_config_file_between_preset_and_flags() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("export.toml");
        std::fs::write(
            &path,
            "format = \"obj\"\nsmooth_iterations = 3\nworkers = 2\nlabels_file = \"openmap.csv\"\n",
        )
        .unwrap();
        let config = ExportConfig::load(&path).unwrap();

        let request = build_request(&args(&["--all", "--workers", "6"]), Some(&config)).unwrap();

        assert_eq!(request.targets, SegmentSelection::AllPresent);
        assert_eq!(request.resample_spacing, Some([0.5; 3]));
        assert_eq!(request.format, MeshFormat::Obj);
        assert_eq!(request.smooth_iterations, 3);
        assert_eq!(request.workers, 6);
        assert_eq!(config.labels_file, Some(dir.path().join("openmap.csv")));
    }

    #[test]
    fn test_missing_selection() {
        assert!(build_request(&args(&[]), None).is_err());
    }

    #[test]
    fn test_bad_mesh_format() {
        let err = build_request(&args(&["--all", "--mesh-format", "gltf"]), None).unwrap_err();
        assert!(err.to_string().contains("gltf"));
    }

    #[test]
    fn test_resample_needs_one_or_three_values() {
        assert!(build_request(&args(&["--all", "--resample", "0.5,0.5"]), None).is_err());
    }
}
