//! segmesh labels command - list the labels present in a volume.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use segmesh_export::LabelCatalog;
use segmesh_volume::{BACKGROUND, LabelId, LabelVolume};
use serde::Serialize;

use super::load_catalog;
use crate::{Cli, OutputFormat, output};

#[derive(Serialize)]
struct LabelReport {
    input: String,
    dims: [usize; 3],
    spacing: [f64; 3],
    labels: Vec<LabelEntry>,
}

#[derive(Serialize)]
struct LabelEntry {
    id: LabelId,
    name: String,
    voxels: usize,
    volume_mm3: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    groups: Vec<String>,
}

pub fn run(input: &Path, labels_file: Option<&Path>, cli: &Cli) -> Result<i32> {
    let catalog = load_catalog(labels_file)?;
    let volume = LabelVolume::load(input)
        .with_context(|| format!("Failed to load label volume from {}", input.display()))?;

    let report = build_report(input, &volume, &catalog);

    match cli.format {
        OutputFormat::Json => output::print(&report, cli.format, cli.quiet),
        OutputFormat::Text => print_text(&report, cli),
    }

    Ok(0)
}

fn build_report(input: &Path, volume: &LabelVolume, catalog: &LabelCatalog) -> LabelReport {
    let spacing = volume.spacing();
    let voxel_volume = spacing[0] * spacing[1] * spacing[2];

    let labels = count_voxels(volume.labels())
        .into_iter()
        .map(|(id, voxels)| LabelEntry {
            id,
            name: catalog.name(id),
            voxels,
            volume_mm3: voxels as f64 * voxel_volume,
            groups: catalog
                .descriptor(id)
                .map(|d| d.groups.iter().cloned().collect())
                .unwrap_or_default(),
        })
        .collect();

    LabelReport {
        input: input.display().to_string(),
        dims: volume.dims(),
        spacing,
        labels,
    }
}

/// Voxel count per non-background label, ascending by id.
fn count_voxels(labels: &[LabelId]) -> BTreeMap<LabelId, usize> {
    let mut counts = BTreeMap::new();
    for &label in labels.iter().filter(|&&l| l != BACKGROUND) {
        *counts.entry(label).or_insert(0) += 1;
    }
    counts
}

fn print_text(report: &LabelReport, cli: &Cli) {
    if cli.quiet {
        return;
    }

    println!("{}", format!("Labels in {}", report.input).bold().underline());
    println!(
        "  {}: {} x {} x {} voxels at {:.3} x {:.3} x {:.3} mm",
        "Grid".cyan(),
        report.dims[0],
        report.dims[1],
        report.dims[2],
        report.spacing[0],
        report.spacing[1],
        report.spacing[2]
    );
    println!();

    for entry in &report.labels {
        let groups = if entry.groups.is_empty() {
            String::new()
        } else {
            format!(" [{}]", entry.groups.join(", ")).dimmed().to_string()
        };
        println!(
            "  {:>5}  {:<32} {:>10} voxels {:>12.1} mm³{}",
            entry.id, entry.name, entry.voxels, entry.volume_mm3, groups
        );
    }

    if report.labels.is_empty() {
        output::warning("No labels besides background", cli.format, cli.quiet);
    } else {
        output::success(
            &format!("{} labels present", report.labels.len()),
            cli.format,
            cli.quiet,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_skips_background() {
        let counts = count_voxels(&[0, 3, 3, 0, 7, 3]);
        assert_eq!(counts.into_iter().collect::<Vec<_>>(), vec![(3, 3), (7, 1)]);
    }

    #[test]
    fn test_report_uses_catalog_names() {
        let volume = LabelVolume::new([2, 2, 1], vec![0, 5, 5, 9], [1.0, 1.0, 2.0]).unwrap();
        let catalog = LabelCatalog::new()
            .with_segment(5, "Putamen_L")
            .with_group("basal_ganglia", [5]);

        let report = build_report(Path::new("seg.nii"), &volume, &catalog);

        assert_eq!(report.labels.len(), 2);
        let putamen = &report.labels[0];
        assert_eq!(putamen.name, "Putamen_L");
        assert_eq!(putamen.voxels, 2);
        assert_eq!(putamen.volume_mm3, 4.0);
        assert_eq!(putamen.groups, vec!["basal_ganglia".to_string()]);
        assert_eq!(report.labels[1].name, "segment_9");
        assert!(report.labels[1].groups.is_empty());
    }
}
