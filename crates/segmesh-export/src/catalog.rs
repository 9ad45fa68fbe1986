//! Label-to-name lookup and named label groups.
//!
//! A catalog is built in code or loaded from a label table:
//!
//! ```toml
//! [[labels]]
//! id = 75
//! name = "Hippocampus_L"
//! groups = ["key_structures"]
//!
//! [groups]
//! key_structures = [75, 83, 120]
//! ```
//!
//! JSON with the same shape, and CSV or TSV (`id,name[,group;group]`, one
//! label per record, `#` comments, optional header row) are also accepted.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, info};

use segmesh_volume::{BACKGROUND, LabelId, LabelVolume};

use crate::error::CatalogError;

/// Group name that expands to every label the catalog knows.
pub const ALL_GROUP: &str = "all";

/// Voxels per rayon work item when scanning for present labels.
const SCAN_CHUNK: usize = 1 << 16;

/// Name used for labels without an anatomical name.
pub fn fallback_name(id: LabelId) -> String {
    format!("segment_{id}")
}

/// One known label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentDescriptor {
    pub id: LabelId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub groups: BTreeSet<String>,
}

impl SegmentDescriptor {
    pub fn new(id: LabelId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: Some(name.into()),
            groups: BTreeSet::new(),
        }
    }

    /// The anatomical name, or `segment_<id>`.
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| fallback_name(self.id))
    }
}

/// On-disk shape of TOML and JSON label tables.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogFile {
    #[serde(default)]
    labels: Vec<SegmentDescriptor>,
    #[serde(default)]
    groups: BTreeMap<String, Vec<LabelId>>,
}

/// Lookup table from label ids to names and groups.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelCatalog {
    segments: BTreeMap<LabelId, SegmentDescriptor>,
    groups: BTreeMap<String, Vec<LabelId>>,
}

impl LabelCatalog {
    /// An empty catalog: every label gets its fallback name.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named label.
    pub fn with_segment(mut self, id: LabelId, name: impl Into<String>) -> Self {
        self.insert(SegmentDescriptor::new(id, name));
        self
    }

    /// Add or extend a group. Members keep their order; repeats are ignored.
    pub fn with_group(mut self, group: impl Into<String>, ids: impl IntoIterator<Item = LabelId>) -> Self {
        self.add_to_group(group.into(), ids);
        self
    }

    /// Insert a descriptor, replacing any previous one with the same id.
    /// The descriptor's groups gain the id as a member.
    pub fn insert(&mut self, mut descriptor: SegmentDescriptor) {
        let id = descriptor.id;
        for (group, members) in &self.groups {
            if members.contains(&id) {
                descriptor.groups.insert(group.clone());
            }
        }
        let groups: Vec<String> = descriptor.groups.iter().cloned().collect();
        self.segments.insert(id, descriptor);
        for group in groups {
            self.add_to_group(group, [id]);
        }
    }

    fn add_to_group(&mut self, group: String, ids: impl IntoIterator<Item = LabelId>) {
        let members = self.groups.entry(group.clone()).or_default();
        for id in ids {
            if !members.contains(&id) {
                members.push(id);
            }
        }
        for &id in members.iter() {
            if let Some(descriptor) = self.segments.get_mut(&id) {
                descriptor.groups.insert(group.clone());
            }
        }
    }

    /// Load a label table, choosing the parser by extension:
    /// `.toml`, `.json`, `.tsv`/`.tab`/`.txt` as tab-separated text, anything
    /// else as CSV.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let catalog = match extension.as_deref() {
            Some("toml") => Self::from_toml(&contents),
            Some("json") => Self::from_json(&contents),
            Some("tsv" | "tab" | "txt") => Self::from_delimited(&contents, b'\t'),
            _ => Self::from_delimited(&contents, b','),
        }
        .map_err(|details| CatalogError::parse(path, details))?;

        info!(
            path = %path.display(),
            labels = catalog.len(),
            groups = catalog.groups.len(),
            "Loaded label table"
        );
        Ok(catalog)
    }

    /// Parse a TOML label table.
    pub fn from_toml(contents: &str) -> Result<Self, String> {
        let file: CatalogFile = toml::from_str(contents).map_err(|e| e.to_string())?;
        Self::from_file(file)
    }

    /// Parse a JSON label table.
    pub fn from_json(contents: &str) -> Result<Self, String> {
        let file: CatalogFile = serde_json::from_str(contents).map_err(|e| e.to_string())?;
        Self::from_file(file)
    }

    fn from_file(file: CatalogFile) -> Result<Self, String> {
        let mut catalog = Self::new();
        for descriptor in file.labels {
            if catalog.segments.contains_key(&descriptor.id) {
                return Err(format!("label {} is listed twice", descriptor.id));
            }
            catalog.insert(descriptor);
        }
        for (group, ids) in file.groups {
            catalog.add_to_group(group, ids);
        }
        Ok(catalog)
    }

    /// Parse delimited text: `id,name[,group;group]`, one label per record.
    ///
    /// Fields may be quoted. Lines starting with `#` are comments. A first
    /// record whose id column is not a number is taken as a header.
    pub fn from_delimited(contents: &str, delimiter: u8) -> Result<Self, String> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .delimiter(delimiter)
            .flexible(true)
            .comment(Some(b'#'))
            .trim(csv::Trim::All)
            .from_reader(contents.as_bytes());

        let mut catalog = Self::new();
        let mut first_row = true;

        for result in reader.records() {
            let record = result.map_err(|e| e.to_string())?;
            let line = record.position().map_or(0, |p| p.line());
            let id_field = record.get(0).unwrap_or_default();
            if record.len() == 1 && id_field.is_empty() {
                continue;
            }

            let id = match id_field.parse::<LabelId>() {
                Ok(id) => id,
                Err(_) if first_row => {
                    first_row = false;
                    continue;
                }
                Err(_) => return Err(format!("line {line}: {id_field:?} is not a label id")),
            };
            first_row = false;

            if catalog.segments.contains_key(&id) {
                return Err(format!("line {line}: label {id} is listed twice"));
            }

            let name = record.get(1).filter(|n| !n.is_empty()).map(String::from);
            let groups = record
                .get(2)
                .map(|g| {
                    g.split([';', '|'])
                        .map(str::trim)
                        .filter(|g| !g.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default();

            catalog.insert(SegmentDescriptor { id, name, groups });
        }
        Ok(catalog)
    }

    /// Number of labels with a descriptor.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn descriptor(&self, id: LabelId) -> Option<&SegmentDescriptor> {
        self.segments.get(&id)
    }

    /// Anatomical name of a label, or `segment_<id>`.
    pub fn name(&self, id: LabelId) -> String {
        self.segments
            .get(&id)
            .map_or_else(|| fallback_name(id), SegmentDescriptor::display_name)
    }

    /// Names for a set of ids. Unknown ids get their fallback name.
    pub fn resolve_names(&self, ids: &[LabelId]) -> BTreeMap<LabelId, String> {
        ids.iter().map(|&id| (id, self.name(id))).collect()
    }

    /// Defined group names, sorted.
    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    /// Members of a group in catalog order.
    ///
    /// [`ALL_GROUP`] expands to every known non-background label unless the
    /// table defines a group of that name itself.
    pub fn expand_group(&self, group: &str) -> Result<Vec<LabelId>, CatalogError> {
        if let Some(members) = self.groups.get(group) {
            return Ok(members.clone());
        }
        if group == ALL_GROUP {
            return Ok(self
                .segments
                .keys()
                .copied()
                .filter(|&id| id != BACKGROUND)
                .collect());
        }

        let mut available: Vec<&str> = self.group_names().collect();
        available.push(ALL_GROUP);
        Err(CatalogError::UnknownGroup {
            group: group.to_string(),
            available: available.join(", "),
        })
    }

    /// Distinct non-background labels present in `volume`, ascending.
    pub fn all_labels_present(&self, volume: &LabelVolume) -> Vec<LabelId> {
        labels_present(volume)
    }
}

/// Distinct non-background labels present in `volume`, ascending.
///
/// Scans the grid once; chunks are scanned in parallel and their label sets merged.
pub fn labels_present(volume: &LabelVolume) -> Vec<LabelId> {
    let present = volume
        .labels()
        .par_chunks(SCAN_CHUNK)
        .fold(BTreeSet::new, |mut set, chunk| {
            let mut last = None;
            for &label in chunk {
                // Runs of one label are common; skip the set insert for repeats.
                if last != Some(label) {
                    set.insert(label);
                    last = Some(label);
                }
            }
            set
        })
        .reduce(BTreeSet::new, |mut a, mut b| {
            a.append(&mut b);
            a
        });

    let labels: Vec<LabelId> = present.into_iter().filter(|&l| l != BACKGROUND).collect();
    debug!(voxels = volume.voxel_count(), labels = labels.len(), "Scanned volume for labels");
    labels
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> LabelCatalog {
        LabelCatalog::new()
            .with_segment(75, "Hippocampus_L")
            .with_segment(83, "Amygdala_L")
            .with_segment(120, "Thalamus_L")
            .with_group("key_structures", [75, 83, 120])
    }

    #[test]
    fn test_names_and_fallback() {
        let c = catalog();
        assert_eq!(c.name(75), "Hippocampus_L");
        assert_eq!(c.name(999), "segment_999");

        let names = c.resolve_names(&[83, 7]);
        assert_eq!(names[&83], "Amygdala_L");
        assert_eq!(names[&7], "segment_7");
    }

    #[test]
    fn test_expand_group_keeps_order() {
        let c = LabelCatalog::new().with_group("g", [9, 2, 5, 2]);
        assert_eq!(c.expand_group("g").unwrap(), vec![9, 2, 5]);
    }

    #[test]
    fn test_unknown_group() {
        let err = catalog().expand_group("cortex").unwrap_err();
        match err {
            CatalogError::UnknownGroup { group, available } => {
                assert_eq!(group, "cortex");
                assert!(available.contains("key_structures"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_all_pseudo_group() {
        let c = catalog().with_segment(0, "Background");
        assert_eq!(c.expand_group(ALL_GROUP).unwrap(), vec![75, 83, 120]);
    }

    #[test]
    fn test_group_membership_recorded_on_descriptor() {
        let c = catalog();
        assert!(c.descriptor(83).unwrap().groups.contains("key_structures"));
    }

    #[test]
    fn test_from_toml() {
        let c = LabelCatalog::from_toml(
            r#"
            [[labels]]
            id = 75
            name = "Hippocampus_L"
            groups = ["limbic"]

            [[labels]]
            id = 76

            [groups]
            key_structures = [75, 83]
            "#,
        )
        .unwrap();

        assert_eq!(c.len(), 2);
        assert_eq!(c.name(76), "segment_76");
        assert_eq!(c.expand_group("limbic").unwrap(), vec![75]);
        assert_eq!(c.expand_group("key_structures").unwrap(), vec![75, 83]);
    }

    #[test]
    fn test_from_json() {
        let c = LabelCatalog::from_json(
            r#"{"labels": [{"id": 3, "name": "Putamen_R"}], "groups": {"basal": [3]}}"#,
        )
        .unwrap();
        assert_eq!(c.name(3), "Putamen_R");
        assert_eq!(c.expand_group("basal").unwrap(), vec![3]);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let err = LabelCatalog::from_json(r#"{"labels": [{"id": 3}, {"id": 3}]}"#).unwrap_err();
        assert!(err.contains("twice"));
    }

    #[test]
    fn test_from_delimited() {
        let c = LabelCatalog::from_delimited(
            "# OpenMAP level 1\n\
             id,name,groups\n\
             75,Hippocampus_L,key_structures;limbic\n\
             83,\"Amygdala_L\",key_structures\n\
             \n\
             90,Caudate_R\n",
            b',',
        )
        .unwrap();

        assert_eq!(c.len(), 3);
        assert_eq!(c.name(83), "Amygdala_L");
        assert_eq!(c.name(90), "Caudate_R");
        assert_eq!(c.expand_group("key_structures").unwrap(), vec![75, 83]);
        assert_eq!(c.expand_group("limbic").unwrap(), vec![75]);
    }

    #[test]
    fn test_quoted_field_with_delimiter() {
        let c = LabelCatalog::from_delimited(
            "id,name,groups\n75,\"Caudate, head\",key_structures\n",
            b',',
        )
        .unwrap();

        assert_eq!(c.name(75), "Caudate, head");
        assert_eq!(c.expand_group("key_structures").unwrap(), vec![75]);
        let groups = &c.descriptor(75).unwrap().groups;
        assert_eq!(groups.iter().collect::<Vec<_>>(), vec!["key_structures"]);
    }

    #[test]
    fn test_tab_separated() {
        let c = LabelCatalog::from_delimited("90\tCaudate_R\tbasal\n91\tCaudate_L\n", b'\t').unwrap();
        assert_eq!(c.name(90), "Caudate_R");
        assert_eq!(c.name(91), "Caudate_L");
        assert_eq!(c.expand_group("basal").unwrap(), vec![90]);
    }

    #[test]
    fn test_delimited_bad_id() {
        let err = LabelCatalog::from_delimited("1,A\nx,B\n", b',').unwrap_err();
        assert!(err.contains("line 2"), "{err}");
    }

    #[test]
    fn test_load_picks_delimiter_from_extension() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("labels.tsv");
        std::fs::write(&path, "id\tname\n12\tPallidum, external\n").unwrap();

        let c = LabelCatalog::load(&path).unwrap();
        assert_eq!(c.name(12), "Pallidum, external");
    }

    #[test]
    fn test_labels_present() {
        let labels = vec![0, 5, 5, 0, 2, 0, 9, 2];
        let volume = LabelVolume::new([2, 2, 2], labels, [1.0; 3]).unwrap();
        assert_eq!(labels_present(&volume), vec![2, 5, 9]);
    }
}
