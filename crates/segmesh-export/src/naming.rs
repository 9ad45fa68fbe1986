//! Output file names.
//!
//! Names are reduced to `[A-Za-z0-9._-]` so a segment name can never leave the
//! output directory. Names shared by two or more segments in one batch get the
//! label id appended, e.g. `Hippocampus_L_83`.

use std::collections::HashMap;

use segmesh_volume::LabelId;

use crate::catalog::fallback_name;

/// Replace every character outside `[A-Za-z0-9._-]` with `_`.
///
/// A leading `.` is also replaced so no output file is hidden. An empty
/// result falls back to `segment_<id>`.
pub fn sanitize_name(name: &str, id: LabelId) -> String {
    let mut out: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if out.starts_with('.') {
        out.replace_range(..1, "_");
    }
    if out.is_empty() {
        fallback_name(id)
    } else {
        out
    }
}

/// File stems for `(id, name)` pairs, unique within the batch.
///
/// Collisions are detected case-insensitively. Every member of a colliding
/// set gets `_<id>`, repeated until no two stems collide.
pub fn unique_stems(entries: &[(LabelId, String)]) -> Vec<String> {
    let mut stems: Vec<String> = entries
        .iter()
        .map(|(id, name)| sanitize_name(name, *id))
        .collect();

    for _ in 0..=entries.len() {
        let mut counts: HashMap<String, usize> = HashMap::with_capacity(stems.len());
        for stem in &stems {
            *counts.entry(stem.to_ascii_lowercase()).or_default() += 1;
        }
        if counts.values().all(|&n| n == 1) {
            return stems;
        }
        for (stem, (id, _)) in stems.iter_mut().zip(entries) {
            if counts[&stem.to_ascii_lowercase()] > 1 {
                stem.push_str(&format!("_{id}"));
            }
        }
    }

    // Only reachable for adversarial names; positions are unique.
    stems
        .into_iter()
        .enumerate()
        .map(|(i, stem)| format!("{stem}_{i}"))
        .collect()
}
