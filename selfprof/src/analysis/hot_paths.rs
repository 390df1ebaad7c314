//! Hotspot analysis for aggregated call trees.
//!
//! Two views of the same snapshot:
//!
//! - **Hot functions** ([`analyze_hotspots`]): per function name, the samples
//!   whose innermost frame is that function (*self*) and the samples whose
//!   path contains it anywhere (*inclusive*)
//! - **Heaviest paths** ([`heaviest_paths`]): full root-to-leaf call paths
//!   ranked by the samples that ended exactly there
//!
//! ```text
//! main (4)                    self      inclusive
//!  ├─ run (3)          main   1 (25%)   4 (100%)
//!  │   └─ work (2)     run    1 (25%)   3 (75%)
//!  └─ (self 1)         work   2 (50%)   2 (50%)
//! ```
//!
//! Recursive functions count once per sample for inclusive hits.

use serde::Serialize;
use std::collections::HashMap;

use crate::aggregation::TreeSnapshot;
use crate::profiling::percentage;

/// A function with its sample counts across the whole tree
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionHotspot {
    pub name: String,
    /// Samples where this function was the innermost frame
    pub self_hits: u64,
    /// Samples where this function appeared anywhere on the stack
    pub inclusive_hits: u64,
    /// `self_hits` as a share of all samples (0.0 - 100.0)
    pub self_percentage: f64,
    pub inclusive_percentage: f64,
}

/// A root-to-leaf call path and the samples that ended on it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HotPath {
    /// Outermost frame first
    pub frames: Vec<String>,
    pub hits: u64,
    pub percentage: f64,
}

#[derive(Default)]
struct Counts {
    self_hits: u64,
    inclusive_hits: u64,
}

/// Rank functions by self hits, then inclusive hits, then name
#[must_use]
pub fn analyze_hotspots(root: &TreeSnapshot) -> Vec<FunctionHotspot> {
    let total = root.total_hits();
    let mut counts: HashMap<&str, Counts> = HashMap::new();
    let mut stack = Vec::new();
    for child in &root.children {
        walk_functions(child, &mut stack, &mut counts);
    }

    let mut hotspots: Vec<FunctionHotspot> = counts
        .into_iter()
        .map(|(name, c)| FunctionHotspot {
            name: name.to_string(),
            self_hits: c.self_hits,
            inclusive_hits: c.inclusive_hits,
            self_percentage: percentage(c.self_hits, total),
            inclusive_percentage: percentage(c.inclusive_hits, total),
        })
        .collect();

    hotspots.sort_by(|a, b| {
        b.self_hits
            .cmp(&a.self_hits)
            .then(b.inclusive_hits.cmp(&a.inclusive_hits))
            .then_with(|| a.name.cmp(&b.name))
    });
    hotspots
}

fn walk_functions<'a>(
    node: &'a TreeSnapshot,
    stack: &mut Vec<&'a str>,
    counts: &mut HashMap<&'a str, Counts>,
) {
    let entry = counts.entry(node.name.as_str()).or_default();
    entry.self_hits += node.self_hits();
    // Deeper frames of the same function are already covered by this node
    if !stack.contains(&node.name.as_str()) {
        entry.inclusive_hits += node.hits;
    }

    stack.push(&node.name);
    for child in &node.children {
        walk_functions(child, stack, counts);
    }
    stack.pop();
}

/// The `limit` paths with the most samples ending on them, heaviest first
#[must_use]
pub fn heaviest_paths(root: &TreeSnapshot, limit: usize) -> Vec<HotPath> {
    let total = root.total_hits();
    let mut paths = Vec::new();
    let mut stack = Vec::new();
    for child in &root.children {
        walk_paths(child, &mut stack, &mut paths);
    }

    paths.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    paths
        .into_iter()
        .take(limit)
        .map(|(frames, hits)| HotPath {
            frames: frames.into_iter().map(str::to_string).collect(),
            hits,
            percentage: percentage(hits, total),
        })
        .collect()
}

fn walk_paths<'a>(
    node: &'a TreeSnapshot,
    stack: &mut Vec<&'a str>,
    paths: &mut Vec<(Vec<&'a str>, u64)>,
) {
    stack.push(&node.name);
    let ended_here = node.self_hits();
    if ended_here > 0 {
        paths.push((stack.clone(), ended_here));
    }
    for child in &node.children {
        walk_paths(child, stack, paths);
    }
    stack.pop();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::CallTree;

    fn tree(samples: &[&[&str]]) -> TreeSnapshot {
        let mut tree = CallTree::new();
        for &sample in samples {
            tree.insert(sample);
        }
        tree.snapshot()
    }

    #[test]
    fn test_self_and_inclusive_hits() {
        let snapshot = tree(&[
            &["main", "run", "work"],
            &["main", "run", "work"],
            &["main", "run"],
            &["main"],
        ]);
        let hotspots = analyze_hotspots(&snapshot);

        let names: Vec<&str> = hotspots.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, ["work", "main", "run"]);

        let work = &hotspots[0];
        assert_eq!((work.self_hits, work.inclusive_hits), (2, 2));
        assert!((work.self_percentage - 50.0).abs() < f64::EPSILON);

        let main = &hotspots[1];
        assert_eq!((main.self_hits, main.inclusive_hits), (1, 4));
        assert!((main.inclusive_percentage - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_recursion_counts_once_inclusively() {
        let snapshot = tree(&[&["f", "f", "f"], &["f"]]);
        let hotspots = analyze_hotspots(&snapshot);

        assert_eq!(hotspots.len(), 1);
        assert_eq!(hotspots[0].self_hits, 2);
        assert_eq!(hotspots[0].inclusive_hits, 2);
    }

    #[test]
    fn test_same_function_under_different_parents_merges() {
        let snapshot = tree(&[&["a", "leaf"], &["b", "leaf"]]);
        let leaf = analyze_hotspots(&snapshot).into_iter().find(|h| h.name == "leaf").unwrap();
        assert_eq!(leaf.self_hits, 2);
    }

    #[test]
    fn test_heaviest_paths_ranked_and_limited() {
        let snapshot = tree(&[
            &["main", "a"],
            &["main", "b"],
            &["main", "b"],
            &["main", "b", "c"],
        ]);
        let paths = heaviest_paths(&snapshot, 2);

        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0].frames, ["main", "b"]);
        assert_eq!(paths[0].hits, 2);
        assert_eq!(paths[1].frames, ["main", "a"]);
        assert!((paths[0].percentage - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_tree_has_no_hotspots() {
        let snapshot = CallTree::new().snapshot();
        assert!(analyze_hotspots(&snapshot).is_empty());
        assert!(heaviest_paths(&snapshot, 10).is_empty());
    }
}
