//! Analysis of aggregated call trees
//!
//! Pure functions over a [`crate::aggregation::TreeSnapshot`], separated from
//! console presentation.

pub mod hot_paths;

pub use hot_paths::{analyze_hotspots, heaviest_paths, FunctionHotspot, HotPath};
