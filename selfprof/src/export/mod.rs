//! Report export
//!
//! Writes the aggregated call tree as a JSON document. This is a report of the
//! finished aggregation, not a raw trace format.

pub mod call_tree_json;

pub use call_tree_json::CallTreeReport;
