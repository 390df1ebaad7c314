//! JSON call-tree report
//!
//! ```json
//! {
//!   "pid": 4242,
//!   "samples": 1890,
//!   "stats": { "records_seen": 1904, "samples_accepted": 1890, ... },
//!   "hot_functions": [ { "name": "selfprof::load::spin", "self_hits": 1500, ... } ],
//!   "tree": { "name": "", "hits": 0, "children": [ { "name": "main", ... } ] }
//! }
//! ```
//!
//! The root node has an empty name and zero hits; children are sorted by name.

use anyhow::{Context, Result};
use log::info;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::aggregation::{SampleAggregator, TreeSnapshot};
use crate::analysis::{analyze_hotspots, FunctionHotspot};
use crate::domain::Pid;
use crate::profiling::DispatchStats;

#[derive(Debug, Clone, Serialize)]
pub struct CallTreeReport {
    pub pid: u32,
    pub samples: u64,
    pub stats: DispatchStats,
    pub hot_functions: Vec<FunctionHotspot>,
    pub tree: TreeSnapshot,
}

impl CallTreeReport {
    /// Build a report from a finished run. Call after the consumer was joined.
    #[must_use]
    pub fn new(pid: Pid, aggregator: &SampleAggregator, stats: DispatchStats) -> Self {
        let tree = aggregator.snapshot();
        Self {
            pid: pid.0,
            samples: aggregator.sample_count(),
            stats,
            hot_functions: analyze_hotspots(&tree),
            tree,
        }
    }

    /// Write the report as pretty-printed JSON
    ///
    /// # Errors
    /// Returns an error if serialization or the underlying writer fails
    pub fn export<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer_pretty(writer, self).context("Failed to write call tree JSON")?;
        Ok(())
    }

    /// Write the report to `path`, replacing any existing file
    ///
    /// # Errors
    /// Returns an error if the file cannot be created or written
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create export file {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        self.export(&mut writer)?;
        writer.flush().context("Failed to flush export file")?;
        info!("Call tree report written to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_json_shape() {
        let aggregator = SampleAggregator::new();
        aggregator.record(&["main", "work"]);
        aggregator.record(&["main", "work"]);
        aggregator.record(&["main"]);

        let report = CallTreeReport::new(Pid(7), &aggregator, DispatchStats::default());
        let mut buffer = Vec::new();
        report.export(&mut buffer).unwrap();

        let json: serde_json::Value = serde_json::from_slice(&buffer).unwrap();
        assert_eq!(json["pid"], 7);
        assert_eq!(json["samples"], 3);
        assert_eq!(json["tree"]["name"], "");
        assert_eq!(json["tree"]["children"][0]["name"], "main");
        assert_eq!(json["tree"]["children"][0]["hits"], 3);
        assert_eq!(json["tree"]["children"][0]["children"][0]["name"], "work");
        assert_eq!(json["tree"]["children"][0]["children"][0]["hits"], 2);
        assert_eq!(json["hot_functions"][0]["name"], "work");
    }

    #[test]
    fn test_empty_report() {
        let report =
            CallTreeReport::new(Pid(1), &SampleAggregator::new(), DispatchStats::default());
        let mut buffer = Vec::new();
        report.export(&mut buffer).unwrap();

        let json: serde_json::Value = serde_json::from_slice(&buffer).unwrap();
        assert_eq!(json["samples"], 0);
        assert!(json["tree"]["children"].as_array().unwrap().is_empty());
    }
}
