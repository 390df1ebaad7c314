//! Call path aggregation
//!
//! - [`call_tree`]: arena-backed tree of per-path hit counts
//! - [`aggregator`]: the locked tree plus the accepted-sample counter, shared
//!   between the consumer thread and whoever reports on the run

pub mod aggregator;
pub mod call_tree;

pub use aggregator::{SampleAggregator, SampleCounter};
pub use call_tree::{CallTree, CallTreeNode, NodeId, TreeSnapshot, MAX_SYMBOL_LEN};
