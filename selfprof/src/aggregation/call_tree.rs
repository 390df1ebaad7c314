//! # Call Tree
//!
//! Aggregates samples (ordered symbol names, outermost frame first) into a
//! tree where every node is one unique call path from the root.
//!
//! ```text
//! insert [main, run, work]      root
//! insert [main, run, work]       └─ main (3)
//! insert [main, idle]                ├─ idle (1)
//!                                    └─ run  (2)
//!                                        └─ work (2)
//! ```
//!
//! Nodes live in an arena (`Vec<CallTreeNode>`) and refer to each other by
//! [`NodeId`]. Children are keyed by symbol name, so each name appears at most
//! once below a given parent. Hit counts are per node: every node on an
//! inserted path is incremented by one.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Longest symbol name stored in a node, in bytes
pub const MAX_SYMBOL_LEN: usize = 255;

/// Index of a node in the tree's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// The root node (empty call prefix)
    pub const ROOT: NodeId = NodeId(0);
}

#[derive(Debug, Clone)]
pub struct CallTreeNode {
    name: Arc<str>,
    hits: u64,
    children: BTreeMap<Arc<str>, NodeId>,
}

impl CallTreeNode {
    fn new(name: Arc<str>) -> Self {
        Self {
            name,
            hits: 0,
            children: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of samples whose path passes through this node
    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Children ordered by symbol name
    pub fn children(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.children.values().copied()
    }

    #[must_use]
    pub fn child_count(&self) -> usize {
        self.children.len()
    }
}

#[derive(Debug, Clone)]
pub struct CallTree {
    nodes: Vec<CallTreeNode>,
}

impl Default for CallTree {
    fn default() -> Self {
        Self::new()
    }
}

impl CallTree {
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: vec![CallTreeNode::new(Arc::from(""))],
        }
    }

    /// Add one sample. Returns `false` (and changes nothing) for an empty sample.
    ///
    /// Each name is looked up among the current node's children; a missing
    /// child is created, then the walk descends and increments it.
    pub fn insert<S: AsRef<str>>(&mut self, sample: &[S]) -> bool {
        if sample.is_empty() {
            return false;
        }

        let mut current = NodeId::ROOT;
        for name in sample {
            let name = bounded(name.as_ref());
            let existing = self.nodes[current.0].children.get(name).copied();
            current = match existing {
                Some(child) => child,
                None => self.push_child(current, name),
            };
            self.nodes[current.0].hits += 1;
        }
        true
    }

    fn push_child(&mut self, parent: NodeId, name: &str) -> NodeId {
        let id = NodeId(self.nodes.len());
        let name: Arc<str> = Arc::from(name);
        self.nodes.push(CallTreeNode::new(Arc::clone(&name)));
        self.nodes[parent.0].children.insert(name, id);
        id
    }

    #[must_use]
    pub fn root(&self) -> &CallTreeNode {
        &self.nodes[NodeId::ROOT.0]
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&CallTreeNode> {
        self.nodes.get(id.0)
    }

    #[must_use]
    pub fn child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.nodes.get(parent.0)?.children.get(bounded(name)).copied()
    }

    /// Follow `path` from the root
    #[must_use]
    pub fn find_path<S: AsRef<str>>(&self, path: &[S]) -> Option<&CallTreeNode> {
        let mut current = NodeId::ROOT;
        for name in path {
            current = self.child(current, name.as_ref())?;
        }
        self.node(current)
    }

    /// Sum of the root children's hit counts (equals the number of samples inserted)
    #[must_use]
    pub fn root_hits(&self) -> u64 {
        self.root().children().filter_map(|id| self.node(id)).map(CallTreeNode::hits).sum()
    }

    /// Number of nodes, root excluded
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len() - 1
    }

    /// True when nothing but the root exists
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Owned nested copy for reporting
    #[must_use]
    pub fn snapshot(&self) -> TreeSnapshot {
        self.snapshot_node(NodeId::ROOT)
    }

    fn snapshot_node(&self, id: NodeId) -> TreeSnapshot {
        let node = &self.nodes[id.0];
        TreeSnapshot {
            name: node.name.to_string(),
            hits: node.hits,
            children: node.children().map(|child| self.snapshot_node(child)).collect(),
        }
    }
}

/// Truncate to [`MAX_SYMBOL_LEN`] bytes without splitting a character
pub(crate) fn bounded(name: &str) -> &str {
    if name.len() <= MAX_SYMBOL_LEN {
        return name;
    }
    let mut end = MAX_SYMBOL_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

/// Point-in-time copy of a [`CallTree`], children sorted by name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeSnapshot {
    pub name: String,
    pub hits: u64,
    pub children: Vec<TreeSnapshot>,
}

impl TreeSnapshot {
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&TreeSnapshot> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Samples attributed to this node itself rather than to a callee
    #[must_use]
    pub fn self_hits(&self) -> u64 {
        let below: u64 = self.children.iter().map(|c| c.hits).sum();
        self.hits.saturating_sub(below)
    }

    /// Sum of the children's hit counts
    #[must_use]
    pub fn total_hits(&self) -> u64 {
        self.children.iter().map(|c| c.hits).sum()
    }
}
