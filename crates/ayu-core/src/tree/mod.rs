//! In-memory model of the collected test suite.
//!
//! The tree is an arena: nodes live in a `Vec` and refer to each other by
//! [`NodeId`]. Every walk (build, mark propagation, filtering) is iterative,
//! so suite depth never matters.
//!
//! Lifecycle:
//!
//! ```text
//! COLLECTION -> build()            (full replace, everything empty/unmarked)
//! SCHEDULED  -> apply_scheduled()  (counters reset, listed leaves queued)
//! OUTCOME    -> apply_outcome()    (leaf status set, counters moved)
//! user       -> mark()             (favourite toggled, propagated)
//! ```

mod node;
pub mod view;

use std::collections::{HashMap, HashSet};

use crate::event::{CollectionMeta, CollectionPayload, NodeRecord, Outcome, Status};

pub use node::{NodeId, TreeNode};
pub use view::{Row, TreeFilter};

/// Errors from tree updates.
///
/// Both are expected during normal operation (an outcome can race a
/// rebuild), so callers generally log and move on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    #[error("no test with node id {0:?} in the current tree")]
    UnknownNodeId(String),

    #[error("node {0:?} does not exist in the current tree")]
    NoSuchNode(NodeId),
}

/// Running totals for the current run, maintained incrementally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounters {
    pub queued: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub xfailed: usize,
    pub xpassed: usize,
    pub error: usize,
}

impl RunCounters {
    fn bucket_mut(&mut self, outcome: Outcome) -> &mut usize {
        match outcome {
            Outcome::Passed => &mut self.passed,
            Outcome::Failed => &mut self.failed,
            Outcome::Skipped => &mut self.skipped,
            Outcome::Xfailed => &mut self.xfailed,
            Outcome::Xpassed => &mut self.xpassed,
            Outcome::Error => &mut self.error,
        }
    }

    pub fn get(&self, outcome: Outcome) -> usize {
        match outcome {
            Outcome::Passed => self.passed,
            Outcome::Failed => self.failed,
            Outcome::Skipped => self.skipped,
            Outcome::Xfailed => self.xfailed,
            Outcome::Xpassed => self.xpassed,
            Outcome::Error => self.error,
        }
    }

    /// Number of outcomes received since the last SCHEDULED.
    pub fn finished(&self) -> usize {
        self.passed + self.failed + self.skipped + self.xfailed + self.xpassed + self.error
    }
}

/// The test session tree.
#[derive(Debug, Clone)]
pub struct TestTree {
    nodes: Vec<TreeNode>,
    /// Leaf node id -> arena index.
    index: HashMap<String, NodeId>,
    counters: RunCounters,
    total_leaves: usize,
    marked_leaves: usize,
    meta: CollectionMeta,
}

impl Default for TestTree {
    fn default() -> Self {
        Self::new()
    }
}

impl TestTree {
    /// The synthetic root every snapshot hangs off.
    pub const ROOT: NodeId = NodeId(0);

    /// An empty tree: just the root.
    pub fn new() -> Self {
        Self {
            nodes: vec![TreeNode::root()],
            index: HashMap::new(),
            counters: RunCounters::default(),
            total_leaves: 0,
            marked_leaves: 0,
            meta: CollectionMeta::default(),
        }
    }

    /// Build a fresh tree from a COLLECTION payload.
    ///
    /// Records are walked root-to-leaf; at every level the child with the
    /// record's name is reused if it already exists, so duplicate records
    /// share their ancestors instead of forming parallel branches.
    pub fn from_collection(payload: &CollectionPayload) -> Self {
        let mut tree = Self::new();
        tree.meta = payload.meta.clone();

        let mut by_name: HashMap<(NodeId, String), NodeId> = HashMap::new();
        let mut stack: Vec<(&NodeRecord, String, NodeId)> = payload
            .tree
            .iter()
            .rev()
            .map(|(key, record)| {
                let name = if record.name.is_empty() {
                    key.clone()
                } else {
                    record.name.clone()
                };
                (record, name, Self::ROOT)
            })
            .collect();

        while let Some((record, name, parent)) = stack.pop() {
            let id = match by_name.get(&(parent, name.clone())) {
                Some(&existing) => {
                    tree.nodes[existing.0].absorb(record);
                    existing
                }
                None => {
                    let id = NodeId(tree.nodes.len());
                    tree.nodes.push(TreeNode::from_record(name.clone(), record, parent));
                    tree.nodes[parent.0].children.push(id);
                    by_name.insert((parent, name), id);
                    id
                }
            };
            stack.extend(
                record
                    .children
                    .iter()
                    .rev()
                    .map(|child| (child, child.name.clone(), id)),
            );
        }

        for (i, node) in tree.nodes.iter().enumerate().skip(1) {
            if !node.is_leaf() {
                continue;
            }
            tree.total_leaves += 1;
            if let Some(nodeid) = &node.nodeid {
                if tree.index.insert(nodeid.clone(), NodeId(i)).is_some() {
                    tracing::warn!(%nodeid, "duplicate node id in collection, keeping the last one");
                }
            }
        }

        tracing::debug!(
            nodes = tree.nodes.len() - 1,
            leaves = tree.total_leaves,
            test_count = tree.meta.test_count,
            "built test tree"
        );
        tree
    }

    /// Discard the current snapshot and rebuild from `payload`.
    pub fn build(&mut self, payload: &CollectionPayload) {
        *self = Self::from_collection(payload);
    }

    // -- Lookup --

    pub fn node(&self, id: NodeId) -> Option<&TreeNode> {
        self.nodes.get(id.0)
    }

    pub fn root(&self) -> &TreeNode {
        &self.nodes[Self::ROOT.0]
    }

    /// Number of nodes, excluding the root.
    pub fn len(&self) -> usize {
        self.nodes.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All nodes except the root, in creation (depth-first) order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &TreeNode)> {
        self.nodes
            .iter()
            .enumerate()
            .skip(1)
            .map(|(i, node)| (NodeId(i), node))
    }

    /// Find the leaf with `nodeid`.
    pub fn find_leaf(&self, nodeid: &str) -> Option<NodeId> {
        self.index.get(nodeid).copied()
    }

    /// Find any node (leaf or structural) with `nodeid`.
    pub fn find(&self, nodeid: &str) -> Option<NodeId> {
        self.find_leaf(nodeid).or_else(|| {
            self.iter()
                .find(|(_, node)| node.nodeid.as_deref() == Some(nodeid))
                .map(|(id, _)| id)
        })
    }

    pub fn child_by_name(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.node(parent)?
            .children
            .iter()
            .copied()
            .find(|child| self.nodes[child.0].name == name)
    }

    /// Ancestors of `id`, nearest first, ending with the root.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let mut current = self.node(id).and_then(|node| node.parent);
        std::iter::from_fn(move || {
            let id = current?;
            current = self.nodes[id.0].parent;
            Some(id)
        })
    }

    fn is_leaf_node(&self, id: NodeId) -> bool {
        id != Self::ROOT && self.nodes[id.0].is_leaf()
    }

    // -- Counters --

    pub fn counters(&self) -> RunCounters {
        self.counters
    }

    pub fn total_leaves(&self) -> usize {
        self.total_leaves
    }

    pub fn marked_leaves(&self) -> usize {
        self.marked_leaves
    }

    pub fn meta(&self) -> &CollectionMeta {
        &self.meta
    }

    // -- Run updates --

    /// Mark the listed leaves as queued for a new run.
    ///
    /// All run counters are reset first. Unknown ids are skipped and
    /// listing an id twice queues it once. Returns how many leaves were
    /// queued.
    pub fn apply_scheduled(&mut self, nodeids: &[String]) -> usize {
        self.counters = RunCounters::default();

        let mut seen = HashSet::new();
        for nodeid in nodeids {
            let Some(id) = self.find_leaf(nodeid) else {
                tracing::debug!(%nodeid, "scheduled node id not in tree, ignoring");
                continue;
            };
            if !seen.insert(id) {
                continue;
            }
            self.nodes[id.0].status = Status::Queued;
            self.counters.queued += 1;
        }
        self.counters.queued
    }

    /// Record the outcome of one test.
    ///
    /// Status is set on the leaf only; ancestors are not touched. An unknown
    /// id leaves the tree and its counters untouched.
    pub fn apply_outcome(&mut self, nodeid: &str, outcome: Outcome) -> Result<NodeId, TreeError> {
        let id = self
            .find_leaf(nodeid)
            .ok_or_else(|| TreeError::UnknownNodeId(nodeid.to_owned()))?;

        self.nodes[id.0].status = Status::from(outcome);
        self.counters.queued = self.counters.queued.saturating_sub(1);
        *self.counters.bucket_mut(outcome) += 1;
        Ok(id)
    }

    /// Reset every leaf to `Status::Empty` and zero the run counters.
    pub fn clear_statuses(&mut self) {
        for node in self.nodes.iter_mut() {
            node.status = Status::Empty;
        }
        self.counters = RunCounters::default();
    }

    // -- Favourites --

    /// Toggle (or set, when `explicit` is given) the favourite flag on `id`.
    ///
    /// The target value is applied to the node and its entire subtree. When
    /// the target is `false`, every ancestor up to and including the root is
    /// cleared too. Setting `true` never propagates upwards, so a fully
    /// marked folder is not promoted to marked. Returns the target value.
    pub fn mark(&mut self, id: NodeId, explicit: Option<bool>) -> Result<bool, TreeError> {
        let node = self.node(id).ok_or(TreeError::NoSuchNode(id))?;
        let target = explicit.unwrap_or(!node.favourite);

        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if self.is_leaf_node(current) {
                let leaf = &mut self.nodes[current.0];
                if leaf.favourite != target {
                    leaf.favourite = target;
                    if target {
                        self.marked_leaves += 1;
                    } else {
                        self.marked_leaves -= 1;
                    }
                }
            } else {
                let node = &mut self.nodes[current.0];
                node.favourite = target;
                stack.extend(node.children.iter().copied());
            }
        }

        if !target {
            let mut current = self.nodes[id.0].parent;
            while let Some(ancestor) = current {
                let node = &mut self.nodes[ancestor.0];
                node.favourite = false;
                current = node.parent;
            }
        }

        Ok(target)
    }

    /// [`Self::mark`] addressed by node id string.
    pub fn mark_by_nodeid(&mut self, nodeid: &str, explicit: Option<bool>) -> Result<bool, TreeError> {
        let id = self
            .find(nodeid)
            .ok_or_else(|| TreeError::UnknownNodeId(nodeid.to_owned()))?;
        self.mark(id, explicit)
    }

    /// Unmark everything.
    pub fn clear_marks(&mut self) {
        // The root always exists, so this cannot fail.
        let _ = self.mark(Self::ROOT, Some(false));
    }

    /// Node ids of marked leaves in tree order: the selection for the next
    /// run.
    pub fn marked_nodeids(&self) -> Vec<String> {
        self.iter()
            .filter(|(id, node)| node.favourite && self.is_leaf_node(*id))
            .filter_map(|(_, node)| node.nodeid.clone())
            .collect()
    }
}
