use crate::event::{NodeRecord, NodeType, Status};

/// Index of a node in its [`super::TestTree`] arena.
///
/// Ids are only meaningful for the tree snapshot that produced them; a
/// rebuild invalidates every id except [`super::TestTree::ROOT`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// One element of the suite: a directory, module, class, or test.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    /// Display name, unique among siblings.
    pub name: String,
    /// Stable id; always present on tests, optional on structural nodes.
    pub nodeid: Option<String>,
    pub node_type: NodeType,
    pub markers: Vec<String>,
    pub path: Option<String>,
    pub lineno: Option<u32>,
    pub parent_name: Option<String>,
    pub parent_type: Option<String>,
    /// Run status; only meaningful on leaves.
    pub status: Status,
    /// Selected for the next run.
    pub favourite: bool,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
}

impl TreeNode {
    pub(crate) fn root() -> Self {
        Self {
            name: String::new(),
            nodeid: None,
            node_type: NodeType::Dir,
            markers: Vec::new(),
            path: None,
            lineno: None,
            parent_name: None,
            parent_type: None,
            status: Status::Empty,
            favourite: false,
            parent: None,
            children: Vec::new(),
        }
    }

    /// A fresh node for `record`; status and favourite always start cleared.
    pub(crate) fn from_record(name: String, record: &NodeRecord, parent: NodeId) -> Self {
        Self {
            name,
            nodeid: record.nodeid.clone(),
            node_type: record.node_type,
            markers: record.markers.clone(),
            path: record.path.clone(),
            lineno: record.lineno,
            parent_name: record.parent_name.clone(),
            parent_type: record.parent_type.clone(),
            status: Status::Empty,
            favourite: false,
            parent: Some(parent),
            children: Vec::new(),
        }
    }

    /// Fill in whatever a duplicate record knows that this node does not.
    pub(crate) fn absorb(&mut self, record: &NodeRecord) {
        if self.nodeid.is_none() {
            self.nodeid = record.nodeid.clone();
        }
        if self.path.is_none() {
            self.path = record.path.clone();
        }
        if self.lineno.is_none() {
            self.lineno = record.lineno;
        }
        for marker in &record.markers {
            if !self.markers.contains(marker) {
                self.markers.push(marker.clone());
            }
        }
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Leaves carry run status; nodes with children are structural.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}
