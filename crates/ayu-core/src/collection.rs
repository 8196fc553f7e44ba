//! Builds the nested COLLECTION payload from the flat ancestor chains a test
//! runner reports for each collected test.

use std::collections::{BTreeMap, BTreeSet};

use crate::event::{CollectionMeta, CollectionPayload, NodeRecord, NodeType};

/// One element of a test's ancestor chain, outermost first.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainLink {
    pub name: String,
    pub nodeid: Option<String>,
    pub node_type: NodeType,
    pub path: Option<String>,
    pub lineno: Option<u32>,
    pub markers: Vec<String>,
}

impl ChainLink {
    pub fn new(name: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            name: name.into(),
            nodeid: None,
            node_type,
            path: None,
            lineno: None,
            markers: Vec::new(),
        }
    }

    pub fn nodeid(mut self, nodeid: impl Into<String>) -> Self {
        self.nodeid = Some(nodeid.into());
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn lineno(mut self, lineno: u32) -> Self {
        self.lineno = Some(lineno);
        self
    }

    pub fn markers<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.markers = markers.into_iter().map(Into::into).collect();
        self
    }

    fn record(&self, parent: Option<&ChainLink>) -> NodeRecord {
        NodeRecord {
            name: self.name.clone(),
            nodeid: self.nodeid.clone(),
            markers: self.markers.clone(),
            path: self.path.clone(),
            lineno: self.lineno,
            parent_name: parent.map(|p| p.name.clone()),
            parent_type: parent.map(|p| p.node_type.to_string()),
            node_type: self.node_type,
            ..NodeRecord::default()
        }
    }
}

/// Accumulates chains and merges shared prefixes.
///
/// Siblings are matched by name, so two chains through the same module
/// share one module record. The first chain to introduce a node decides its
/// fields.
#[derive(Debug, Default)]
pub struct CollectionBuilder {
    tree: BTreeMap<String, NodeRecord>,
    tests: BTreeSet<String>,
    markers: BTreeSet<String>,
}

impl CollectionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one test's chain. Empty chains are ignored; re-adding a chain
    /// changes nothing.
    pub fn add_chain(&mut self, chain: &[ChainLink]) -> &mut Self {
        let Some((root, rest)) = chain.split_first() else {
            return self;
        };

        let mut cursor = self
            .tree
            .entry(root.name.clone())
            .or_insert_with(|| root.record(None));
        let mut parent = root;
        for link in rest {
            let pos = match cursor.children.iter().position(|c| c.name == link.name) {
                Some(pos) => pos,
                None => {
                    cursor.children.push(link.record(Some(parent)));
                    cursor.children.len() - 1
                }
            };
            cursor = &mut cursor.children[pos];
            parent = link;
        }

        if let Some(leaf) = chain.last() {
            let key = leaf.nodeid.clone().unwrap_or_else(|| {
                chain
                    .iter()
                    .map(|link| link.name.as_str())
                    .collect::<Vec<_>>()
                    .join("::")
            });
            self.tests.insert(key);
            self.markers.extend(leaf.markers.iter().cloned());
        }
        self
    }

    pub fn test_count(&self) -> usize {
        self.tests.len()
    }

    pub fn finish(self) -> CollectionPayload {
        CollectionPayload {
            tree: self.tree,
            meta: CollectionMeta {
                test_count: self.tests.len(),
                markers: self.markers.into_iter().collect(),
            },
        }
    }
}
