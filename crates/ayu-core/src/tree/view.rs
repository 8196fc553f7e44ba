//! Read-only projections of the tree for the dashboard: filtered rows and
//! search.

use crate::event::{NodeType, Status};

use super::{NodeId, TestTree};

/// Which leaves the dashboard shows. Every category is shown by default;
/// turning one off hides the leaves in it, and folders left without a
/// visible leaf disappear with them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeFilter {
    pub marked: bool,
    pub passed: bool,
    pub failed: bool,
    pub skipped: bool,
}

impl Default for TreeFilter {
    fn default() -> Self {
        Self {
            marked: true,
            passed: true,
            failed: true,
            skipped: true,
        }
    }
}

impl TreeFilter {
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    fn shows(&self, status: Status, favourite: bool) -> bool {
        if favourite && !self.marked {
            return false;
        }
        match status {
            Status::Passed | Status::Xpassed => self.passed,
            Status::Failed | Status::Error => self.failed,
            Status::Skipped | Status::Xfailed => self.skipped,
            Status::Empty | Status::Queued => true,
        }
    }
}

/// A visible node and its depth below the root (top-level nodes are 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Row {
    pub id: NodeId,
    pub depth: usize,
}

impl TestTree {
    /// Depth-first rows of every node that survives `filter`.
    pub fn rows(&self, filter: &TreeFilter) -> Vec<Row> {
        // Children are always created after their parent, so a reverse scan
        // sees every child before its parent.
        let mut visible = vec![false; self.nodes.len()];
        for (i, node) in self.nodes.iter().enumerate().skip(1).rev() {
            visible[i] = if node.is_leaf() {
                filter.shows(node.status, node.favourite)
            } else {
                node.children.iter().any(|c| visible[c.0])
            };
        }

        let mut rows = Vec::new();
        let mut stack: Vec<Row> = self.root()
            .children
            .iter()
            .rev()
            .map(|&id| Row { id, depth: 0 })
            .collect();
        while let Some(row) = stack.pop() {
            if !visible[row.id.0] {
                continue;
            }
            rows.push(row);
            stack.extend(
                self.nodes[row.id.0]
                    .children
                    .iter()
                    .rev()
                    .map(|&id| Row { id, depth: row.depth + 1 }),
            );
        }
        rows
    }

    /// Find nodes by id.
    ///
    /// The query matches case-insensitively against each node's id (or name,
    /// for nodes without one). A leading `:TYPE` restricts matches to one
    /// node type, e.g. `:CLASS group` or just `:FUNCTION`. An unknown type
    /// matches nothing.
    pub fn search(&self, query: &str) -> Vec<NodeId> {
        let query = query.trim();
        let (type_filter, needle) = match query.strip_prefix(':') {
            Some(rest) => {
                let (ty, needle) = rest.split_once(' ').unwrap_or((rest, ""));
                match ty.parse::<NodeType>() {
                    Ok(ty) => (Some(ty), needle.trim()),
                    Err(_) => return Vec::new(),
                }
            }
            None => (None, query),
        };
        let needle = needle.to_lowercase();

        self.iter()
            .filter(|(_, node)| type_filter.is_none_or(|ty| node.node_type == ty))
            .filter(|(_, node)| {
                let haystack = node.nodeid.as_deref().unwrap_or(&node.name);
                haystack.to_lowercase().contains(&needle)
            })
            .map(|(id, _)| id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::event::{CollectionPayload, NodeRecord, Outcome};

    fn tree() -> TestTree {
        let module = |name: &str, tests: &[&str]| {
            tests.iter().fold(
                NodeRecord::new(name, NodeType::Module).nodeid(format!("tests/{name}")),
                |module, test| {
                    module.child(
                        NodeRecord::new(*test, NodeType::Function)
                            .nodeid(format!("tests/{name}::{test}")),
                    )
                },
            )
        };
        let mut tree = BTreeMap::new();
        tree.insert(
            "tests".to_string(),
            NodeRecord::new("tests", NodeType::Dir)
                .child(module("test_math.py", &["test_add", "test_sub"]))
                .child(module("test_io.py", &["test_read"]))
                .child(
                    NodeRecord::new("test_cls.py", NodeType::Module).child(
                        NodeRecord::new("TestReader", NodeType::Class)
                            .nodeid("tests/test_cls.py::TestReader")
                            .child(
                                NodeRecord::new("test_open", NodeType::Function)
                                    .nodeid("tests/test_cls.py::TestReader::test_open"),
                            ),
                    ),
                ),
        );
        TestTree::from_collection(&CollectionPayload {
            tree,
            meta: Default::default(),
        })
    }

    fn names(tree: &TestTree, rows: &[Row]) -> Vec<String> {
        rows.iter()
            .map(|row| format!("{}{}", "  ".repeat(row.depth), tree.node(row.id).unwrap().name))
            .collect()
    }

    #[test]
    fn default_filter_shows_everything_depth_first() {
        let tree = tree();
        let rows = tree.rows(&TreeFilter::default());
        assert_eq!(
            names(&tree, &rows),
            vec![
                "tests",
                "  test_math.py",
                "    test_add",
                "    test_sub",
                "  test_io.py",
                "    test_read",
                "  test_cls.py",
                "    TestReader",
                "      test_open",
            ]
        );
    }

    #[test]
    fn hiding_passed_drops_empty_folders() {
        let mut tree = tree();
        tree.apply_outcome("tests/test_io.py::test_read", Outcome::Passed).unwrap();
        tree.apply_outcome("tests/test_math.py::test_add", Outcome::Passed).unwrap();
        tree.apply_outcome("tests/test_math.py::test_sub", Outcome::Failed).unwrap();

        let filter = TreeFilter {
            passed: false,
            ..TreeFilter::default()
        };
        let shown = names(&tree, &tree.rows(&filter));
        assert!(!shown.iter().any(|n| n.trim() == "test_io.py"));
        assert!(!shown.iter().any(|n| n.trim() == "test_add"));
        assert!(shown.iter().any(|n| n.trim() == "test_sub"));
        assert!(shown.iter().any(|n| n.trim() == "test_math.py"));
    }

    #[test]
    fn hiding_marked_hides_favourites() {
        let mut tree = tree();
        tree.mark_by_nodeid("tests/test_cls.py::TestReader", Some(true)).unwrap();
        let filter = TreeFilter {
            marked: false,
            ..TreeFilter::default()
        };
        let shown = names(&tree, &tree.rows(&filter));
        assert!(!shown.iter().any(|n| n.trim() == "test_open"));
        assert!(!shown.iter().any(|n| n.trim() == "test_cls.py"));
        assert!(!filter.is_default());
    }

    #[test]
    fn search_matches_node_ids() {
        let tree = tree();
        let hits: Vec<String> = tree
            .search("MATH")
            .into_iter()
            .map(|id| tree.node(id).unwrap().name.clone())
            .collect();
        assert_eq!(hits, vec!["test_math.py", "test_add", "test_sub"]);
    }

    #[test]
    fn search_with_type_prefix() {
        let tree = tree();
        let classes = tree.search(":CLASS");
        assert_eq!(classes.len(), 1);
        assert_eq!(tree.node(classes[0]).unwrap().name, "TestReader");

        let functions = tree.search(":function read");
        assert_eq!(functions.len(), 2);

        assert!(tree.search(":SESSION").is_empty());
    }
}
