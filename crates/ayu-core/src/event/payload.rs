use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Kind of suite element a tree node represents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeType {
    /// Directories, including pytest packages.
    #[default]
    #[serde(alias = "PACKAGE")]
    Dir,
    Module,
    Class,
    Function,
    Coroutine,
}

impl NodeType {
    pub const ALL: [NodeType; 5] = [
        NodeType::Dir,
        NodeType::Module,
        NodeType::Class,
        NodeType::Function,
        NodeType::Coroutine,
    ];

    /// Whether nodes of this type are runnable tests.
    pub fn is_test(self) -> bool {
        matches!(self, Self::Function | Self::Coroutine)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Dir => "DIR",
            Self::Module => "MODULE",
            Self::Class => "CLASS",
            Self::Function => "FUNCTION",
            Self::Coroutine => "COROUTINE",
        };
        f.write_str(s)
    }
}

impl FromStr for NodeType {
    type Err = NodeTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DIR" | "PACKAGE" => Ok(Self::Dir),
            "MODULE" => Ok(Self::Module),
            "CLASS" => Ok(Self::Class),
            "FUNCTION" => Ok(Self::Function),
            "COROUTINE" => Ok(Self::Coroutine),
            _ => Err(NodeTypeParseError(s.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`NodeType`] string.
#[derive(Debug, Clone)]
pub struct NodeTypeParseError(pub String);

impl fmt::Display for NodeTypeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid node type: {:?}", self.0)
    }
}

impl std::error::Error for NodeTypeParseError {}

// ---------------------------------------------------------------------------

/// Final outcome of a single test, as reported by the producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Passed,
    Failed,
    Skipped,
    Xfailed,
    Xpassed,
    Error,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(Status::from(*self).as_str())
    }
}

/// Run status of a tree node. `Empty` is the initial and reset state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    #[serde(rename = "")]
    Empty,
    Queued,
    Passed,
    Failed,
    Skipped,
    Xfailed,
    Xpassed,
    Error,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Empty => "",
            Self::Queued => "queued",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Xfailed => "xfailed",
            Self::Xpassed => "xpassed",
            Self::Error => "error",
        }
    }
}

impl From<Outcome> for Status {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Passed => Self::Passed,
            Outcome::Failed => Self::Failed,
            Outcome::Skipped => Self::Skipped,
            Outcome::Xfailed => Self::Xfailed,
            Outcome::Xpassed => Self::Xpassed,
            Outcome::Error => Self::Error,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// COLLECTION
// ---------------------------------------------------------------------------

/// One element of the collected suite as sent on the wire.
///
/// Every field except `children` may be omitted by the producer; structural
/// records frequently carry nothing but a name and their children.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub nodeid: Option<String>,
    #[serde(default)]
    pub markers: Vec<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub lineno: Option<u32>,
    #[serde(default)]
    pub parent_name: Option<String>,
    #[serde(default)]
    pub parent_type: Option<String>,
    #[serde(rename = "type", default)]
    pub node_type: NodeType,
    #[serde(default)]
    pub favourite: bool,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub children: Vec<NodeRecord>,
}

impl NodeRecord {
    /// A record with only a name and type; the rest is filled in by the
    /// builder-style setters.
    pub fn new(name: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            name: name.into(),
            node_type,
            ..Self::default()
        }
    }

    pub fn nodeid(mut self, nodeid: impl Into<String>) -> Self {
        self.nodeid = Some(nodeid.into());
        self
    }

    pub fn markers(mut self, markers: Vec<String>) -> Self {
        self.markers = markers;
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

    pub fn child(mut self, child: NodeRecord) -> Self {
        self.children.push(child);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionMeta {
    #[serde(default)]
    pub test_count: usize,
    #[serde(default)]
    pub markers: Vec<String>,
}

/// Payload of a COLLECTION event: the collected suite keyed by top-level
/// name, plus summary metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionPayload {
    pub tree: BTreeMap<String, NodeRecord>,
    #[serde(default)]
    pub meta: CollectionMeta,
}

// ---------------------------------------------------------------------------
// OUTCOME
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomePayload {
    pub nodeid: String,
    pub outcome: Outcome,
}

// ---------------------------------------------------------------------------
// COVERAGE
// ---------------------------------------------------------------------------

/// Inclusive range of source lines, encoded as a two-element array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(u32, u32)", into = "(u32, u32)")]
pub struct LineRange {
    pub start: u32,
    pub end: u32,
}

impl LineRange {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.start).saturating_add(1)
    }

    pub fn contains(&self, line: u32) -> bool {
        (self.start..=self.end).contains(&line)
    }
}

impl From<(u32, u32)> for LineRange {
    fn from((start, end): (u32, u32)) -> Self {
        Self { start, end }
    }
}

impl From<LineRange> for (u32, u32) {
    fn from(range: LineRange) -> Self {
        (range.start, range.end)
    }
}

impl fmt::Display for LineRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// Per-file coverage measurement as sent on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileCoverage {
    pub n_statements: u64,
    pub n_missed: u64,
    pub percent_covered: f64,
    #[serde(default)]
    pub lines_missing: Vec<LineRange>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoveragePayload {
    pub coverage_dict: BTreeMap<String, FileCoverage>,
}
