//! Consumer-side session state: the test tree, the coverage table, and a
//! short log of what the producer said, all fed from dispatched events.

use std::collections::VecDeque;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Local};

use crate::coverage::CoverageTable;
use crate::event::{Event, EventKind};
use crate::registry::{Handler, SharedRegistry};
use crate::tree::{TestTree, TreeError};

/// Oldest log entries are dropped past this many.
pub const LOG_CAPACITY: usize = 500;

#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub at: DateTime<Local>,
    pub kind: EventKind,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct Session {
    tree: TestTree,
    coverage: CoverageTable,
    log: VecDeque<LogEntry>,
    revision: u64,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tree(&self) -> &TestTree {
        &self.tree
    }

    /// Mutable access for user actions (favourite toggles, clearing).
    pub fn tree_mut(&mut self) -> &mut TestTree {
        self.revision += 1;
        &mut self.tree
    }

    pub fn coverage(&self) -> &CoverageTable {
        &self.coverage
    }

    /// Log entries, oldest first.
    pub fn log(&self) -> impl DoubleEndedIterator<Item = &LogEntry> {
        self.log.iter()
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
        self.revision += 1;
    }

    /// Bumped on every applied event or mutation; lets readers skip redraws.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Fold one event into the session.
    pub fn apply(&mut self, event: &Event) {
        self.revision += 1;
        match event {
            Event::Collection(payload) => {
                self.tree.build(payload);
                self.note(
                    EventKind::Collection,
                    format!(
                        "collected {} tests ({} nodes)",
                        self.tree.total_leaves(),
                        self.tree.len()
                    ),
                );
            }
            Event::Scheduled(nodeids) => {
                let queued = self.tree.apply_scheduled(nodeids);
                self.note(
                    EventKind::Scheduled,
                    format!("queued {queued} of {} scheduled tests", nodeids.len()),
                );
            }
            Event::Outcome(payload) => {
                match self.tree.apply_outcome(&payload.nodeid, payload.outcome) {
                    Ok(_) => {}
                    Err(TreeError::UnknownNodeId(nodeid)) => {
                        tracing::debug!(%nodeid, "outcome for a test not in the current tree");
                    }
                    Err(e) => tracing::debug!(error = %e, "outcome not applied"),
                }
                self.note(
                    EventKind::Outcome,
                    format!("{}: {}", payload.nodeid, payload.outcome),
                );
            }
            Event::Coverage(payload) => {
                self.coverage.replace_from_payload(payload);
                let summary = self.coverage.summary();
                self.note(
                    EventKind::Coverage,
                    format!(
                        "coverage {:.1}% across {} files",
                        summary.percent_covered, summary.files
                    ),
                );
            }
            Event::Report(value) => self.note(EventKind::Report, describe(value)),
            Event::Debug(value) => self.note(EventKind::Debug, describe(value)),
        }
    }

    fn note(&mut self, kind: EventKind, message: String) {
        if self.log.len() == LOG_CAPACITY {
            self.log.pop_front();
        }
        self.log.push_back(LogEntry {
            at: Local::now(),
            kind,
            message,
        });
    }
}

/// One-line rendering of a free-form payload.
fn describe(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Object(map) => match (map.get("nodeid"), map.get("outcome")) {
            (Some(serde_json::Value::String(nodeid)), Some(serde_json::Value::String(outcome))) => {
                format!("{nodeid}: {outcome}")
            }
            _ => value.to_string(),
        },
        other => other.to_string(),
    }
}

/// Session handle shared by the dispatch loop (writer) and the dashboard
/// (reader).
///
/// Every mutation happens under the write lock, so readers always see the
/// state between two complete handler invocations.
#[derive(Debug, Clone, Default)]
pub struct SharedSession {
    inner: Arc<RwLock<Session>>,
}

impl SharedSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Session> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Session> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Route every event kind in `registry` to this session.
    pub fn install_handlers(&self, registry: &SharedRegistry) {
        for kind in EventKind::ALL {
            registry.register(kind, self.handler());
        }
    }

    fn handler(&self) -> Handler {
        let session = self.clone();
        Box::new(move |event| session.write().apply(event))
    }
}
