//! Typed events exchanged between a test run and the dashboard, and their
//! wire encoding.
//!
//! An event body is a JSON object `{"type": <KIND>, "payload": <payload>}`.
//! The kind is always explicit so the receiver can route a frame before it
//! understands the payload schema.

pub mod payload;

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

pub use payload::{
    CollectionMeta, CollectionPayload, CoveragePayload, FileCoverage, LineRange, NodeRecord,
    NodeType, Outcome, OutcomePayload, Status,
};

/// Discriminator for [`Event`]; one slot per kind in the handler registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventKind {
    Collection,
    Scheduled,
    Outcome,
    Report,
    Coverage,
    Debug,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::Collection,
        EventKind::Scheduled,
        EventKind::Outcome,
        EventKind::Report,
        EventKind::Coverage,
        EventKind::Debug,
    ];

    /// Dense index of this kind, `0..ALL.len()`.
    pub fn index(self) -> usize {
        match self {
            Self::Collection => 0,
            Self::Scheduled => 1,
            Self::Outcome => 2,
            Self::Report => 3,
            Self::Coverage => 4,
            Self::Debug => 5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Collection => "COLLECTION",
            Self::Scheduled => "SCHEDULED",
            Self::Outcome => "OUTCOME",
            Self::Report => "REPORT",
            Self::Coverage => "COVERAGE",
            Self::Debug => "DEBUG",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = EventKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| EventKindParseError(s.to_owned()))
    }
}

/// Error returned when parsing an invalid [`EventKind`] string.
#[derive(Debug, Clone)]
pub struct EventKindParseError(pub String);

impl fmt::Display for EventKindParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid event kind: {:?}", self.0)
    }
}

impl std::error::Error for EventKindParseError {}

/// A single message from the producer. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "UPPERCASE")]
pub enum Event {
    /// The suite was (re)collected; the tree is rebuilt from this payload.
    Collection(CollectionPayload),
    /// Node ids about to run.
    Scheduled(Vec<String>),
    /// One test finished.
    Outcome(OutcomePayload),
    /// Free-form per-test report.
    Report(serde_json::Value),
    /// Coverage measured for the run.
    Coverage(CoveragePayload),
    /// Free-form diagnostics from the producer.
    Debug(serde_json::Value),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Collection(_) => EventKind::Collection,
            Self::Scheduled(_) => EventKind::Scheduled,
            Self::Outcome(_) => EventKind::Outcome,
            Self::Report(_) => EventKind::Report,
            Self::Coverage(_) => EventKind::Coverage,
            Self::Debug(_) => EventKind::Debug,
        }
    }

    pub fn outcome(nodeid: impl Into<String>, outcome: Outcome) -> Self {
        Self::Outcome(OutcomePayload {
            nodeid: nodeid.into(),
            outcome,
        })
    }

    pub fn scheduled<I, S>(nodeids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Scheduled(nodeids.into_iter().map(Into::into).collect())
    }
}

/// Encode an event into a frame body.
pub fn encode(event: &Event) -> Result<Bytes, ChannelError> {
    serde_json::to_vec(event)
        .map(Bytes::from)
        .map_err(ChannelError::Encode)
}

/// Decode a frame body into an event.
///
/// Unknown kinds and payloads that do not fit their kind's schema fail with
/// [`ChannelError::MalformedEvent`].
pub fn decode(body: &[u8]) -> Result<Event, ChannelError> {
    serde_json::from_slice(body).map_err(ChannelError::MalformedEvent)
}
