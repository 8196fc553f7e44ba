//! Shared fixtures for ayu integration tests.
//!
//! Everything binds to `127.0.0.1:0` so tests can run in parallel without
//! fighting over the default port.

use std::future::Future;
use std::time::Duration;

use ayu_core::channel::ChannelConfig;
use ayu_core::event::{
    CollectionMeta, CollectionPayload, CoveragePayload, Event, FileCoverage, LineRange, NodeRecord,
    NodeType,
};

/// Loopback endpoint on an ephemeral port.
pub fn loopback_config() -> ChannelConfig {
    ChannelConfig::new("127.0.0.1", 0).with_connect_timeout(Duration::from_secs(2))
}

/// Config for connecting to something already bound at `port`.
pub fn connect_config(port: u16) -> ChannelConfig {
    ChannelConfig::new("127.0.0.1", port).with_connect_timeout(Duration::from_secs(2))
}

/// Poll `check` every 10ms until it holds or `timeout` passes.
///
/// Returns the final value of `check`.
pub async fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return check();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Run `fut` with a generous upper bound so a hung channel fails the test
/// instead of the CI job.
pub async fn bounded<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(10), fut)
        .await
        .unwrap_or_else(|_| panic!("test step timed out"))
}

/// The small suite used across integration tests:
///
/// ```text
/// tests (DIR)
///   test_math.py (MODULE)
///     test_add, test_sub
///   test_cls.py (MODULE)
///     TestReader (CLASS)
///       test_open, test_close
/// ```
pub fn sample_collection() -> CollectionPayload {
    let math = NodeRecord::new("test_math.py", NodeType::Module)
        .nodeid("tests/test_math.py")
        .child(NodeRecord::new("test_add", NodeType::Function).nodeid("tests/test_math.py::test_add"))
        .child(
            NodeRecord::new("test_sub", NodeType::Function)
                .nodeid("tests/test_math.py::test_sub")
                .markers(vec!["slow".to_string()]),
        );
    let reader = NodeRecord::new("TestReader", NodeType::Class)
        .nodeid("tests/test_cls.py::TestReader")
        .child(
            NodeRecord::new("test_open", NodeType::Function)
                .nodeid("tests/test_cls.py::TestReader::test_open"),
        )
        .child(
            NodeRecord::new("test_close", NodeType::Coroutine)
                .nodeid("tests/test_cls.py::TestReader::test_close"),
        );
    let root = NodeRecord::new("tests", NodeType::Dir)
        .child(math)
        .child(NodeRecord::new("test_cls.py", NodeType::Module).nodeid("tests/test_cls.py").child(reader));

    CollectionPayload {
        tree: [("tests".to_string(), root)].into_iter().collect(),
        meta: CollectionMeta {
            test_count: 4,
            markers: vec!["slow".to_string()],
        },
    }
}

/// Every test id in [`sample_collection`], in collection order.
pub fn sample_nodeids() -> Vec<String> {
    [
        "tests/test_math.py::test_add",
        "tests/test_math.py::test_sub",
        "tests/test_cls.py::TestReader::test_open",
        "tests/test_cls.py::TestReader::test_close",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

pub fn sample_coverage() -> CoveragePayload {
    let file = |total: u64, missed: u64, missing: Vec<LineRange>| FileCoverage {
        n_statements: total,
        n_missed: missed,
        percent_covered: (total - missed) as f64 * 100.0 / total as f64,
        lines_missing: missing,
    };
    CoveragePayload {
        coverage_dict: [
            ("src/app.py".to_string(), file(20, 5, vec![LineRange::new(3, 7)])),
            ("src/util.py".to_string(), file(10, 0, vec![])),
        ]
        .into_iter()
        .collect(),
    }
}

/// A REPORT payload shaped like the plugin's per-test report.
pub fn sample_report(nodeid: &str, outcome: &str) -> Event {
    Event::Report(serde_json::json!({
        "nodeid": nodeid,
        "outcome": outcome,
        "longrepr": null,
    }))
}
