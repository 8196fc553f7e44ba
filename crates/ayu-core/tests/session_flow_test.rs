//! End-to-end: a producer emits a whole run over loopback TCP and the
//! observer's session ends up in the expected state.

use std::time::Duration;

use ayu_core::emitter::Emitter;
use ayu_core::event::{Event, Outcome, Status};
use ayu_core::observer::Observer;
use ayu_core::session::SharedSession;
use ayu_test_utils::{
    bounded, connect_config, loopback_config, sample_collection, sample_coverage, sample_nodeids,
    sample_report, wait_until,
};

async fn wait_for(session: &SharedSession, check: impl Fn(&ayu_core::Session) -> bool) -> bool {
    wait_until(Duration::from_secs(5), || check(&session.read())).await
}

#[tokio::test]
async fn documented_single_test_scenario() {
    let observer = Observer::start(&loopback_config()).await.unwrap();
    let session = observer.session().clone();
    let mut emitter = Emitter::connect(&connect_config(observer.local_addr().port())).await;
    assert!(emitter.is_enabled());

    emitter.emit(&Event::Collection(sample_collection())).await;
    assert!(bounded(wait_for(&session, |s| s.tree().total_leaves() == 4)).await);

    emitter.emit(&Event::scheduled(["tests/test_math.py::test_add"])).await;
    emitter
        .emit(&Event::outcome("tests/test_math.py::test_add", Outcome::Passed))
        .await;
    assert!(bounded(wait_for(&session, |s| s.tree().counters().passed == 1)).await);

    {
        let s = session.read();
        let leaf = s.tree().find_leaf("tests/test_math.py::test_add").unwrap();
        assert_eq!(s.tree().node(leaf).unwrap().status, Status::Passed);
        assert_eq!(s.tree().counters().queued, 0);
    }

    emitter.close().await;
    observer.shutdown().await;
}

#[tokio::test]
async fn full_run_conserves_counts_and_tolerates_strangers() {
    let observer = Observer::start(&loopback_config()).await.unwrap();
    let session = observer.session().clone();
    let mut emitter = Emitter::connect(&connect_config(observer.local_addr().port())).await;

    let nodeids = sample_nodeids();
    emitter.emit(&Event::Collection(sample_collection())).await;
    emitter.emit(&Event::scheduled(nodeids.clone())).await;
    emitter.emit(&Event::outcome(&nodeids[0], Outcome::Passed)).await;
    emitter.emit(&Event::outcome("tests/test_gone.py::test_x", Outcome::Failed)).await;
    emitter.emit(&Event::outcome(&nodeids[1], Outcome::Failed)).await;
    emitter.emit(&sample_report(&nodeids[1], "failed")).await;
    emitter.emit(&Event::Coverage(sample_coverage())).await;
    assert!(bounded(wait_for(&session, |s| s.coverage().len() == 2)).await);

    let s = session.read();
    let counters = s.tree().counters();
    assert_eq!(counters.passed, 1);
    assert_eq!(counters.failed, 1);
    assert_eq!(counters.queued + counters.finished(), nodeids.len());
    assert_eq!(s.coverage().summary().statements_missed, 5);
    assert!(s.log().any(|entry| entry.message == format!("{}: failed", nodeids[1])));
    drop(s);

    emitter.close().await;
    observer.shutdown().await;
}

#[tokio::test]
async fn emitter_disables_itself_when_the_observer_goes_away() {
    let observer = Observer::start(&loopback_config()).await.unwrap();
    let mut emitter = Emitter::connect(&connect_config(observer.local_addr().port())).await;
    assert!(emitter.emit(&Event::scheduled(["t.py::a"])).await);

    observer.shutdown().await;

    let mut disabled = false;
    for _ in 0..50 {
        emitter.emit(&Event::outcome("t.py::a", Outcome::Passed)).await;
        if !emitter.is_enabled() {
            disabled = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(disabled, "emitter kept sending into a closed channel");
    assert!(!emitter.emit(&Event::outcome("t.py::b", Outcome::Passed)).await);
}

#[tokio::test]
async fn recollection_resets_marks_and_statuses() {
    let observer = Observer::start(&loopback_config()).await.unwrap();
    let session = observer.session().clone();
    let mut emitter = Emitter::connect(&connect_config(observer.local_addr().port())).await;

    emitter.emit(&Event::Collection(sample_collection())).await;
    emitter
        .emit(&Event::outcome("tests/test_math.py::test_sub", Outcome::Error))
        .await;
    assert!(bounded(wait_for(&session, |s| s.tree().counters().error == 1)).await);

    session
        .write()
        .tree_mut()
        .mark_by_nodeid("tests/test_cls.py::TestReader", Some(true))
        .unwrap();
    assert_eq!(session.read().tree().marked_leaves(), 2);

    let before = session.read().revision();
    emitter.emit(&Event::Collection(sample_collection())).await;
    assert!(bounded(wait_for(&session, |s| s.revision() > before)).await);

    let s = session.read();
    assert_eq!(s.tree().marked_leaves(), 0);
    assert!(s.tree().iter().all(|(_, node)| node.status == Status::Empty));
    assert_eq!(s.tree().total_leaves(), 4);
    drop(s);

    emitter.close().await;
    observer.shutdown().await;
}
