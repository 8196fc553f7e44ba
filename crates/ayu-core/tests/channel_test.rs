//! Integration tests for the dispatch channel: framing, ordering, malformed
//! input, frame limits, and connection displacement over real loopback TCP.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use ayu_core::channel::{listen, probe, Connection, Listener};
use ayu_core::event::{self, Event, EventKind, Outcome};
use ayu_core::registry::{Handler, SharedRegistry};
use ayu_core::ChannelError;
use ayu_test_utils::{bounded, connect_config, loopback_config, wait_until};

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

type Seen = Arc<Mutex<Vec<Event>>>;

fn recorder(seen: &Seen) -> Handler {
    let seen = Arc::clone(seen);
    Box::new(move |event| seen.lock().unwrap().push(event.clone()))
}

/// Listener with a recorder registered for every kind.
async fn recording_listener(max_frame_size: Option<usize>) -> (Listener, Seen) {
    let seen: Seen = Arc::default();
    let registry = SharedRegistry::new();
    for kind in EventKind::ALL {
        registry.register(kind, recorder(&seen));
    }
    let mut config = loopback_config();
    if let Some(max) = max_frame_size {
        config = config.with_max_frame_size(max);
    }
    let listener = listen(&config, registry).await.expect("listen");
    (listener, seen)
}

async fn connect(listener: &Listener) -> Connection {
    Connection::connect_with(&connect_config(listener.local_addr().port()))
        .await
        .expect("connect")
}

async fn wait_for(seen: &Seen, count: usize) -> bool {
    wait_until(Duration::from_secs(5), || seen.lock().unwrap().len() >= count).await
}

/// Write one frame by hand, bypassing the producer's checks.
async fn write_raw_frame(stream: &mut TcpStream, body: &[u8]) {
    stream
        .write_all(&(body.len() as u32).to_be_bytes())
        .await
        .unwrap();
    stream.write_all(body).await.unwrap();
    stream.flush().await.unwrap();
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn events_are_dispatched_in_send_order() {
    let (listener, seen) = recording_listener(None).await;
    let mut conn = connect(&listener).await;

    let sent = vec![
        Event::scheduled(["t.py::a", "t.py::b"]),
        Event::outcome("t.py::a", Outcome::Passed),
        Event::outcome("t.py::b", Outcome::Failed),
        Event::Debug(serde_json::json!({"note": "done"})),
    ];
    for event in &sent {
        conn.send(event).await.unwrap();
    }

    assert!(bounded(wait_for(&seen, sent.len())).await);
    assert_eq!(*seen.lock().unwrap(), sent);

    conn.close().await;
    listener.shutdown().await;
}

#[tokio::test]
async fn malformed_frame_is_skipped_and_reading_continues() {
    let (listener, seen) = recording_listener(None).await;
    let mut stream = TcpStream::connect(listener.local_addr()).await.unwrap();

    write_raw_frame(&mut stream, b"definitely not json").await;
    write_raw_frame(&mut stream, br#"{"type":"NOPE","payload":null}"#).await;
    let valid = Event::outcome("t.py::a", Outcome::Skipped);
    write_raw_frame(&mut stream, &event::encode(&valid).unwrap()).await;

    assert!(bounded(wait_for(&seen, 1)).await);
    assert_eq!(*seen.lock().unwrap(), vec![valid]);
    listener.shutdown().await;
}

#[tokio::test]
async fn frame_at_the_limit_is_accepted_and_one_byte_more_is_not() {
    let at_limit = Event::outcome("t.py::a", Outcome::Passed);
    let max = event::encode(&at_limit).unwrap().len();
    let over_limit = Event::outcome("t.py::ab", Outcome::Passed);
    assert_eq!(event::encode(&over_limit).unwrap().len(), max + 1);

    let (listener, seen) = recording_listener(Some(max)).await;

    // The producer side uses the default (large) limit so the oversized
    // frame actually reaches the listener.
    let mut conn = connect(&listener).await;
    conn.send(&at_limit).await.unwrap();
    assert!(bounded(wait_for(&seen, 1)).await);

    conn.send(&over_limit).await.unwrap();
    conn.send(&at_limit).await.ok();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(*seen.lock().unwrap(), vec![at_limit.clone()]);

    // The listener dropped that connection but still accepts new ones.
    let mut fresh = connect(&listener).await;
    fresh.send(&at_limit).await.unwrap();
    assert!(bounded(wait_for(&seen, 2)).await);
    listener.shutdown().await;
}

#[tokio::test]
async fn producer_refuses_oversized_event_without_writing() {
    let (listener, seen) = recording_listener(None).await;
    let small = Event::outcome("t.py::a", Outcome::Passed);
    let max = event::encode(&small).unwrap().len();
    let config = connect_config(listener.local_addr().port()).with_max_frame_size(max);
    let mut conn = Connection::connect_with(&config).await.unwrap();

    let err = conn
        .send(&Event::outcome("t.py::abc", Outcome::Passed))
        .await
        .unwrap_err();
    assert!(matches!(err, ChannelError::FrameTooLarge { .. }), "got {err:?}");

    conn.send(&small).await.unwrap();
    assert!(bounded(wait_for(&seen, 1)).await);
    assert_eq!(*seen.lock().unwrap(), vec![small]);
    listener.shutdown().await;
}

#[tokio::test]
async fn new_connection_displaces_the_active_one() {
    let (listener, seen) = recording_listener(None).await;

    let mut first = connect(&listener).await;
    first.send(&Event::outcome("t.py::first", Outcome::Passed)).await.unwrap();
    assert!(bounded(wait_for(&seen, 1)).await);

    let mut second = connect(&listener).await;
    second.send(&Event::outcome("t.py::second", Outcome::Passed)).await.unwrap();
    assert!(bounded(wait_for(&seen, 2)).await);

    // The displaced producer eventually sees the channel closed.
    let mut closed = false;
    for _ in 0..50 {
        match first.send(&Event::outcome("t.py::late", Outcome::Failed)).await {
            Err(ChannelError::ChannelClosed) => {
                closed = true;
                break;
            }
            _ => tokio::time::sleep(Duration::from_millis(20)).await,
        }
    }
    assert!(closed, "displaced connection never reported ChannelClosed");

    let nodeids: Vec<String> = seen
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            Event::Outcome(p) => Some(p.nodeid.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(&nodeids[..2], ["t.py::first", "t.py::second"]);
    listener.shutdown().await;
}

#[tokio::test]
async fn probe_and_silent_connections_leave_the_active_producer_alone() {
    let (listener, seen) = recording_listener(None).await;
    let port = listener.local_addr().port();

    let mut conn = connect(&listener).await;
    conn.send(&Event::scheduled(["t.py::a", "t.py::b", "t.py::c"])).await.unwrap();
    assert!(bounded(wait_for(&seen, 1)).await);

    // Connect-then-close, and a connection that never sends anything.
    assert!(probe("127.0.0.1", port, Duration::from_secs(1)).await);
    let _idle = TcpStream::connect(listener.local_addr()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    for nodeid in ["t.py::a", "t.py::b", "t.py::c"] {
        conn.send(&Event::outcome(nodeid, Outcome::Passed)).await.unwrap();
    }
    assert!(bounded(wait_for(&seen, 4)).await);

    let outcomes = seen
        .lock()
        .unwrap()
        .iter()
        .filter(|e| e.kind() == EventKind::Outcome)
        .count();
    assert_eq!(outcomes, 3);
    assert!(!conn.is_closed());
    listener.shutdown().await;
}

#[tokio::test]
async fn listener_serves_a_new_producer_after_disconnect() {
    let (listener, seen) = recording_listener(None).await;

    let mut first = connect(&listener).await;
    first.send(&Event::scheduled(["t.py::a"])).await.unwrap();
    first.close().await;
    assert!(bounded(wait_for(&seen, 1)).await);

    let mut second = connect(&listener).await;
    second.send(&Event::outcome("t.py::a", Outcome::Passed)).await.unwrap();
    assert!(bounded(wait_for(&seen, 2)).await);
    listener.shutdown().await;
}

#[tokio::test]
async fn unregistered_kinds_are_dropped() {
    let (listener, seen) = recording_listener(None).await;
    assert!(listener.unregister(EventKind::Outcome).is_some());

    let mut conn = connect(&listener).await;
    conn.send(&Event::outcome("t.py::a", Outcome::Passed)).await.unwrap();
    conn.send(&Event::scheduled(["t.py::a"])).await.unwrap();

    // Frames are handled in order, so once SCHEDULED is seen the OUTCOME
    // before it has already been dropped.
    assert!(bounded(wait_for(&seen, 1)).await);
    assert_eq!(*seen.lock().unwrap(), vec![Event::scheduled(["t.py::a"])]);
    listener.shutdown().await;
}

#[tokio::test]
async fn probe_tracks_listener_lifetime() {
    let (listener, _seen) = recording_listener(None).await;
    let port = listener.local_addr().port();
    assert!(probe("127.0.0.1", port, Duration::from_secs(1)).await);

    listener.shutdown().await;
    assert!(!probe("127.0.0.1", port, Duration::from_millis(500)).await);
}
