use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

use logstream::{
    ConnectionState, LogStreamClient, LogStreamConfig, LogStreamEvent, PatternNotifier,
};

const WAIT: Duration = Duration::from_secs(5);

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/ws/logs", listener.local_addr().unwrap());
    (listener, url)
}

async fn accept_ws(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (stream, _) = listener.accept().await.unwrap();
    accept_async(stream).await.unwrap()
}

async fn next_event(
    events: &mut tokio::sync::mpsc::Receiver<LogStreamEvent>,
) -> LogStreamEvent {
    timeout(WAIT, events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event stream ended early")
}

async fn expect_connected(events: &mut tokio::sync::mpsc::Receiver<LogStreamEvent>) {
    match next_event(events).await {
        LogStreamEvent::Connected => {}
        other => panic!("expected connected event, got {:?}", other),
    }
}

#[tokio::test]
async fn end_to_end_stream_scenario() {
    let (listener, url) = bind().await;

    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    let notifier = PatternNotifier::proxy_created(Arc::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }));
    let mut client = LogStreamClient::with_notifier(LogStreamConfig::new(url.as_str()), notifier);
    let mut events = client.start();

    // First session: two distinct lines plus a byte-identical repeat, then
    // an abrupt drop with no close frame.
    let mut server = accept_ws(&listener).await;
    expect_connected(&mut events).await;
    for line in [
        "[12:00:01] Started proxy job",
        "[12:00:05] Created proxy for x.mp4",
        "[12:00:05] Created proxy for x.mp4",
    ] {
        server.send(Message::Text(line.into())).await.unwrap();
    }

    let mut records = Vec::new();
    while records.len() < 2 {
        match next_event(&mut events).await {
            LogStreamEvent::Record(record) => records.push(record),
            other => panic!("expected record event, got {:?}", other),
        }
    }
    // Give the duplicate a moment to arrive before checking it was dropped.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(client.buffer_len(), 2);
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(client.records()[0].message, "Created proxy for x.mp4");

    drop(server);

    // The first retry is scheduled at one second, and the counter goes back
    // to zero once the new handshake succeeds.
    match next_event(&mut events).await {
        LogStreamEvent::Reconnecting { delay } => {
            assert_eq!(delay, Duration::from_millis(1_000));
        }
        other => panic!("expected reconnecting event, got {:?}", other),
    }
    let _server2 = timeout(WAIT, accept_ws(&listener)).await.unwrap();
    expect_connected(&mut events).await;
    assert_eq!(client.reconnect_attempts(), 0);
    // History survives the reconnect untouched.
    assert_eq!(client.buffer_len(), 2);

    client.stop().await;
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn teardown_cancels_pending_reconnect() {
    let (listener, url) = bind().await;
    let mut client = LogStreamClient::new(LogStreamConfig::new(url.as_str()));
    let mut events = client.start();

    let server = accept_ws(&listener).await;
    expect_connected(&mut events).await;
    drop(server);

    match next_event(&mut events).await {
        LogStreamEvent::Reconnecting { .. } => {}
        other => panic!("expected reconnecting event, got {:?}", other),
    }

    // Tear down inside the backoff window; the pending timer must never
    // produce a new session.
    client.stop().await;
    assert_eq!(client.state(), ConnectionState::Disconnected);

    let reconnect = timeout(Duration::from_secs(3), listener.accept()).await;
    assert!(reconnect.is_err(), "connection attempted after teardown");
}

#[tokio::test]
async fn clean_close_is_terminal() {
    let (listener, url) = bind().await;
    let mut client = LogStreamClient::new(LogStreamConfig::new(url.as_str()));
    let mut events = client.start();

    let mut server = accept_ws(&listener).await;
    expect_connected(&mut events).await;
    server.close(None).await.unwrap();

    match next_event(&mut events).await {
        LogStreamEvent::Closed => {}
        other => panic!("expected closed event, got {:?}", other),
    }

    let reconnect = timeout(Duration::from_secs(2), listener.accept()).await;
    assert!(reconnect.is_err(), "clean close must not trigger a retry");
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn restart_replaces_prior_session() {
    let (listener, url) = bind().await;
    let mut client = LogStreamClient::new(LogStreamConfig::new(url.as_str()));
    let mut first_events = client.start();

    let mut server = accept_ws(&listener).await;
    expect_connected(&mut first_events).await;

    // Starting again shuts the first session down before opening a new one.
    let mut second_events = client.start();
    assert!(
        timeout(WAIT, first_events.recv()).await.unwrap().is_none(),
        "first session's event channel should close"
    );

    let _server2 = timeout(WAIT, accept_ws(&listener)).await.unwrap();
    expect_connected(&mut second_events).await;

    // The old socket went away along with its session.
    let end = timeout(WAIT, server.next()).await.unwrap();
    assert!(matches!(
        end,
        None | Some(Err(_)) | Some(Ok(Message::Close(_)))
    ));

    client.stop().await;
}

#[tokio::test]
async fn backoff_escalates_while_server_is_down() {
    let (listener, url) = bind().await;
    // Nothing listening: every handshake fails and counts as unclean.
    drop(listener);

    let mut client = LogStreamClient::new(LogStreamConfig::new(url.as_str()));
    let mut events = client.start();

    let mut delays = Vec::new();
    while delays.len() < 3 {
        match timeout(Duration::from_secs(10), events.recv())
            .await
            .expect("timed out waiting for retry")
            .expect("event stream ended early")
        {
            LogStreamEvent::Reconnecting { delay } => delays.push(delay.as_millis() as u64),
            other => panic!("unexpected event: {:?}", other),
        }
    }
    assert_eq!(delays, vec![1_000, 2_000, 4_000]);

    client.stop().await;
}
