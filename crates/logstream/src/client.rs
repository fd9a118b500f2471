use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::backoff;
use crate::buffer::LogBuffer;
use crate::notify::PatternNotifier;
use crate::record::LogRecord;
use crate::state::ConnectionState;

/// How far the event consumer may fall behind before events are dropped.
const EVENT_CHANNEL_CAPACITY: usize = 256;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Settings for a log stream session.
#[derive(Debug, Clone)]
pub struct LogStreamConfig {
    /// Full `ws://` or `wss://` endpoint of the server's log stream.
    pub url: String,
}

impl LogStreamConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// Events surfaced to whoever consumes the stream.
#[derive(Debug, Clone)]
pub enum LogStreamEvent {
    /// Transport handshake succeeded.
    Connected,
    /// A new (non-duplicate) log line was admitted to the buffer.
    Record(LogRecord),
    /// Unclean close; a new attempt starts once `delay` elapses.
    Reconnecting { delay: Duration },
    /// The server closed the stream cleanly; no retry until `start()`.
    Closed,
}

/// Resilient client for the server's log stream.
///
/// Owns at most one live WebSocket session at a time. Unclean closes and
/// failed handshakes are retried forever with capped exponential backoff;
/// a clean close ends the session until `start()` is called again. All
/// transport errors are logged and absorbed here, never returned; the
/// only user-visible symptom of an outage is a pause in new lines.
pub struct LogStreamClient {
    config: LogStreamConfig,
    notifier: Option<PatternNotifier>,
    shared: Arc<Shared>,
    session: Option<Session>,
}

struct Shared {
    state: Mutex<ConnectionState>,
    buffer: Mutex<LogBuffer>,
    attempts: AtomicU32,
}

struct Session {
    task: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

enum SessionEnd {
    Clean,
    Unclean,
    Shutdown,
}

impl LogStreamClient {
    pub fn new(config: LogStreamConfig) -> Self {
        Self {
            config,
            notifier: None,
            shared: Arc::new(Shared {
                state: Mutex::new(ConnectionState::Disconnected),
                buffer: Mutex::new(LogBuffer::new()),
                attempts: AtomicU32::new(0),
            }),
            session: None,
        }
    }

    pub fn with_notifier(config: LogStreamConfig, notifier: PatternNotifier) -> Self {
        let mut client = Self::new(config);
        client.notifier = Some(notifier);
        client
    }

    /// Open a streaming session, shutting down any prior one first so two
    /// live sockets never coexist. Returns the event receiver for the new
    /// session; a previous session's receiver closes.
    pub fn start(&mut self) -> mpsc::Receiver<LogStreamEvent> {
        self.abort_session();
        let (events, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_session(
            self.config.clone(),
            self.shared.clone(),
            self.notifier.clone(),
            events,
            shutdown_rx,
        ));
        self.session = Some(Session { task, shutdown });
        rx
    }

    /// Close the active session and cancel any pending reconnect. After
    /// this returns, no further connection attempt can fire.
    pub async fn stop(&mut self) {
        if let Some(session) = self.session.take() {
            let _ = session.shutdown.send(true);
            let _ = session.task.await;
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.lock().unwrap()
    }

    /// Buffered records, newest first.
    pub fn records(&self) -> Vec<LogRecord> {
        self.shared.buffer.lock().unwrap().snapshot()
    }

    pub fn buffer_len(&self) -> usize {
        self.shared.buffer.lock().unwrap().len()
    }

    /// Consecutive unclean closes since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.attempts.load(Ordering::Relaxed)
    }

    /// Drop the buffered history. Reconnects never clear it implicitly.
    pub fn clear(&self) {
        self.shared.buffer.lock().unwrap().clear();
    }

    fn abort_session(&mut self) {
        if let Some(session) = self.session.take() {
            let _ = session.shutdown.send(true);
            session.task.abort();
            set_state(&self.shared, ConnectionState::Disconnected);
        }
    }
}

impl Drop for LogStreamClient {
    // A session task left running would keep reconnecting with no owner.
    fn drop(&mut self) {
        self.abort_session();
    }
}

async fn run_session(
    config: LogStreamConfig,
    shared: Arc<Shared>,
    notifier: Option<PatternNotifier>,
    events: mpsc::Sender<LogStreamEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        set_state(&shared, ConnectionState::Connecting);
        let connected = tokio::select! {
            _ = shutdown.changed() => break,
            result = connect_async(config.url.as_str()) => result,
        };
        match connected {
            Ok((stream, _)) => {
                info!("log stream connected: {}", config.url);
                set_state(&shared, ConnectionState::Open);
                shared.attempts.store(0, Ordering::Relaxed);
                send_event(&events, LogStreamEvent::Connected);

                match drive(stream, &shared, notifier.as_ref(), &events, &mut shutdown).await {
                    SessionEnd::Clean => {
                        info!("log stream closed by server");
                        set_state(&shared, ConnectionState::Disconnected);
                        send_event(&events, LogStreamEvent::Closed);
                        return;
                    }
                    SessionEnd::Shutdown => break,
                    SessionEnd::Unclean => set_state(&shared, ConnectionState::Disconnected),
                }
            }
            Err(e) => {
                warn!("log stream connect failed: {}", e);
                set_state(&shared, ConnectionState::Disconnected);
            }
        }

        // Unclean close or failed handshake: the delay comes from the
        // current counter, which then bumps for the next round.
        let attempt = shared.attempts.fetch_add(1, Ordering::Relaxed);
        let delay = backoff::delay_for(attempt);
        warn!("log stream reconnecting in {:?} (attempt {})", delay, attempt + 1);
        send_event(&events, LogStreamEvent::Reconnecting { delay });
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }
    set_state(&shared, ConnectionState::Disconnected);
}

/// Pump one open socket until it closes or teardown is requested.
async fn drive(
    stream: WsStream,
    shared: &Arc<Shared>,
    notifier: Option<&PatternNotifier>,
    events: &mpsc::Sender<LogStreamEvent>,
    shutdown: &mut watch::Receiver<bool>,
) -> SessionEnd {
    let (mut write, mut read) = stream.split();
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                set_state(shared, ConnectionState::Closing);
                let _ = write.close().await;
                return SessionEnd::Shutdown;
            }
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => ingest(&text, shared, notifier, events),
                Some(Ok(Message::Close(_))) => return SessionEnd::Clean,
                Some(Ok(_)) => {} // binary and control frames carry no log lines
                Some(Err(e)) => {
                    warn!("log stream read error: {}", e);
                    return SessionEnd::Unclean;
                }
                // Stream ended without a close frame.
                None => return SessionEnd::Unclean,
            },
        }
    }
}

fn ingest(
    raw: &str,
    shared: &Arc<Shared>,
    notifier: Option<&PatternNotifier>,
    events: &mpsc::Sender<LogStreamEvent>,
) {
    let admitted = shared.buffer.lock().unwrap().admit(raw);
    let Some(record) = admitted else {
        debug!("dropped duplicate log line");
        return;
    };
    if let Some(notifier) = notifier {
        notifier.observe(&record);
    }
    send_event(events, LogStreamEvent::Record(record));
}

fn set_state(shared: &Shared, state: ConnectionState) {
    debug!("log stream state: {}", state);
    *shared.state.lock().unwrap() = state;
}

fn send_event(events: &mpsc::Sender<LogStreamEvent>, event: LogStreamEvent) {
    // A slow or absent consumer never stalls the session; the buffer stays
    // the source of truth for history.
    if events.try_send(event).is_err() {
        debug!("log event consumer lagging; event dropped");
    }
}
