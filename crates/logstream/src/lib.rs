//! Resilient client for the proxy manager's live log stream.
//!
//! The server pushes plain-text log lines over a WebSocket at `/ws/logs`.
//! [`LogStreamClient`] keeps one session open at a time, survives server
//! restarts with capped exponential backoff, suppresses replayed duplicate
//! lines, and fires a callback when a watched marker (proxy creation by
//! default) shows up in the stream.

pub mod backoff;
pub mod buffer;
pub mod client;
pub mod notify;
pub mod record;
pub mod state;

pub use buffer::LogBuffer;
pub use client::{LogStreamClient, LogStreamConfig, LogStreamEvent};
pub use notify::{NotifyCallback, PatternNotifier, PROXY_CREATED_MARKER};
pub use record::LogRecord;
pub use state::ConnectionState;
