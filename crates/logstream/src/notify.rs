use std::sync::Arc;

use crate::record::LogRecord;

/// Default marker the server prints when a proxy render finishes.
pub const PROXY_CREATED_MARKER: &str = "Created proxy for";

/// Callback fired when a watched marker shows up in the stream.
pub type NotifyCallback = Arc<dyn Fn() + Send + Sync>;

/// Content-based trigger over admitted records.
///
/// The server sends no structured "proxy created" event; the marker is
/// matched against human-readable log text, so a change to the server's
/// wording silently disables the trigger. Keep the pattern in sync with
/// what the server actually logs.
#[derive(Clone)]
pub struct PatternNotifier {
    pattern: String,
    callback: NotifyCallback,
}

impl PatternNotifier {
    pub fn new(pattern: impl Into<String>, callback: NotifyCallback) -> Self {
        Self {
            pattern: pattern.into(),
            callback,
        }
    }

    /// Notifier with the stock proxy-created marker.
    pub fn proxy_created(callback: NotifyCallback) -> Self {
        Self::new(PROXY_CREATED_MARKER, callback)
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Fire the callback if the record's message carries the pattern.
    /// Called once per admitted record; duplicates never reach this point.
    pub fn observe(&self, record: &LogRecord) {
        if record.message.contains(&self.pattern) {
            (self.callback)();
        }
    }
}
