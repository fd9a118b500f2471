use serde::{Deserialize, Serialize};

/// Delimiter between the bracketed timestamp prefix and the message body.
const TIMESTAMP_DELIMITER: &str = "] ";

/// A single parsed server log line.
///
/// The server emits lines shaped like `[2024-01-02 15:04:05] message`. The
/// original text is kept alongside the parsed fields because duplicate
/// suppression compares raw lines, not parsed records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: String,
    pub message: String,
    pub raw: String,
}

impl LogRecord {
    /// Parse a raw log line.
    ///
    /// Splits on the first `"] "`; the prefix (leading `[` stripped) becomes
    /// the timestamp, and the rest stays intact even when it contains
    /// further `"] "` sequences. A line without the delimiter parses to a
    /// timestamp-only record instead of failing.
    pub fn parse(raw: &str) -> Self {
        let (timestamp, message) = match raw.split_once(TIMESTAMP_DELIMITER) {
            Some((prefix, rest)) => (prefix, rest),
            None => (raw, ""),
        };
        Self {
            timestamp: timestamp.strip_prefix('[').unwrap_or(timestamp).to_string(),
            message: message.to_string(),
            raw: raw.to_string(),
        }
    }
}
