//! Terminal formatting for log records and proxy listings.

use crossterm::style::Stylize;

use api::ProxyFile;
use logstream::LogRecord;

/// One log entry: the message line with its timestamp dimmed beneath.
pub fn record(record: &LogRecord) -> String {
    if record.message.is_empty() {
        return format!("{}\n", record.timestamp);
    }
    format!("{}\n  {}\n", record.message, record.timestamp.as_str().dim())
}

pub fn status_line(text: &str) -> String {
    format!("-- {} --", text).bold().to_string()
}

/// Listing of originals awaiting a move and their proxies.
pub fn proxy_table(proxies: &[ProxyFile]) -> String {
    let mut out = format!("{}\n", format!("Unmoved videos ({})", proxies.len()).bold());
    for file in proxies {
        let proxy = if file.proxy.is_empty() {
            "no proxy available"
        } else {
            file.proxy.as_str()
        };
        out.push_str(&format!("  {}  [{}]\n", file.original, proxy));
    }
    out
}
