//! Per-plugin log book.
//!
//! Every entry is also emitted as a `tracing` event carrying the plugin
//! name; the book keeps the most recent entries for the admin API.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Severity of a plugin log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Debug.
    Debug,
    /// Info.
    Info,
    /// Warning.
    Warn,
    /// Error.
    Error,
}

impl LogLevel {
    /// Parses a level name, accepting `warning` for `warn`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "debug" | "trace" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// One line in a plugin's log book.
#[derive(Debug, Clone, Serialize)]
pub struct PluginLogEntry {
    /// Owning plugin.
    pub plugin: String,
    /// Severity.
    pub level: LogLevel,
    /// Message.
    pub message: String,
    /// Free-form origin, such as `cron:cleanup` or `url_add`.
    pub source: Option<String>,
    /// When it was written.
    pub timestamp: DateTime<Utc>,
}

/// Bounded ring buffer of log entries per plugin.
#[derive(Debug)]
pub struct PluginLogBook {
    capacity: usize,
    entries: DashMap<String, VecDeque<PluginLogEntry>>,
}

impl PluginLogBook {
    /// Creates a log book keeping `capacity` entries per plugin.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: DashMap::new(),
        }
    }

    /// Emits a tracing event and appends the entry.
    pub fn append(
        &self,
        plugin: &str,
        level: LogLevel,
        message: impl Into<String>,
        source: Option<&str>,
    ) {
        let message = message.into();
        match level {
            LogLevel::Debug => tracing::debug!(plugin = %plugin, source = ?source, "{message}"),
            LogLevel::Info => tracing::info!(plugin = %plugin, source = ?source, "{message}"),
            LogLevel::Warn => tracing::warn!(plugin = %plugin, source = ?source, "{message}"),
            LogLevel::Error => tracing::error!(plugin = %plugin, source = ?source, "{message}"),
        }

        let mut book = self.entries.entry(plugin.to_string()).or_default();
        if book.len() == self.capacity {
            book.pop_front();
        }
        book.push_back(PluginLogEntry {
            plugin: plugin.to_string(),
            level,
            message,
            source: source.map(str::to_string),
            timestamp: Utc::now(),
        });
    }

    /// Returns up to `limit` most recent entries, oldest first.
    pub fn entries(&self, plugin: &str, limit: Option<usize>) -> Vec<PluginLogEntry> {
        let Some(book) = self.entries.get(plugin) else {
            return Vec::new();
        };
        let skip = limit.map_or(0, |l| book.len().saturating_sub(l));
        book.iter().skip(skip).cloned().collect()
    }

    /// Drops every entry of `plugin`.
    pub fn clear(&self, plugin: &str) {
        self.entries.remove(plugin);
    }
}

impl Default for PluginLogBook {
    fn default() -> Self {
        Self::new(200)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_buffer_keeps_newest() {
        let book = PluginLogBook::new(3);
        for i in 0..5 {
            book.append("seo", LogLevel::Info, format!("line {i}"), None);
        }
        let lines: Vec<_> = book
            .entries("seo", None)
            .into_iter()
            .map(|e| e.message)
            .collect();
        assert_eq!(lines, vec!["line 2", "line 3", "line 4"]);
        assert_eq!(book.entries("seo", Some(1))[0].message, "line 4");
        assert!(book.entries("other", None).is_empty());
    }

    #[test]
    fn test_level_parse() {
        assert_eq!(LogLevel::parse("WARNING"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse("loud"), None);
    }
}
