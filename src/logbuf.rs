use chrono::{DateTime, Local};
use std::collections::VecDeque;
use tracing::info;

/// Retained entries before the oldest are evicted.
pub const LOG_CAPACITY: usize = 500;

/// One timestamped event line.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub message: String,
}

impl LogEntry {
    /// Render as `[HH:MM:SS] message`.
    pub fn render(&self) -> String {
        format!("[{}] {}", self.timestamp.format("%H:%M:%S"), self.message)
    }
}

/// Bounded FIFO store of human-readable event lines, oldest first.
///
/// Appends are mirrored to `tracing` so the console and the control
/// surface see the same stream.
#[derive(Debug)]
pub struct LogBuffer {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::with_capacity(LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a line, evicting from the head once past capacity.
    pub fn append(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!("{message}");
        self.entries.push_back(LogEntry {
            timestamp: Local::now(),
            message,
        });
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// All entries rendered in insertion order, one per line.
    pub fn dump(&self) -> String {
        self.entries
            .iter()
            .map(LogEntry::render)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_dump_in_order() {
        let mut log = LogBuffer::new();
        log.append("first");
        log.append("second");
        log.append("third");

        let dump = log.dump();
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("first"));
        assert!(lines[1].ends_with("second"));
        assert!(lines[2].ends_with("third"));
    }

    #[test]
    fn test_render_format() {
        let entry = LogEntry {
            timestamp: Local::now(),
            message: "hello".to_string(),
        };
        let rendered = entry.render();
        // [HH:MM:SS] hello
        assert!(rendered.starts_with('['));
        assert_eq!(&rendered[9..], "] hello");
    }

    #[test]
    fn test_eviction_keeps_most_recent_500() {
        let mut log = LogBuffer::new();
        for i in 0..600 {
            log.append(format!("entry {i}"));
        }

        assert_eq!(log.len(), 500);
        let dump = log.dump();
        let lines: Vec<&str> = dump.lines().collect();
        assert!(lines[0].ends_with("entry 100"));
        assert!(lines[499].ends_with("entry 599"));
    }

    #[test]
    fn test_eviction_preserves_order() {
        let mut log = LogBuffer::with_capacity(3);
        for i in 0..5 {
            log.append(format!("e{i}"));
        }
        let dump = log.dump();
        let tails: Vec<String> = dump
            .lines()
            .map(|l| l.rsplit(' ').next().unwrap().to_string())
            .collect();
        assert_eq!(tails, vec!["e2", "e3", "e4"]);
    }

    #[test]
    fn test_empty_buffer() {
        let log = LogBuffer::new();
        assert!(log.is_empty());
        assert_eq!(log.dump(), "");
    }
}
