//! Line-oriented output channels
//!
//! Trace output is split over three independent channels: debug detail,
//! informational trace lines, and errors. Each is an opaque "write a line"
//! consumer the host wires to its own destination.

use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

/// Consumer of whole lines of text
pub trait LineSink: Send + Sync {
    fn write_line(&self, line: &str);
}

/// Writes to standard output
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl LineSink for StdoutSink {
    fn write_line(&self, line: &str) {
        let _ = writeln!(std::io::stdout().lock(), "{}", line);
    }
}

/// Writes to standard error
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrSink;

impl LineSink for StderrSink {
    fn write_line(&self, line: &str) {
        let _ = writeln!(std::io::stderr().lock(), "{}", line);
    }
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl LineSink for NullSink {
    fn write_line(&self, _line: &str) {}
}

/// Forwards lines to the `tracing` subscriber at a fixed level
#[derive(Debug, Clone, Copy)]
pub struct TracingSink {
    level: tracing::Level,
}

impl TracingSink {
    pub fn new(level: tracing::Level) -> Self {
        Self { level }
    }
}

impl LineSink for TracingSink {
    fn write_line(&self, line: &str) {
        let level = self.level;
        if level == tracing::Level::ERROR {
            tracing::error!(target: "tracecall", "{}", line);
        } else if level == tracing::Level::WARN {
            tracing::warn!(target: "tracecall", "{}", line);
        } else if level == tracing::Level::INFO {
            tracing::info!(target: "tracecall", "{}", line);
        } else if level == tracing::Level::DEBUG {
            tracing::debug!(target: "tracecall", "{}", line);
        } else {
            tracing::trace!(target: "tracecall", "{}", line);
        }
    }
}

/// Keeps lines in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every line written so far
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Remove and return every line written so far
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.lines.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|line| line.contains(needle))
    }
}

impl LineSink for MemorySink {
    fn write_line(&self, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_string());
    }
}

/// The three output channels
#[derive(Clone)]
pub struct Channels {
    pub debug: Arc<dyn LineSink>,
    pub info: Arc<dyn LineSink>,
    pub error: Arc<dyn LineSink>,
}

/// Memory sinks behind [`Channels::memory`]
#[derive(Debug, Clone)]
pub struct MemoryChannels {
    pub debug: Arc<MemorySink>,
    pub info: Arc<MemorySink>,
    pub error: Arc<MemorySink>,
}

impl Channels {
    /// Debug discarded, trace lines to stdout, errors to stderr
    pub fn console() -> Self {
        Self {
            debug: Arc::new(NullSink),
            info: Arc::new(StdoutSink),
            error: Arc::new(StderrSink),
        }
    }

    pub fn null() -> Self {
        Self {
            debug: Arc::new(NullSink),
            info: Arc::new(NullSink),
            error: Arc::new(NullSink),
        }
    }

    /// Channels that keep every line, plus handles to read them back
    pub fn memory() -> (Self, MemoryChannels) {
        let sinks = MemoryChannels {
            debug: Arc::new(MemorySink::new()),
            info: Arc::new(MemorySink::new()),
            error: Arc::new(MemorySink::new()),
        };
        let channels = Self {
            debug: sinks.debug.clone(),
            info: sinks.info.clone(),
            error: sinks.error.clone(),
        };
        (channels, sinks)
    }

    pub fn with_debug(mut self, sink: Arc<dyn LineSink>) -> Self {
        self.debug = sink;
        self
    }
}

impl Default for Channels {
    fn default() -> Self {
        Self::console()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_channels_are_independent() {
        let (channels, sinks) = Channels::memory();
        channels.info.write_line("trace");
        channels.error.write_line("oops");

        assert_eq!(sinks.info.lines(), vec!["trace"]);
        assert_eq!(sinks.error.lines(), vec!["oops"]);
        assert!(sinks.debug.lines().is_empty());
    }

    #[test]
    fn test_memory_sink_take_drains() {
        let sink = MemorySink::new();
        sink.write_line("a");
        sink.write_line("b");
        assert!(sink.contains("b"));
        assert_eq!(sink.take(), vec!["a", "b"]);
        assert!(sink.lines().is_empty());
    }

    #[test]
    fn test_null_and_console_sinks_do_not_panic() {
        NullSink.write_line("x");
        StderrSink.write_line("tracecall sink test");
        TracingSink::new(tracing::Level::DEBUG).write_line("x");
    }
}
