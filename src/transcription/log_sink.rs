use chrono::{DateTime, Local};
use core::fmt::{Display, Formatter, Result as FmtResult};
use std::collections::VecDeque;
use std::sync::Mutex;

/// One line of worker output, stamped with the wall-clock time it was read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    timestamp: DateTime<Local>,
    text: String,
}

impl LogLine {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self::with_timestamp(Local::now(), text)
    }

    #[must_use]
    pub fn with_timestamp(timestamp: DateTime<Local>, text: impl Into<String>) -> Self {
        Self {
            timestamp,
            text: text.into(),
        }
    }

    #[must_use]
    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }
}

impl Display for LogLine {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "[{}] {}", self.timestamp.format("%H:%M:%S"), self.text)
    }
}

/// Unbounded FIFO of output lines shared between the reading task and whoever displays them.
///
/// Neither side ever waits on the other: producers append, consumers take whatever is queued.
#[derive(Debug, Default)]
pub struct LogSink {
    queue: Mutex<VecDeque<LogLine>>,
}

impl LogSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a line stamped with the current time.
    pub fn push(&self, text: impl Into<String>) {
        self.push_line(LogLine::new(text));
    }

    pub fn push_line(&self, line: LogLine) {
        self.queue.lock().expect("lock poisoned").push_back(line);
    }

    /// Remove and return every queued line in arrival order.
    #[must_use]
    pub fn drain_available(&self) -> Vec<LogLine> {
        self.queue.lock().expect("lock poisoned").drain(..).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.lock().expect("lock poisoned").len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
