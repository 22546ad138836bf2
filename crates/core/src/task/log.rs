//! Per-task log buffer with live subscribers.

use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::broadcast;

/// Prefix for lines written by the engine rather than the scrape core.
pub const ENGINE_PREFIX: &str = "[engine]";

const SUBSCRIBER_CAPACITY: usize = 256;

/// Event delivered to log subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum LogEvent {
    Line(String),
    /// The task reached a terminal state; no more lines follow.
    Closed,
}

struct LogLines {
    lines: VecDeque<String>,
    dropped: usize,
    closed: bool,
}

/// Ordered, append-only log for one task.
///
/// At most `limit` lines are retained. Older lines are dropped and counted;
/// [`TaskLog::lines`] reports the count as its first line.
pub struct TaskLog {
    inner: Mutex<LogLines>,
    tx: broadcast::Sender<LogEvent>,
    limit: usize,
}

impl TaskLog {
    pub fn new(limit: usize) -> Self {
        let (tx, _) = broadcast::channel(SUBSCRIBER_CAPACITY);
        Self {
            inner: Mutex::new(LogLines {
                lines: VecDeque::new(),
                dropped: 0,
                closed: false,
            }),
            tx,
            limit: limit.max(1),
        }
    }

    /// Append a line. Lines pushed after [`close`](Self::close) are ignored.
    pub fn push(&self, line: impl Into<String>) {
        let line = line.into();
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        if inner.closed {
            return;
        }
        if inner.lines.len() >= self.limit {
            inner.lines.pop_front();
            inner.dropped += 1;
        }
        inner.lines.push_back(line.clone());
        // Sent under the lock so subscribers never miss or repeat a line.
        let _ = self.tx.send(LogEvent::Line(line));
    }

    /// Append an engine line.
    pub fn engine(&self, message: impl AsRef<str>) {
        self.push(format!("{} {}", ENGINE_PREFIX, message.as_ref()));
    }

    /// Snapshot of the retained lines.
    pub fn lines(&self) -> Vec<String> {
        match self.inner.lock() {
            Ok(inner) => Self::snapshot(&inner),
            Err(_) => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|i| i.lines.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current lines plus a receiver for everything appended afterwards.
    /// If the log is already closed the receiver yields nothing further
    /// and the flag is true.
    pub fn subscribe(&self) -> (Vec<String>, broadcast::Receiver<LogEvent>, bool) {
        match self.inner.lock() {
            Ok(inner) => (Self::snapshot(&inner), self.tx.subscribe(), inner.closed),
            Err(_) => (Vec::new(), self.tx.subscribe(), true),
        }
    }

    /// Mark the log complete and notify subscribers.
    pub fn close(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            if !inner.closed {
                inner.closed = true;
                let _ = self.tx.send(LogEvent::Closed);
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().map(|i| i.closed).unwrap_or(true)
    }

    fn snapshot(inner: &LogLines) -> Vec<String> {
        let mut out = Vec::with_capacity(inner.lines.len() + 1);
        if inner.dropped > 0 {
            out.push(format!(
                "{} {} earlier lines dropped",
                ENGINE_PREFIX, inner.dropped
            ));
        }
        out.extend(inner.lines.iter().cloned());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_are_ordered() {
        let log = TaskLog::new(100);
        log.push("one");
        log.engine("two");
        log.push("three");
        assert_eq!(log.lines(), vec!["one", "[engine] two", "three"]);
    }

    #[test]
    fn test_limit_drops_oldest_with_marker() {
        let log = TaskLog::new(2);
        log.push("a");
        log.push("b");
        log.push("c");
        assert_eq!(log.len(), 2);
        assert_eq!(
            log.lines(),
            vec!["[engine] 1 earlier lines dropped", "b", "c"]
        );
    }

    #[test]
    fn test_close_ignores_later_lines() {
        let log = TaskLog::new(10);
        log.push("a");
        log.close();
        log.push("b");
        assert!(log.is_closed());
        assert_eq!(log.lines(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_subscribe_sees_new_lines_then_close() {
        let log = TaskLog::new(10);
        log.push("before");

        let (existing, mut rx, closed) = log.subscribe();
        assert_eq!(existing, vec!["before"]);
        assert!(!closed);

        log.push("after");
        log.close();

        assert_eq!(rx.recv().await.unwrap(), LogEvent::Line("after".into()));
        assert_eq!(rx.recv().await.unwrap(), LogEvent::Closed);
    }
}
