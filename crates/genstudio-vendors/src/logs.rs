//! Live progress log for a running generation.

use genstudio_core::constants::MAX_JOB_LOG_LINES;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct LogBuffer {
    lines: VecDeque<String>,
    /// How many lines of the vendor's cumulative log were already copied.
    vendor_cursor: usize,
}

/// Shared, bounded log buffer. Clones write to the same buffer, so the
/// runner can hand one clone to the adapter and keep another for status reads.
#[derive(Debug, Clone)]
pub struct LogSink {
    inner: Arc<Mutex<LogBuffer>>,
    capacity: usize,
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new()
    }
}

impl LogSink {
    pub fn new() -> Self {
        Self::with_capacity(MAX_JOB_LOG_LINES)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LogBuffer::default())),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LogBuffer> {
        // A poisoned buffer still holds valid lines
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn append(buffer: &mut LogBuffer, capacity: usize, line: String) {
        if buffer.lines.len() == capacity {
            buffer.lines.pop_front();
        }
        buffer.lines.push_back(line);
    }

    /// Append one line written by us.
    pub fn push(&self, line: impl Into<String>) {
        let line = line.into();
        if line.trim().is_empty() {
            return;
        }
        let mut buffer = self.lock();
        Self::append(&mut buffer, self.capacity, line);
    }

    /// Merge a vendor's cumulative log. Vendors return every line so far on
    /// each poll; only lines past the previous sync are appended.
    pub fn sync_vendor_log<I, S>(&self, cumulative: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut buffer = self.lock();
        let cursor = buffer.vendor_cursor;
        let mut seen = 0;
        for line in cumulative {
            seen += 1;
            if seen <= cursor {
                continue;
            }
            let line: String = line.into();
            if !line.trim().is_empty() {
                Self::append(&mut buffer, self.capacity, line);
            }
        }
        buffer.vendor_cursor = cursor.max(seen);
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.lock().lines.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_only_last_lines() {
        let sink = LogSink::with_capacity(3);
        for i in 0..5 {
            sink.push(format!("line {}", i));
        }
        assert_eq!(sink.snapshot(), vec!["line 2", "line 3", "line 4"]);
    }

    #[test]
    fn test_vendor_log_is_not_duplicated() {
        let sink = LogSink::new();
        sink.sync_vendor_log(["queued", "loading model"]);
        sink.sync_vendor_log(["queued", "loading model", "step 1/4"]);
        sink.sync_vendor_log(["queued", "loading model", "step 1/4"]);
        assert_eq!(sink.snapshot(), vec!["queued", "loading model", "step 1/4"]);
    }

    #[test]
    fn test_clones_share_buffer() {
        let sink = LogSink::new();
        let writer = sink.clone();
        writer.push("submitted");
        writer.push("   ");
        assert_eq!(sink.snapshot(), vec!["submitted"]);
        assert_eq!(sink.len(), 1);
    }
}
