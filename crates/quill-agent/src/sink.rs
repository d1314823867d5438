//! Incremental answer rendering.
//!
//! Deltas arrive faster than any display should repaint, so the session
//! buffers them and flushes to the sink at most once per refresh interval.
//! The first delta flushes immediately; a forced flush on finish guarantees
//! nothing buffered is lost.

use std::time::{Duration, Instant};

/// Default minimum interval between sink flushes.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(100);

/// Where the streamed answer is rendered.
pub trait TextSink: Send {
    /// Append an increment to the rendered answer.
    fn append(&mut self, delta: &str);

    /// Replace the rendered answer wholesale (one-shot answers).
    fn set_full(&mut self, text: &str);

    /// Remove the answer entirely (error teardown).
    fn clear(&mut self);
}

/// A sink that accumulates into a String.
#[derive(Debug, Default)]
pub struct StringSink {
    text: String,
    cleared: bool,
}

impl StringSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// The rendered text so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether the sink was torn down by `clear`.
    pub fn was_cleared(&self) -> bool {
        self.cleared
    }
}

impl TextSink for StringSink {
    fn append(&mut self, delta: &str) {
        self.text.push_str(delta);
    }

    fn set_full(&mut self, text: &str) {
        self.text = text.to_string();
    }

    fn clear(&mut self) {
        self.text.clear();
        self.cleared = true;
    }
}

/// Throttled delta buffer in front of a [`TextSink`].
#[derive(Debug)]
pub struct ThrottledBuffer {
    accumulated: String,
    flushed_len: usize,
    last_flush: Option<Instant>,
    interval: Duration,
}

impl ThrottledBuffer {
    /// Create a buffer with the default refresh interval.
    pub fn new() -> Self {
        Self::with_interval(DEFAULT_REFRESH_INTERVAL)
    }

    /// Create a buffer with a custom refresh interval.
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            accumulated: String::new(),
            flushed_len: 0,
            last_flush: None,
            interval,
        }
    }

    /// Buffer a delta, flushing to the sink when the interval allows.
    pub fn push(&mut self, delta: &str, sink: &mut dyn TextSink) {
        self.accumulated.push_str(delta);
        let due = match self.last_flush {
            None => true,
            Some(at) => at.elapsed() >= self.interval,
        };
        if due {
            self.flush(sink);
        }
    }

    /// Force out anything still buffered.
    pub fn finish(&mut self, sink: &mut dyn TextSink) {
        self.flush(sink);
    }

    /// The complete accumulated answer, flushed or not.
    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    /// Drop buffered content without rendering it (error teardown).
    pub fn discard(&mut self) {
        self.accumulated.clear();
        self.flushed_len = 0;
        self.last_flush = None;
    }

    fn flush(&mut self, sink: &mut dyn TextSink) {
        if self.flushed_len < self.accumulated.len() {
            sink.append(&self.accumulated[self.flushed_len..]);
            self.flushed_len = self.accumulated.len();
        }
        self.last_flush = Some(Instant::now());
    }
}

impl Default for ThrottledBuffer {
    fn default() -> Self {
        Self::new()
    }
}
