//! Stream buffering and fabricated-observation truncation.
//!
//! Observations only ever come from the tool dispatcher. When a model starts
//! writing its own `Observation:` the stream is cut at the marker. The check
//! runs on the accumulated text, not per token, because the marker can span
//! token boundaries.

use deskpilot_core::StreamChunk;

/// Marker the model must never produce itself.
pub const OBSERVATION_MARKER: &str = "Observation:";

/// Characters that must follow the marker before the stream is cut.
pub const MARKER_LOOKAHEAD: usize = 5;

/// Stop sequences sent to the runtime alongside every chat request.
pub const STOP_SEQUENCES: [&str; 3] = ["Observation:", "Observation :", "\nObservation"];

/// Batches model tokens into chunks and cuts the stream at the observation marker.
#[derive(Debug)]
pub struct StreamAccumulator {
    marker: String,
    lookahead: usize,
    flush_every: usize,
    full: String,
    sent: usize,
    pending_tokens: usize,
    truncated: bool,
}

impl StreamAccumulator {
    pub fn new(flush_every: usize) -> Self {
        Self::with_marker(OBSERVATION_MARKER, MARKER_LOOKAHEAD, flush_every)
    }

    pub fn with_marker(marker: impl Into<String>, lookahead: usize, flush_every: usize) -> Self {
        Self {
            marker: marker.into(),
            lookahead,
            flush_every: flush_every.max(1),
            full: String::new(),
            sent: 0,
            pending_tokens: 0,
            truncated: false,
        }
    }

    /// Feed one model token.
    ///
    /// Returns a chunk when a batch is ready. A chunk with `done` set means
    /// the marker was confirmed and the caller must stop reading.
    pub fn push(&mut self, token: &str) -> Option<StreamChunk> {
        if self.truncated {
            return None;
        }
        self.full.push_str(token);
        self.pending_tokens += 1;

        if let Some(idx) = self.marker_index() {
            if self.full.len() - idx >= self.marker.len() + self.lookahead {
                self.truncated = true;
                let content = self.full[self.sent..idx].to_string();
                self.sent = idx;
                return Some(StreamChunk {
                    content,
                    done: true,
                    truncated: true,
                });
            }
        }

        if self.pending_tokens < self.flush_every {
            return None;
        }

        let safe_end = self.safe_end();
        if safe_end <= self.sent {
            return None;
        }
        let content = self.full[self.sent..safe_end].to_string();
        self.sent = safe_end;
        self.pending_tokens = 0;
        Some(StreamChunk {
            content,
            done: false,
            truncated: false,
        })
    }

    /// Flush whatever is left when the runtime reports the end of the response.
    pub fn finish(&mut self) -> StreamChunk {
        if self.truncated {
            return StreamChunk {
                content: String::new(),
                done: true,
                truncated: true,
            };
        }
        let (end, truncated) = match self.marker_index() {
            Some(idx) => (idx, true),
            None => (self.full.len(), false),
        };
        let content = self.full[self.sent.min(end)..end].to_string();
        self.sent = end;
        self.truncated = truncated;
        StreamChunk {
            content,
            done: true,
            truncated,
        }
    }

    /// Text delivered to the caller so far.
    pub fn delivered(&self) -> &str {
        &self.full[..self.sent]
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    fn marker_index(&self) -> Option<usize> {
        self.full.find(&self.marker)
    }

    /// End of the text that can be forwarded without leaking the marker or a
    /// partial marker at the buffer tail.
    fn safe_end(&self) -> usize {
        if let Some(idx) = self.marker_index() {
            return idx;
        }
        let len = self.full.len();
        let longest = self.marker.len().saturating_sub(1).min(len);
        for keep in (1..=longest).rev() {
            let start = len - keep;
            if self.full.is_char_boundary(start) && self.marker.starts_with(&self.full[start..]) {
                return start;
            }
        }
        len
    }
}
