//! Duplicate voice utterance suppression.
//!
//! Recognizers sometimes deliver the same phrase twice in quick succession.
//! The guard drops a voice utterance that repeats the previously accepted
//! one within a short window. Typed text always passes.

use crate::events::{InputSource, Utterance};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

/// Last accepted voice utterance.
#[derive(Debug, Clone)]
struct DebounceRecord {
    /// Lower-cased, trimmed text.
    text: String,
    accepted_at: Instant,
}

/// Rejects a voice utterance identical to the previous one inside the window.
#[derive(Debug)]
pub struct DebounceGuard {
    window: Duration,
    last: Mutex<Option<DebounceRecord>>,
}

impl DebounceGuard {
    /// Create a guard with the given window.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last: Mutex::new(None),
        }
    }

    /// Whether the utterance should be processed.
    pub fn accept(&self, utterance: &Utterance) -> bool {
        self.accept_at(&utterance.text, utterance.source, utterance.received_at)
    }

    /// Like [`accept`](Self::accept) with an explicit arrival time.
    ///
    /// Accepted voice utterances become the new reference record.
    pub fn accept_at(&self, text: &str, source: InputSource, now: Instant) -> bool {
        if source == InputSource::Text {
            return true;
        }

        let key = text.trim().to_lowercase();
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(record) = last.as_ref() {
            let elapsed = now.saturating_duration_since(record.accepted_at);
            if record.text == key && elapsed < self.window {
                debug!("ignoring duplicate voice input: {text}");
                return false;
            }
        }
        *last = Some(DebounceRecord {
            text: key,
            accepted_at: now,
        });
        true
    }

    /// Window length.
    pub fn window(&self) -> Duration {
        self.window
    }
}
