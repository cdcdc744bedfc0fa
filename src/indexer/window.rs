use std::time::Duration;
use tokio::time::Instant;

use super::types::{Batch, TransferEvent};

/// Buffers transfer events for one fixed wall-clock window.
#[derive(Debug)]
pub struct BatchAccumulator {
    window_length: Duration,
    window_start: Instant,
    buffer: Batch,
}

impl BatchAccumulator {
    pub fn new(window_length: Duration, now: Instant) -> Self {
        Self {
            window_length,
            window_start: now,
            buffer: Vec::new(),
        }
    }

    pub fn push(&mut self, event: TransferEvent) {
        self.buffer.push(event);
    }

    pub fn should_flush(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.window_start) >= self.window_length
    }

    /// Instant at which the current window closes.
    pub fn deadline(&self) -> Instant {
        self.window_start + self.window_length
    }

    /// Hand out the buffered batch. The window stays closed until [`restart`](Self::restart).
    /// An empty result means the window had no events.
    pub fn take(&mut self) -> Batch {
        std::mem::take(&mut self.buffer)
    }

    /// Open the next window at `now`.
    pub fn restart(&mut self, now: Instant) {
        self.window_start = now;
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn window_length(&self) -> Duration {
        self.window_length
    }
}
