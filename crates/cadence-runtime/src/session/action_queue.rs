//! Bounded FIFO of predicted action steps.
//!
//! Overlap rule (append-with-cap): when a chunk arrives while older steps are
//! still queued, the queue is first trimmed from the front to at most `cap`
//! steps, then the new chunk is appended. `max_len` bounds the result even
//! when a chunk is longer than expected.

use std::collections::VecDeque;

use cadence_core::ActionStep;
use chrono::Utc;
use parking_lot::Mutex;

use crate::session::types::ChunkRecord;

/// Chunk records kept for diagnostics.
pub const RECENT_CHUNKS: usize = 10;

/// What one [`ActionQueue::push_chunk`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PushOutcome {
    /// Steps appended.
    pub appended: usize,
    /// Older (or overflowing) steps dropped.
    pub trimmed: usize,
    /// Queue length afterwards.
    pub len: usize,
}

struct QueueInner {
    steps: VecDeque<ActionStep>,
    recent: VecDeque<ChunkRecord>,
    next_sequence: u64,
}

/// FIFO shared between the inference loop (push) and control loop (pop).
pub struct ActionQueue {
    cap: usize,
    max_len: usize,
    inner: Mutex<QueueInner>,
}

impl ActionQueue {
    /// Queue with overlap cap `cap` and hard ceiling `max_len`.
    pub fn new(cap: usize, max_len: usize) -> Self {
        let max_len = max_len.max(1);
        Self {
            cap: cap.min(max_len),
            max_len,
            inner: Mutex::new(QueueInner {
                steps: VecDeque::with_capacity(max_len),
                recent: VecDeque::with_capacity(RECENT_CHUNKS),
                next_sequence: 1,
            }),
        }
    }

    /// Overlap cap.
    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Hard ceiling.
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Append a chunk of steps using the append-with-cap rule.
    ///
    /// `steps_received` is the chunk length before any truncation by the
    /// caller; it is only recorded for diagnostics.
    pub fn push_chunk(&self, steps: Vec<ActionStep>, steps_received: usize) -> PushOutcome {
        let mut inner = self.inner.lock();
        let mut trimmed = 0;

        if inner.steps.len() > self.cap {
            trimmed = inner.steps.len() - self.cap;
            let _ = inner.steps.drain(..trimmed);
        }

        let appended = steps.len();
        inner.steps.extend(steps);

        if inner.steps.len() > self.max_len {
            let overflow = inner.steps.len() - self.max_len;
            let _ = inner.steps.drain(..overflow);
            trimmed += overflow;
        }

        let record = ChunkRecord {
            sequence: inner.next_sequence,
            steps_received,
            steps_queued: appended,
            steps_trimmed: trimmed,
            received_at: Utc::now(),
        };
        inner.next_sequence += 1;
        if inner.recent.len() == RECENT_CHUNKS {
            let _ = inner.recent.pop_front();
        }
        inner.recent.push_back(record);

        PushOutcome {
            appended,
            trimmed,
            len: inner.steps.len(),
        }
    }

    /// Remove and return the oldest step; `None` when empty.
    pub fn pop(&self) -> Option<ActionStep> {
        self.inner.lock().steps.pop_front()
    }

    /// Steps queued.
    pub fn len(&self) -> usize {
        self.inner.lock().steps.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().steps.is_empty()
    }

    /// Drop every queued step. Chunk history is kept.
    pub fn clear(&self) {
        self.inner.lock().steps.clear();
    }

    /// Drop queued steps and chunk history.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.steps.clear();
        inner.recent.clear();
    }

    /// Recent chunk records, oldest first.
    pub fn recent_chunks(&self) -> Vec<ChunkRecord> {
        self.inner.lock().recent.iter().cloned().collect()
    }
}
