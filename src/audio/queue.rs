//! Bounded frame queue with drop-oldest backpressure.
//!
//! Audio Source pushes are never allowed to block the capture callback.
//! When the queue is at capacity, the oldest frame is evicted to make
//! room for the new one rather than applying backpressure to the
//! producer.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// A block of 16-bit signed mono PCM at [`crate::constants::ASR_SAMPLE_RATE`].
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl AudioFrame {
    pub fn duration_secs(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

struct Inner {
    frames: VecDeque<AudioFrame>,
    capacity: usize,
    dropped: u64,
}

/// Shared handle to the bounded frame queue. Cheap to clone (`Arc` inside).
#[derive(Clone)]
pub struct AudioFrameQueue {
    inner: Arc<Mutex<Inner>>,
}

impl AudioFrameQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                frames: VecDeque::with_capacity(capacity),
                capacity,
                dropped: 0,
            })),
        }
    }

    /// Push a frame, dropping the oldest one if the queue is already full.
    /// Never blocks.
    pub fn push(&self, frame: AudioFrame) {
        let mut inner = self.inner.lock();
        if inner.frames.len() >= inner.capacity {
            inner.frames.pop_front();
            inner.dropped += 1;
        }
        inner.frames.push_back(frame);
    }

    /// Pop the oldest frame, if any.
    pub fn pop(&self) -> Option<AudioFrame> {
        self.inner.lock().frames.pop_front()
    }

    /// Drain every buffered frame (used when clearing the partial-recognition
    /// buffer on exit from `Listening`).
    pub fn clear(&self) {
        self.inner.lock().frames.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dropped_count(&self) -> u64 {
        self.inner.lock().dropped
    }
}
