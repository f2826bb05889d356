use ringbuf::{traits::*, HeapRb};
use std::sync::Arc;
use parking_lot::Mutex;

/// Thread-safe FIFO of playback samples shared with the audio callback
///
/// Unlike a capture ring, playback must not lose the start of a response,
/// so when the queue is full new samples are rejected rather than
/// overwriting old ones.
pub struct SampleQueue {
    buffer: Arc<Mutex<HeapRb<f32>>>,
}

impl SampleQueue {
    /// Create a new queue holding up to `capacity` samples
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(HeapRb::new(capacity))),
        }
    }

    /// Queue samples, returning how many were accepted
    pub fn push(&self, samples: &[f32]) -> usize {
        let mut buffer = self.buffer.lock();
        let mut written = 0;

        for &sample in samples {
            if buffer.try_push(sample).is_err() {
                break;
            }
            written += 1;
        }

        written
    }

    /// Fill `out` from the front of the queue, returning the number of samples copied
    pub fn pop_into(&self, out: &mut [f32]) -> usize {
        let mut buffer = self.buffer.lock();
        let mut read = 0;

        for slot in out.iter_mut() {
            match buffer.try_pop() {
                Some(sample) => {
                    *slot = sample;
                    read += 1;
                }
                None => break,
            }
        }

        read
    }

    /// Number of queued samples
    pub fn len(&self) -> usize {
        self.buffer.lock().occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }

    /// Drop everything queued
    pub fn clear(&self) {
        self.buffer.lock().clear();
    }

    pub fn capacity(&self) -> usize {
        self.buffer.lock().capacity().get()
    }
}

impl Clone for SampleQueue {
    fn clone(&self) -> Self {
        Self {
            buffer: Arc::clone(&self.buffer),
        }
    }
}
