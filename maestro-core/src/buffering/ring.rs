//! Fixed-capacity interleaved sample store (C3, §4.3).
//!
//! Distinct from `buffering::{AudioProducer, AudioConsumer}` (the lock-free
//! SPSC transport from the capture thread into the pipeline, §5 T1->T2):
//! this is a `parking_lot::Mutex`-guarded circular buffer serving (i) fixed
//! chunks to the streaming engine for partial decoding and (ii) "the last N
//! seconds" to late consumers, per §4.3. All four operations share one lock
//! so they are atomic with respect to each other (§5 "Shared-resource
//! policy").

use parking_lot::Mutex;

struct Inner {
    data: Vec<f32>,
    /// Index of the oldest valid sample in `data`.
    read_pos: usize,
    /// Number of valid samples currently stored (<= capacity).
    len: usize,
}

/// Fixed-capacity circular f32 sample store, typically sized for ~30 s of
/// audio at the engine's sample rate.
pub struct RingBuffer {
    capacity: usize,
    inner: Mutex<Inner>,
}

/// Result of `read_chunk` — distinguishes "not enough data yet" from a
/// genuine chunk, since an empty `Vec` would be ambiguous with a zero-sample
/// request.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkRead {
    Chunk(Vec<f32>),
    Insufficient,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner {
                data: vec![0.0; capacity.max(1)],
                read_pos: 0,
                len: 0,
            }),
        }
    }

    /// Copy `samples` into the circular region. If `samples` exceeds
    /// capacity, only the trailing `capacity` samples are retained (§4.3).
    pub fn write(&self, samples: &[f32]) {
        let mut inner = self.inner.lock();
        let capacity = self.capacity;

        let samples = if samples.len() > capacity {
            &samples[samples.len() - capacity..]
        } else {
            samples
        };

        // Current logical write position is read_pos + len (mod capacity).
        let mut write_pos = (inner.read_pos + inner.len) % capacity;

        for &s in samples {
            inner.data[write_pos] = s;
            write_pos = (write_pos + 1) % capacity;
        }

        let new_len = inner.len + samples.len();
        if new_len > capacity {
            // Overwritten the oldest samples — advance read_pos to match.
            let overwritten = new_len - capacity;
            inner.read_pos = (inner.read_pos + overwritten) % capacity;
            inner.len = capacity;
        } else {
            inner.len = new_len;
        }
    }

    /// Returns exactly `chunk_size` samples (oldest-first, consumed), or
    /// `Insufficient` if fewer than `chunk_size` samples are buffered.
    pub fn read_chunk(&self, chunk_size: usize) -> ChunkRead {
        let mut inner = self.inner.lock();
        if inner.len < chunk_size {
            return ChunkRead::Insufficient;
        }

        let capacity = self.capacity;
        let mut out = Vec::with_capacity(chunk_size);
        let mut pos = inner.read_pos;
        for _ in 0..chunk_size {
            out.push(inner.data[pos]);
            pos = (pos + 1) % capacity;
        }

        inner.read_pos = pos;
        inner.len -= chunk_size;
        ChunkRead::Chunk(out)
    }

    /// Returns the most recent `min(duration_s * sample_rate, capacity)`
    /// samples without consuming them (§4.3).
    pub fn recent(&self, duration_s: f64, sample_rate: u32) -> Vec<f32> {
        let inner = self.inner.lock();
        let capacity = self.capacity;
        let requested = (duration_s.max(0.0) * sample_rate as f64).round() as usize;
        let n = requested.min(inner.len);

        let start = (inner.read_pos + inner.len - n) % capacity;
        let mut out = Vec::with_capacity(n);
        let mut pos = start;
        for _ in 0..n {
            out.push(inner.data[pos]);
            pos = (pos + 1) % capacity;
        }
        out
    }

    /// Zero-fill and reset read/write pointers (§4.3).
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.data.iter_mut().for_each(|s| *s = 0.0);
        inner.read_pos = 0;
        inner.len = 0;
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_then_read_chunk_is_insufficient() {
        let rb = RingBuffer::new(100);
        rb.write(&[1.0; 50]);
        rb.clear();
        assert_eq!(rb.read_chunk(10), ChunkRead::Insufficient);
    }

    #[test]
    fn write_then_read_chunk_returns_exact_size_when_enough_samples() {
        let rb = RingBuffer::new(100);
        rb.write(&(0..40).map(|i| i as f32).collect::<Vec<_>>());
        match rb.read_chunk(20) {
            ChunkRead::Chunk(c) => {
                assert_eq!(c.len(), 20);
                assert_eq!(c, (0..20).map(|i| i as f32).collect::<Vec<_>>());
            }
            ChunkRead::Insufficient => panic!("expected a chunk"),
        }
    }

    #[test]
    fn read_chunk_insufficient_when_too_few_samples() {
        let rb = RingBuffer::new(100);
        rb.write(&[1.0; 5]);
        assert_eq!(rb.read_chunk(10), ChunkRead::Insufficient);
    }

    #[test]
    fn wrap_around_preserves_sample_order() {
        let rb = RingBuffer::new(10);
        // Fill past capacity to force wrap-around internally.
        rb.write(&(0..15).map(|i| i as f32).collect::<Vec<_>>());
        // Only the trailing 10 samples (5..15) should remain.
        let recent = rb.recent(10.0, 1);
        assert_eq!(recent, (5..15).map(|i| i as f32).collect::<Vec<_>>());
    }

    #[test]
    fn recent_does_not_consume() {
        let rb = RingBuffer::new(100);
        rb.write(&[1.0; 10]);
        let first = rb.recent(1.0, 10);
        let second = rb.recent(1.0, 10);
        assert_eq!(first, second);
        assert_eq!(rb.len(), 10);
    }

    #[test]
    fn recent_caps_at_capacity() {
        let rb = RingBuffer::new(10);
        rb.write(&(0..10).map(|i| i as f32).collect::<Vec<_>>());
        let recent = rb.recent(100.0, 1);
        assert_eq!(recent.len(), 10);
    }

    #[test]
    fn write_exceeding_capacity_keeps_trailing_samples() {
        let rb = RingBuffer::new(5);
        rb.write(&(0..12).map(|i| i as f32).collect::<Vec<_>>());
        assert_eq!(rb.len(), 5);
        let recent = rb.recent(5.0, 1);
        assert_eq!(recent, (7..12).map(|i| i as f32).collect::<Vec<_>>());
    }
}
