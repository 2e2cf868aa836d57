//! Append-only record of every retained sample in a session.
//!
//! Writes go through a single [`BufferWriter`], which is not `Clone`; any
//! number of [`BufferReader`]s may read concurrently. The published length is
//! only advanced after the samples behind it are fully written, so a reader
//! that observes length `L` can always slice a complete prefix of `L` samples.

use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Shared {
    samples: RwLock<Vec<i16>>,
    len: AtomicUsize,
}

/// Creates an empty buffer and returns its single writer and a reader.
pub fn stream_buffer() -> (BufferWriter, BufferReader) {
    let shared = Arc::new(Shared {
        samples: RwLock::new(Vec::new()),
        len: AtomicUsize::new(0),
    });
    (
        BufferWriter {
            shared: Arc::clone(&shared),
        },
        BufferReader { shared },
    )
}

/// The only handle allowed to mutate the buffer.
pub struct BufferWriter {
    shared: Arc<Shared>,
}

impl BufferWriter {
    /// Extends the buffer with `chunk`. Amortized O(chunk.len()).
    pub fn append(&mut self, chunk: &[i16]) {
        let mut samples = self.shared.samples.write();
        samples.extend_from_slice(chunk);
        self.shared.len.store(samples.len(), Ordering::Release);
    }

    /// Drops all samples.
    pub fn clear(&mut self) {
        let mut samples = self.shared.samples.write();
        samples.clear();
        self.shared.len.store(0, Ordering::Release);
    }

    /// Swaps in an entirely new content in one step.
    pub fn replace(&mut self, content: Vec<i16>) {
        let mut samples = self.shared.samples.write();
        *samples = content;
        self.shared.len.store(samples.len(), Ordering::Release);
    }

    pub fn len(&self) -> usize {
        self.shared.len.load(Ordering::Acquire)
    }
}

/// Read-only handle, cheap to clone and share across threads.
#[derive(Clone)]
pub struct BufferReader {
    shared: Arc<Shared>,
}

impl BufferReader {
    /// Published length; renderers take it from the engine's state instead.
    #[cfg(test)]
    fn len(&self) -> usize {
        self.shared.len.load(Ordering::Acquire)
    }

    /// Borrows up to `count` samples starting at `start`.
    ///
    /// Ranges past the end are clamped to what is available, so the view may
    /// be shorter than requested or empty. The writer is held off while the
    /// view is alive, so keep it short-lived.
    pub fn slice(&self, start: usize, count: usize) -> MappedRwLockReadGuard<'_, [i16]> {
        RwLockReadGuard::map(self.shared.samples.read(), |samples| {
            let start = start.min(samples.len());
            let end = start.saturating_add(count).min(samples.len());
            &samples[start..end]
        })
    }

    /// Copies the whole record, for export.
    pub fn to_vec(&self) -> Vec<i16> {
        self.shared.samples.read().clone()
    }
}
