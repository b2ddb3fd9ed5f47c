//! Bounded in-memory buffers for captured lines.

use crate::error::{Error, Result};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// What happens when a full buffer receives another entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum OverflowStrategy {
    /// Evict the oldest entry.
    #[default]
    Fifo,
}

impl FromStr for OverflowStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("fifo") {
            Ok(OverflowStrategy::Fifo)
        } else {
            Err(Error::UnsupportedOverflowStrategy(s.to_string()))
        }
    }
}

/// Fixed-capacity FIFO guarded by its own lock.
///
/// Length never exceeds the capacity; pushing into a full buffer drops the
/// oldest entry first.
///
/// # Examples
///
/// ```
/// use logtap::RingBuffer;
///
/// let buffer = RingBuffer::new(2).unwrap();
/// buffer.push("a");
/// buffer.push("b");
/// buffer.push("c");
/// assert_eq!(buffer.snapshot(), vec!["b", "c"]);
/// ```
pub struct RingBuffer<T> {
    capacity: usize,
    entries: Mutex<VecDeque<T>>,
}

impl<T> RingBuffer<T> {
    /// Create a buffer holding at most `capacity` entries.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfig`] if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidConfig(
                "buffer_size must be positive".to_string(),
            ));
        }
        Ok(RingBuffer {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        })
    }

    /// Append an entry, evicting the oldest if the buffer is full.
    pub fn push(&self, entry: T) {
        let mut entries = self.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // Poisoning is ignored: no operation leaves the deque half-updated.
    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Copy of the current contents, oldest first.
    pub fn snapshot(&self) -> Vec<T> {
        self.lock().iter().cloned().collect()
    }
}

impl<T> fmt::Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}
