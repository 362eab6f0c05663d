use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use crate::frame::Frame;

/// Thread-safe FIFO of frames travelling from the stack's output path to the NIC.
///
/// The queue has an explicit destroyed state instead of being torn down while shared: after
/// [`FrameQueue::destroy`] every accessor becomes a harmless no-op, so a producer racing with
/// shutdown can never touch freed state.
#[derive(Debug)]
pub struct FrameQueue {
    inner: Mutex<Option<VecDeque<Frame>>>,
}

impl Default for FrameQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Some(VecDeque::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<VecDeque<Frame>>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Append `frame` at the tail. Returns `false` (dropping the frame) if the queue was
    /// destroyed.
    pub fn push(&self, frame: Frame) -> bool {
        match self.lock().as_mut() {
            Some(queue) => {
                queue.push_back(frame);
                true
            }
            None => false,
        }
    }

    /// Number of queued frames; 0 once destroyed.
    pub fn peek(&self) -> usize {
        self.lock().as_ref().map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self) -> bool {
        self.peek() == 0
    }

    pub fn pop(&self) -> Option<Frame> {
        self.lock().as_mut().and_then(VecDeque::pop_front)
    }

    /// Drop every remaining frame and refuse further pushes. Returns the number of frames that
    /// were discarded.
    pub fn destroy(&self) -> usize {
        self.lock().take().map_or(0, |queue| queue.len())
    }

    pub fn is_destroyed(&self) -> bool {
        self.lock().is_none()
    }
}
