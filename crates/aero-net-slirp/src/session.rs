use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use crate::event::EventGate;
use crate::poll::PollState;
use crate::queue::FrameQueue;
use crate::stats::StatsCounters;

/// State shared between the controller, the poll thread and the stack's [`crate::OutputSink`]
/// for one `init` → `close` session.
#[derive(Debug)]
pub(crate) struct Session {
    pub(crate) queue: FrameQueue,
    /// Cleared by `close` before it waits for the poll thread; checked by the loop at the top of
    /// every iteration and again right after dispatch.
    active: AtomicBool,
    /// Kicked by producers so an idling poll loop delivers promptly.
    pub(crate) wake: EventGate,
    /// Start/stop handshake between the controller and the poll thread.
    pub(crate) handshake: EventGate,
    /// Emulator-driven pacing signal (only waited on when the config is paced).
    pub(crate) poll_request: EventGate,
    state: AtomicU8,
    pub(crate) stats: Arc<StatsCounters>,
    pub(crate) max_frame_len: usize,
}

impl Session {
    pub(crate) fn new(stats: Arc<StatsCounters>, max_frame_len: usize) -> Self {
        Self {
            queue: FrameQueue::new(),
            active: AtomicBool::new(true),
            wake: EventGate::new(),
            handshake: EventGate::new(),
            poll_request: EventGate::new(),
            state: AtomicU8::new(PollState::Stopped as u8),
            stats,
            max_frame_len,
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Flip the session to shutting-down and wake every bounded wait the poll loop may be in.
    pub(crate) fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
        self.wake.set();
        self.poll_request.set();
    }

    pub(crate) fn poll_state(&self) -> PollState {
        PollState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_poll_state(&self, state: PollState) {
        self.state.store(state as u8, Ordering::Release);
    }
}
