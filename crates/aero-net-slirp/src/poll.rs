//! The background poll loop.
//!
//! One iteration, with the busy/wait gate held as [`Holder::PollLoop`]:
//! 1. (paced configs only) wait for the emulator's poll request, bounded by the default timeout.
//! 2. Ask the stack what to watch, wait for readiness, dispatch.
//! 3. Bail out if the session was closed meanwhile; the queue is not touched again.
//! 4. Hand up to `frames_per_iteration` queued frames to the NIC, or idle on the wake event.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::config::SlirpConfig;
use crate::error::SlirpError;
use crate::gate::{BusyGate, Holder};
use crate::nic::NicReceiver;
use crate::session::Session;
use crate::stack::{DescriptorSets, UserNetStack};

/// Lifecycle of the poll thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PollState {
    Starting = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl PollState {
    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Starting,
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// Convert the stack's requested wait (µs, negative = unset) into a bounded duration.
///
/// `default` doubles as the ceiling, so one readiness wait never outlasts it.
pub(crate) fn readiness_timeout(requested_us: i64, default: Duration) -> Duration {
    match u64::try_from(requested_us) {
        Ok(us) => Duration::from_micros(us).min(default),
        Err(_) => default,
    }
}

pub(crate) fn lock_stack<S: ?Sized>(stack: &Mutex<S>) -> MutexGuard<'_, S> {
    match stack.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Everything the poll thread borrows from the controller for one session.
pub(crate) struct PollLoop<S, N> {
    pub(crate) session: Arc<Session>,
    pub(crate) gate: Arc<BusyGate>,
    pub(crate) stack: Arc<Mutex<S>>,
    pub(crate) nic: N,
    pub(crate) config: SlirpConfig,
}

impl<S: UserNetStack, N: NicReceiver> PollLoop<S, N> {
    /// Thread body. Returns the NIC so the controller can drop it on its own thread.
    pub(crate) fn run(mut self) -> N {
        let session = Arc::clone(&self.session);

        tracing::debug!("slirp: polling started");
        session.set_poll_state(PollState::Running);
        session.handshake.set();

        let gate = Arc::clone(&self.gate);
        let mut sets = DescriptorSets::new();
        while session.is_active() {
            // Released on unwind too, if the NIC or stack panics.
            let _hold = gate.hold(Holder::PollLoop);
            if !self.iterate(&mut sets) {
                break;
            }
        }

        session.set_poll_state(PollState::Stopping);
        tracing::debug!("slirp: polling stopped");
        session.set_poll_state(PollState::Stopped);
        session.handshake.set();

        self.nic
    }

    /// One gate-held iteration. Returns `false` once the session has been closed.
    fn iterate(&mut self, sets: &mut DescriptorSets) -> bool {
        let session = &self.session;
        session.stats.poll_iteration();

        if self.config.paced {
            session
                .poll_request
                .wait_timeout(self.config.default_poll_timeout);
        }

        if let Err(err) = self.poll_stack(sets) {
            session.stats.poll_failure();
            tracing::debug!("slirp: {err}");
        }

        if !session.is_active() {
            return false;
        }

        if session.queue.peek() == 0 {
            session.wake.wait_timeout(self.config.idle_backoff);
            return true;
        }

        for _ in 0..self.config.frame_budget() {
            let Some(frame) = session.queue.pop() else {
                break;
            };
            crate::net_log!(
                "slirp: inQ:{} got a {}byte packet",
                session.queue.peek(),
                frame.len()
            );
            self.nic.receive(frame.as_bytes());
            session.stats.rx_delivered(frame.len());
        }
        true
    }

    /// Query → bounded wait → dispatch. Any failure skips the rest of this cycle.
    fn poll_stack(&self, sets: &mut DescriptorSets) -> Result<(), SlirpError> {
        let mut stack = lock_stack(&self.stack);

        sets.clear();
        let requested = stack.query_readiness(sets);
        let timeout = readiness_timeout(requested, self.config.default_poll_timeout);

        stack
            .wait_readiness(sets, timeout)
            .map_err(|err| SlirpError::TransientPoll(format!("readiness wait failed: {err}")))?;

        stack
            .dispatch(sets)
            .map_err(|err| SlirpError::TransientPoll(err.to_string()))
    }
}
