use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::config::SlirpConfig;
use crate::error::{Result, SlirpError};
use crate::frame::{is_valid_len, MacAddr};
use crate::gate::{BusyGate, Holder};
use crate::nic::NicReceiver;
use crate::poll::{lock_stack, PollLoop, PollState};
use crate::session::Session;
use crate::stack::{OutputSink, UserNetStack};
use crate::stats::{SlirpStats, StatsCounters};

type BoxedNic = Box<dyn NicReceiver + Send>;

/// How often a handshake wait checks whether the poll thread died without signalling.
const HANDSHAKE_LIVENESS_INTERVAL: Duration = Duration::from_millis(50);

struct PollThread {
    handle: JoinHandle<BoxedNic>,
    mac: MacAddr,
}

/// Bridges a [`UserNetStack`] to an emulated NIC through a background poll thread.
///
/// Lifecycle: [`SlirpBackend::init`] brings the stack up and creates the frame queue,
/// [`SlirpBackend::reset`] attaches a NIC and starts polling, [`SlirpBackend::close`] (or drop)
/// stops the thread and shuts the stack down. Guest TX frames enter through
/// [`SlirpBackend::inbound`]; host → guest frames are delivered to the NIC from the poll thread.
///
/// All lifecycle methods are meant to be called from the emulator thread.
pub struct SlirpBackend<S: UserNetStack + Send + 'static> {
    config: SlirpConfig,
    stack: Arc<Mutex<S>>,
    gate: Arc<BusyGate>,
    stats: Arc<StatsCounters>,
    session: Option<Arc<Session>>,
    poll: Option<PollThread>,
}

impl<S: UserNetStack + Send + 'static> SlirpBackend<S> {
    pub fn new(stack: S) -> Self {
        Self::with_config(stack, SlirpConfig::default())
    }

    pub fn with_config(stack: S, config: SlirpConfig) -> Self {
        Self {
            config,
            stack: Arc::new(Mutex::new(stack)),
            gate: Arc::new(BusyGate::new()),
            stats: Arc::new(StatsCounters::default()),
            session: None,
            poll: None,
        }
    }

    /// Initialize the stack and create an empty frame queue.
    ///
    /// On failure nothing is retained and `init` may simply be retried.
    pub fn init(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Err(SlirpError::SessionAlreadyActive);
        }

        tracing::debug!("slirp: initializing");
        let session = Arc::new(Session::new(
            Arc::clone(&self.stats),
            self.config.max_frame_len,
        ));
        let output = OutputSink::new(Arc::clone(&session));

        let res = {
            let _hold = self.gate.hold(Holder::Controller);
            lock_stack(&self.stack).initialize(output)
        };
        if let Err(err) = res {
            tracing::warn!("slirp: could not be initialized: {err}");
            session.deactivate();
            session.queue.destroy();
            return Err(SlirpError::StackInit(err));
        }

        self.session = Some(session);
        Ok(())
    }

    /// Attach `nic` (with hardware address `mac`) and start the poll thread.
    ///
    /// Blocks until the thread reports that it is polling.
    pub fn reset<N: NicReceiver + Send + 'static>(&mut self, nic: N, mac: MacAddr) -> Result<()> {
        let session = Arc::clone(self.session.as_ref().ok_or(SlirpError::NoActiveSession)?);
        if self.poll.is_some() {
            return Err(SlirpError::SessionAlreadyActive);
        }

        tracing::debug!(%mac, "slirp: creating thread");
        session.handshake.reset();
        session.set_poll_state(PollState::Starting);

        let poll_loop = PollLoop {
            session: Arc::clone(&session),
            gate: Arc::clone(&self.gate),
            stack: Arc::clone(&self.stack),
            nic: Box::new(nic) as BoxedNic,
            config: self.config.clone(),
        };
        let handle = std::thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || poll_loop.run())
            .map_err(|err| {
                session.set_poll_state(PollState::Stopped);
                SlirpError::Spawn(err)
            })?;

        if !wait_for_handshake(&session, &handle) {
            session.set_poll_state(PollState::Stopped);
            if handle.join().is_err() {
                tracing::error!("slirp: poll thread panicked during startup");
            }
            return Err(SlirpError::PollThreadPanicked);
        }

        self.poll = Some(PollThread { handle, mac });
        Ok(())
    }

    /// Stop polling, release the NIC, destroy the frame queue and shut the stack down.
    ///
    /// A no-op if there is no active session.
    pub fn close(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        tracing::debug!("slirp: closing");
        session.deactivate();

        if let Some(poll) = self.poll.take() {
            self.gate.release_all(Holder::Controller);

            tracing::debug!("slirp: waiting for thread to end...");
            let signalled = wait_for_handshake(&session, &poll.handle);
            match poll.handle.join() {
                Ok(nic) => drop(nic),
                Err(_) => tracing::error!("slirp: {}", SlirpError::PollThreadPanicked),
            }
            if !signalled {
                session.set_poll_state(PollState::Stopped);
            }
            tracing::debug!(mac = %poll.mac, "slirp: thread ended");
        }

        let discarded = session.queue.destroy();
        if discarded > 0 {
            self.stats.rx_discarded_on_close(discarded);
        }

        let _hold = self.gate.hold(Holder::Controller);
        lock_stack(&self.stack).shutdown(0);
    }

    /// Feed a guest-transmitted frame into the stack.
    ///
    /// Dropped without a session, and for empty or oversized frames.
    pub fn inbound(&self, frame: &[u8]) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        if !session.is_active() {
            return;
        }
        if !is_valid_len(frame.len(), self.config.max_frame_len) {
            self.stats.tx_dropped_invalid();
            return;
        }

        let _hold = self.gate.hold(Holder::Controller);
        crate::net_log!("slirp: ingesting a {}byte packet", frame.len());
        lock_stack(&self.stack).ingest(frame);
        self.stats.tx_ingested(frame.len());
    }

    /// Let a paced poll loop run its next iteration. Has no effect on unpaced configs.
    pub fn request_poll(&self) {
        if let Some(session) = self.session.as_ref() {
            session.poll_request.set();
        }
    }

    /// Run `f` against the stack with the busy/wait gate held by the controller.
    pub fn with_stack<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        let _hold = self.gate.hold(Holder::Controller);
        f(&mut lock_stack(&self.stack))
    }

    /// The gate serializing stack access; the emulator may hold it as [`Holder::Controller`]
    /// around its own stack work.
    pub fn gate(&self) -> &BusyGate {
        &self.gate
    }

    pub fn config(&self) -> &SlirpConfig {
        &self.config
    }

    /// Whether `init` succeeded and `close` has not been called since.
    pub fn is_active(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.is_active())
    }

    pub fn is_polling(&self) -> bool {
        self.poll.is_some()
    }

    pub fn poll_state(&self) -> PollState {
        self.session
            .as_ref()
            .map_or(PollState::Stopped, |s| s.poll_state())
    }

    /// Hardware address of the attached NIC, if polling.
    pub fn mac(&self) -> Option<MacAddr> {
        self.poll.as_ref().map(|p| p.mac)
    }

    /// Frames waiting to be delivered to the NIC.
    pub fn queued_frames(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.queue.peek())
    }

    pub fn stats(&self) -> SlirpStats {
        self.stats.snapshot()
    }
}

impl<S: UserNetStack + Send + 'static> Drop for SlirpBackend<S> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<S: UserNetStack + Send + 'static> std::fmt::Debug for SlirpBackend<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlirpBackend")
            .field("config", &self.config)
            .field("active", &self.is_active())
            .field("poll_state", &self.poll_state())
            .field("mac", &self.mac())
            .finish_non_exhaustive()
    }
}

/// Wait for the poll thread's handshake signal. Returns `false` if the thread exited without
/// signalling (i.e. it panicked).
fn wait_for_handshake(session: &Session, handle: &JoinHandle<BoxedNic>) -> bool {
    loop {
        if session.handshake.wait_timeout(HANDSHAKE_LIVENESS_INTERVAL) {
            return true;
        }
        if handle.is_finished() {
            return session.handshake.wait_timeout(Duration::ZERO);
        }
    }
}
