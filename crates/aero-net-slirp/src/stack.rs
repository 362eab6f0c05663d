//! Boundary to the user-mode network stack.
//!
//! The stack itself (sockets, NAT, DHCP, ...) is a black box. The glue drives it through
//! [`UserNetStack`] and hands it an [`OutputSink`] capability for host → guest frames.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use crate::error::StackError;
use crate::frame::Frame;
use crate::session::Session;

/// Opaque host socket handle as understood by the stack and its readiness wait.
pub type HostDescriptor = u64;

/// Host descriptors the stack wants watched during one readiness wait.
///
/// [`UserNetStack::query_readiness`] fills the sets; [`UserNetStack::wait_readiness`] narrows them
/// down to the descriptors that became ready (select-style); [`UserNetStack::dispatch`] consumes
/// the result.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DescriptorSets {
    pub read: Vec<HostDescriptor>,
    pub write: Vec<HostDescriptor>,
    pub except: Vec<HostDescriptor>,
}

impl DescriptorSets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.read.clear();
        self.write.clear();
        self.except.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.read.is_empty() && self.write.is_empty() && self.except.is_empty()
    }

    /// Total number of watched descriptors across all three sets.
    pub fn len(&self) -> usize {
        self.read.len() + self.write.len() + self.except.len()
    }

    pub fn watch_read(&mut self, fd: HostDescriptor) {
        self.read.push(fd);
    }

    pub fn watch_write(&mut self, fd: HostDescriptor) {
        self.write.push(fd);
    }

    pub fn watch_except(&mut self, fd: HostDescriptor) {
        self.except.push(fd);
    }
}

/// A non-reentrant user-mode network stack.
///
/// The glue guarantees that no two methods are ever running concurrently: every call happens with
/// the [`crate::BusyGate`] held, either by the controller (`ingest`) or by the poll thread (the
/// readiness cycle).
pub trait UserNetStack {
    /// Bring the stack up. `output` is the stack's only way to emit host → guest frames.
    fn initialize(&mut self, output: OutputSink) -> Result<(), StackError>;

    /// Tear the stack down. Called once per successful `initialize`.
    fn shutdown(&mut self, code: i32);

    /// Feed a guest → host Ethernet frame into the stack.
    fn ingest(&mut self, frame: &[u8]);

    /// Fill `sets` with the descriptors to watch and return how long to wait for them, in
    /// microseconds. Negative values mean "no preference" and select the configured default.
    fn query_readiness(&mut self, sets: &mut DescriptorSets) -> i64;

    /// Wait at most `timeout` for any descriptor in `sets` to become ready, leaving only ready
    /// descriptors in `sets`. Returns the number of ready descriptors.
    ///
    /// Stacks without real host sockets can rely on the default, which simply lets the timeout
    /// elapse with nothing ready.
    fn wait_readiness(
        &mut self,
        sets: &mut DescriptorSets,
        timeout: Duration,
    ) -> io::Result<usize> {
        std::thread::sleep(timeout);
        sets.clear();
        Ok(0)
    }

    /// Process whatever became ready. May emit output through the [`OutputSink`].
    fn dispatch(&mut self, sets: &DescriptorSets) -> Result<(), StackError>;
}

impl<T: UserNetStack + ?Sized> UserNetStack for Box<T> {
    fn initialize(&mut self, output: OutputSink) -> Result<(), StackError> {
        <T as UserNetStack>::initialize(&mut **self, output)
    }

    fn shutdown(&mut self, code: i32) {
        <T as UserNetStack>::shutdown(&mut **self, code);
    }

    fn ingest(&mut self, frame: &[u8]) {
        <T as UserNetStack>::ingest(&mut **self, frame);
    }

    fn query_readiness(&mut self, sets: &mut DescriptorSets) -> i64 {
        <T as UserNetStack>::query_readiness(&mut **self, sets)
    }

    fn wait_readiness(
        &mut self,
        sets: &mut DescriptorSets,
        timeout: Duration,
    ) -> io::Result<usize> {
        <T as UserNetStack>::wait_readiness(&mut **self, sets, timeout)
    }

    fn dispatch(&mut self, sets: &DescriptorSets) -> Result<(), StackError> {
        <T as UserNetStack>::dispatch(&mut **self, sets)
    }
}

/// Capability handed to [`UserNetStack::initialize`] for emitting host → guest frames.
///
/// Emitting is non-blocking and safe from any thread. Once the session that created the sink is
/// closed, every emit is silently dropped (and counted), so a stack that outlives its session
/// cannot reach freed state.
#[derive(Debug, Clone)]
pub struct OutputSink {
    session: Arc<Session>,
}

impl OutputSink {
    pub(crate) fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// Whether emitted frames currently have somewhere to go.
    pub fn can_output(&self) -> bool {
        self.session.is_active() && !self.session.queue.is_destroyed()
    }

    /// Queue `frame` for delivery to the NIC. Returns `false` if it was dropped.
    pub fn emit(&self, frame: &[u8]) -> bool {
        let session = &self.session;
        if !session.is_active() {
            session.stats.rx_dropped_inactive();
            return false;
        }
        let Some(frame) = Frame::copy_from(frame, session.max_frame_len) else {
            session.stats.rx_dropped_invalid();
            tracing::debug!(
                len = frame.len(),
                max = session.max_frame_len,
                "slirp: dropping invalid output frame"
            );
            return false;
        };

        let len = frame.len();
        if !session.queue.push(frame) {
            session.stats.rx_dropped_inactive();
            return false;
        }
        session.stats.rx_queued(len);
        crate::net_log!("slirp: outQ:{} queued a {}byte packet", session.queue.peek(), len);
        session.wake.set();
        true
    }
}
