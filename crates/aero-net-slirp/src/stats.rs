use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for [`crate::SlirpBackend`].
///
/// "rx" is host → guest (stack output delivered to the NIC), "tx" is guest → host (NIC frames
/// ingested by the stack). Counters accumulate across sessions.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SlirpStats {
    pub rx_queued_frames: u64,
    pub rx_queued_bytes: u64,
    pub rx_delivered_frames: u64,
    pub rx_delivered_bytes: u64,
    /// Stack output rejected for being empty or larger than the configured maximum.
    pub rx_dropped_invalid: u64,
    /// Stack output produced while no session was active.
    pub rx_dropped_inactive: u64,
    /// Frames still queued when the session closed.
    pub rx_discarded_on_close: u64,

    pub tx_ingested_frames: u64,
    pub tx_ingested_bytes: u64,
    pub tx_dropped_invalid: u64,

    pub poll_iterations: u64,
    /// Readiness waits or dispatch calls that failed and were skipped.
    pub poll_failures: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    rx_queued_frames: AtomicU64,
    rx_queued_bytes: AtomicU64,
    rx_delivered_frames: AtomicU64,
    rx_delivered_bytes: AtomicU64,
    rx_dropped_invalid: AtomicU64,
    rx_dropped_inactive: AtomicU64,
    rx_discarded_on_close: AtomicU64,
    tx_ingested_frames: AtomicU64,
    tx_ingested_bytes: AtomicU64,
    tx_dropped_invalid: AtomicU64,
    poll_iterations: AtomicU64,
    poll_failures: AtomicU64,
}

fn bump(counter: &AtomicU64, by: u64) {
    counter.fetch_add(by, Ordering::Relaxed);
}

impl StatsCounters {
    pub(crate) fn rx_queued(&self, len: usize) {
        bump(&self.rx_queued_frames, 1);
        bump(&self.rx_queued_bytes, len as u64);
    }

    pub(crate) fn rx_delivered(&self, len: usize) {
        bump(&self.rx_delivered_frames, 1);
        bump(&self.rx_delivered_bytes, len as u64);
    }

    pub(crate) fn rx_dropped_invalid(&self) {
        bump(&self.rx_dropped_invalid, 1);
    }

    pub(crate) fn rx_dropped_inactive(&self) {
        bump(&self.rx_dropped_inactive, 1);
    }

    pub(crate) fn rx_discarded_on_close(&self, frames: usize) {
        bump(&self.rx_discarded_on_close, frames as u64);
    }

    pub(crate) fn tx_ingested(&self, len: usize) {
        bump(&self.tx_ingested_frames, 1);
        bump(&self.tx_ingested_bytes, len as u64);
    }

    pub(crate) fn tx_dropped_invalid(&self) {
        bump(&self.tx_dropped_invalid, 1);
    }

    pub(crate) fn poll_iteration(&self) {
        bump(&self.poll_iterations, 1);
    }

    pub(crate) fn poll_failure(&self) {
        bump(&self.poll_failures, 1);
    }

    pub(crate) fn snapshot(&self) -> SlirpStats {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        SlirpStats {
            rx_queued_frames: load(&self.rx_queued_frames),
            rx_queued_bytes: load(&self.rx_queued_bytes),
            rx_delivered_frames: load(&self.rx_delivered_frames),
            rx_delivered_bytes: load(&self.rx_delivered_bytes),
            rx_dropped_invalid: load(&self.rx_dropped_invalid),
            rx_dropped_inactive: load(&self.rx_dropped_inactive),
            rx_discarded_on_close: load(&self.rx_discarded_on_close),
            tx_ingested_frames: load(&self.tx_ingested_frames),
            tx_ingested_bytes: load(&self.tx_ingested_bytes),
            tx_dropped_invalid: load(&self.tx_dropped_invalid),
            poll_iterations: load(&self.poll_iterations),
            poll_failures: load(&self.poll_failures),
        }
    }
}
