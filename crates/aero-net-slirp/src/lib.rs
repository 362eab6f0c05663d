//! Threaded glue between a SLiRP-style user-mode network stack and an emulated NIC.
//!
//! The user-mode stack services host sockets with a select-style readiness cycle that has to run
//! continuously, independently of the emulator's main loop. This crate owns that background
//! thread:
//! - guest TX frames enter through [`SlirpBackend::inbound`] and are handed to the stack,
//! - stack output is queued by the [`OutputSink`] capability and delivered to the NIC
//!   ([`NicReceiver`]) from the poll thread,
//! - a [`BusyGate`] ensures the non-reentrant stack is only ever entered by one thread at a time.
//!
//! See [`SlirpBackend`] for the lifecycle (`init` → `reset` → `close`).
#![forbid(unsafe_code)]

/// Per-frame trace logging, compiled in only with the `net_log` feature.
macro_rules! net_log {
    ($($arg:tt)*) => {
        #[cfg(feature = "net_log")]
        {
            tracing::trace!($($arg)*);
        }
    };
}
pub(crate) use net_log;

pub mod backend;
pub mod config;
pub mod error;
pub mod event;
pub mod frame;
pub mod gate;
pub mod nic;
pub mod poll;
pub mod queue;
mod session;
pub mod stack;
pub mod stats;

pub use backend::SlirpBackend;
pub use config::{SlirpConfig, DEFAULT_IDLE_BACKOFF, DEFAULT_POLL_TIMEOUT};
pub use error::{ConfigError, Result, SlirpError, StackError};
pub use event::EventGate;
pub use frame::{Frame, MacAddr, MAX_FRAME_LEN};
pub use gate::{BusyGate, GateGuard, Holder};
pub use nic::NicReceiver;
pub use poll::PollState;
pub use queue::FrameQueue;
pub use stack::{DescriptorSets, HostDescriptor, OutputSink, UserNetStack};
pub use stats::SlirpStats;
