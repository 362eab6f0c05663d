use thiserror::Error;

pub type Result<T> = std::result::Result<T, SlirpError>;

/// Errors surfaced by [`crate::SlirpBackend`] lifecycle operations.
///
/// Only startup problems are reported synchronously. Failures inside the poll thread are absorbed
/// there (see [`SlirpError::TransientPoll`]) because the two threads run concurrently.
#[derive(Debug, Error)]
pub enum SlirpError {
    /// The user-mode stack refused to initialize. No session state was retained.
    #[error("network stack failed to initialize: {0}")]
    StackInit(#[source] StackError),

    /// `reset` was called without a preceding successful `init`.
    #[error("no active SLiRP session (call init first)")]
    NoActiveSession,

    /// `init` or `reset` was called while a session (or its poll thread) is already running.
    #[error("SLiRP session already active")]
    SessionAlreadyActive,

    /// The host refused to create the poll thread.
    #[error("failed to spawn poll thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// The poll thread panicked instead of returning the NIC.
    #[error("poll thread panicked")]
    PollThreadPanicked,

    /// A single readiness wait or dispatch call failed.
    ///
    /// Never returned from a public operation; it is logged and counted by the poll loop, which
    /// moves on to its next iteration.
    #[error("transient poll failure: {0}")]
    TransientPoll(String),
}

/// Errors reported by a [`crate::UserNetStack`] implementation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StackError {
    #[error("init failed: {0}")]
    Init(String),

    #[error("dispatch failed: {0}")]
    Dispatch(String),

    #[error("{0}")]
    Other(String),
}

/// Invalid `AERO_SLIRP_*` environment configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for env var {0}")]
    InvalidEnv(&'static str),
}
