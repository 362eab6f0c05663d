use std::time::Duration;

use crate::error::ConfigError;
use crate::frame::MAX_FRAME_LEN;

/// Fallback readiness timeout used when the stack reports a negative timeout.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(500);

/// How long the poll loop idles on its wake event when the frame queue is empty.
pub const DEFAULT_IDLE_BACKOFF: Duration = Duration::from_millis(10);

/// Frames handed to the NIC per poll iteration.
pub const DEFAULT_FRAMES_PER_ITERATION: usize = 1;

pub const DEFAULT_THREAD_NAME: &str = "slirp-poll";

/// Tunables for [`crate::SlirpBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlirpConfig {
    /// Readiness wait used when the stack does not supply a valid timeout.
    pub default_poll_timeout: Duration,
    pub idle_backoff: Duration,
    /// Upper bound on frames delivered to the NIC before the loop re-polls the stack.
    ///
    /// Values of 0 are treated as 1. Delivery order is FIFO regardless of this value.
    pub frames_per_iteration: usize,
    /// Largest frame accepted in either direction; larger frames are dropped and counted.
    pub max_frame_len: usize,
    /// When set, each poll iteration waits (bounded by `default_poll_timeout`) for the emulator to
    /// call [`crate::SlirpBackend::request_poll`].
    pub paced: bool,
    pub thread_name: String,
}

impl Default for SlirpConfig {
    fn default() -> Self {
        Self {
            default_poll_timeout: DEFAULT_POLL_TIMEOUT,
            idle_backoff: DEFAULT_IDLE_BACKOFF,
            frames_per_iteration: DEFAULT_FRAMES_PER_ITERATION,
            max_frame_len: MAX_FRAME_LEN,
            paced: false,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
        }
    }
}

impl SlirpConfig {
    /// Build a config from `AERO_SLIRP_*` environment variables, falling back to defaults for
    /// anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Some(ms) = parse_var::<u64>(&lookup, "AERO_SLIRP_POLL_TIMEOUT_MS")? {
            cfg.default_poll_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "AERO_SLIRP_IDLE_BACKOFF_MS")? {
            cfg.idle_backoff = Duration::from_millis(ms);
        }
        if let Some(n) = parse_var::<usize>(&lookup, "AERO_SLIRP_FRAMES_PER_ITERATION")? {
            if n == 0 {
                return Err(ConfigError::InvalidEnv("AERO_SLIRP_FRAMES_PER_ITERATION"));
            }
            cfg.frames_per_iteration = n;
        }
        if let Some(len) = parse_var::<usize>(&lookup, "AERO_SLIRP_MAX_FRAME_LEN")? {
            if len == 0 {
                return Err(ConfigError::InvalidEnv("AERO_SLIRP_MAX_FRAME_LEN"));
            }
            cfg.max_frame_len = len;
        }
        if let Some(raw) = lookup("AERO_SLIRP_PACED") {
            cfg.paced = match raw.trim() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" | "" => false,
                _ => return Err(ConfigError::InvalidEnv("AERO_SLIRP_PACED")),
            };
        }
        if let Some(name) = lookup("AERO_SLIRP_THREAD_NAME") {
            let name = name.trim();
            if !name.is_empty() {
                cfg.thread_name = name.to_string();
            }
        }

        Ok(cfg)
    }

    pub fn with_default_poll_timeout(mut self, timeout: Duration) -> Self {
        self.default_poll_timeout = timeout;
        self
    }

    pub fn with_idle_backoff(mut self, backoff: Duration) -> Self {
        self.idle_backoff = backoff;
        self
    }

    pub fn with_frames_per_iteration(mut self, n: usize) -> Self {
        self.frames_per_iteration = n;
        self
    }

    pub fn with_max_frame_len(mut self, len: usize) -> Self {
        self.max_frame_len = len;
        self
    }

    pub fn with_paced(mut self, paced: bool) -> Self {
        self.paced = paced;
        self
    }

    pub(crate) fn frame_budget(&self) -> usize {
        self.frames_per_iteration.max(1)
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv(key)),
    }
}
