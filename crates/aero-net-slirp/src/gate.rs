//! Busy/wait gate serializing access to the non-reentrant user-mode stack.
//!
//! The emulation thread and the poll thread both call into the stack: the former to inject guest
//! TX frames, the latter to run the socket readiness/dispatch cycle. The stack's socket
//! bookkeeping must never be mutated by both at once, so every stack call is bracketed by
//! [`BusyGate::acquire`] / [`BusyGate::release`].

use std::sync::{Condvar, Mutex, MutexGuard};

/// The two parties that take turns on a [`BusyGate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Holder {
    /// The emulator thread driving [`crate::SlirpBackend`].
    Controller,
    /// The background poll thread.
    PollLoop,
}

#[derive(Debug, Default)]
struct GateState {
    holder: Option<Holder>,
    depth: usize,
}

#[derive(Debug, Default)]
pub struct BusyGate {
    state: Mutex<GateState>,
    cv: Condvar,
}

impl BusyGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Block until the other party is not holding the gate, then hold it as `who`.
    ///
    /// Holds nest: a party that already holds the gate increments its depth and returns
    /// immediately.
    pub fn acquire(&self, who: Holder) {
        let mut state = self.lock();
        loop {
            match state.holder {
                None => {
                    state.holder = Some(who);
                    state.depth = 1;
                    return;
                }
                Some(current) if current == who => {
                    state.depth += 1;
                    return;
                }
                Some(_) => {
                    state = match self.cv.wait(state) {
                        Ok(guard) => guard,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                }
            }
        }
    }

    /// Drop one level of `who`'s hold. Returns `false` if `who` was not holding the gate.
    pub fn release(&self, who: Holder) -> bool {
        let mut state = self.lock();
        if state.holder != Some(who) {
            return false;
        }
        state.depth -= 1;
        if state.depth == 0 {
            state.holder = None;
            drop(state);
            self.cv.notify_all();
        }
        true
    }

    /// Drop every nested hold of `who`. Returns `false` if `who` was not holding the gate.
    pub fn release_all(&self, who: Holder) -> bool {
        let mut state = self.lock();
        if state.holder != Some(who) {
            return false;
        }
        state.holder = None;
        state.depth = 0;
        drop(state);
        self.cv.notify_all();
        true
    }

    /// Acquire the gate for the lifetime of the returned guard.
    pub fn hold(&self, who: Holder) -> GateGuard<'_> {
        self.acquire(who);
        GateGuard { gate: self, who }
    }

    pub fn holder(&self) -> Option<Holder> {
        self.lock().holder
    }

    pub fn is_held_by(&self, who: Holder) -> bool {
        self.holder() == Some(who)
    }
}

/// RAII hold on a [`BusyGate`].
#[must_use = "the gate is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct GateGuard<'a> {
    gate: &'a BusyGate,
    who: Holder,
}

impl GateGuard<'_> {
    pub fn holder(&self) -> Holder {
        self.who
    }
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        self.gate.release(self.who);
    }
}
